use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ObjectStore, StorageError, StorageResult, UploadOptions};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct Failures {
    uploads: HashSet<String>,
    downloads: HashSet<String>,
    remove: bool,
}

/// Process-local object store.
///
/// Backs the `memory` storage backend for local runs and lets tests script
/// per-path failures and inspect batch removals.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    failures: Arc<RwLock<Failures>>,
    remove_calls: Arc<RwLock<Vec<Vec<String>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upload to `path` fail
    pub async fn fail_upload(&self, path: impl Into<String>) {
        self.failures.write().await.uploads.insert(path.into());
    }

    /// Make every download of `path` fail
    pub async fn fail_download(&self, path: impl Into<String>) {
        self.failures.write().await.downloads.insert(path.into());
    }

    pub async fn fail_removals(&self, fail: bool) {
        self.failures.write().await.remove = fail;
    }

    pub async fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects.read().await.get(path).cloned()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Every batch passed to `remove`, in call order
    pub async fn remove_calls(&self) -> Vec<Vec<String>> {
        self.remove_calls.read().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        options: UploadOptions,
    ) -> StorageResult<()> {
        if self.failures.read().await.uploads.contains(path) {
            return Err(StorageError::Status {
                status: 503,
                message: format!("simulated upload failure for {}", path),
            });
        }

        let mut objects = self.objects.write().await;
        if !options.upsert && objects.contains_key(path) {
            return Err(StorageError::Status {
                status: 409,
                message: format!("object already exists: {}", path),
            });
        }
        objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: options.content_type,
            },
        );
        Ok(())
    }

    async fn download(&self, path: &str) -> StorageResult<Vec<u8>> {
        if self.failures.read().await.downloads.contains(path) {
            return Err(StorageError::Transport(format!(
                "simulated network failure for {}",
                path
            )));
        }

        self.objects
            .read()
            .await
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn remove(&self, paths: &[String]) -> StorageResult<()> {
        self.remove_calls.write().await.push(paths.to_vec());

        if self.failures.read().await.remove {
            return Err(StorageError::Status {
                status: 500,
                message: "simulated removal failure".to_string(),
            });
        }

        let mut objects = self.objects.write().await;
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_overwrites_in_place() {
        let store = MemoryObjectStore::new();
        store.upload("a.json", b"1".to_vec(), UploadOptions::json_upsert()).await.unwrap();
        store.upload("a.json", b"2".to_vec(), UploadOptions::json_upsert()).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.download("a.json").await.unwrap(), b"2".to_vec());
        assert_eq!(store.get("a.json").await.unwrap().content_type, "application/json");
    }

    #[tokio::test]
    async fn plain_upload_refuses_to_overwrite() {
        let store = MemoryObjectStore::new();
        let options = UploadOptions {
            content_type: "text/plain".to_string(),
            upsert: false,
        };
        store.upload("a.txt", b"1".to_vec(), options.clone()).await.unwrap();
        let err = store.upload("a.txt", b"2".to_vec(), options).await.unwrap_err();
        assert!(matches!(err, StorageError::Status { status: 409, .. }));
    }

    #[tokio::test]
    async fn scripted_failures_and_missing_objects() {
        let store = MemoryObjectStore::new();
        store.fail_upload("x.json").await;
        assert!(store.upload("x.json", vec![], UploadOptions::json_upsert()).await.is_err());
        assert!(matches!(
            store.download("missing.json").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_records_batches_even_when_failing() {
        let store = MemoryObjectStore::new();
        store.upload("a", vec![1], UploadOptions::json_upsert()).await.unwrap();
        store.fail_removals(true).await;

        let batch = vec!["a".to_string(), "b".to_string()];
        assert!(store.remove(&batch).await.is_err());
        assert!(store.contains("a").await);
        assert_eq!(store.remove_calls().await, vec![batch]);
    }
}
