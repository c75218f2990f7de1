use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::model::{Article, ArticleRow};
use super::stored::{decode_envelope, LargeField, Stored};
use crate::storage::ObjectStore;

/// Shown in place of content whose blob cannot be read
pub const CONTENT_UNAVAILABLE: &str =
    "[Content temporarily unavailable - stored content could not be retrieved]";

/// Read-side half of the hybrid storage: splices externalized values back
/// into rows. Never fails; an unreadable blob degrades its field only.
pub struct ContentRehydrator {
    objects: Arc<dyn ObjectStore>,
}

impl ContentRehydrator {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    pub async fn rehydrate(&self, row: ArticleRow) -> Article {
        let ArticleRow {
            id,
            meta,
            content,
            sections,
            media_items,
            sources,
            storage,
        } = row;

        let content = match content {
            Some(Stored::Inline(text)) => text,
            Some(Stored::External(path)) => self
                .fetch(&path, LargeField::Content)
                .await
                .unwrap_or_else(|| CONTENT_UNAVAILABLE.to_string()),
            None => String::new(),
        };

        Article {
            id,
            meta,
            content,
            sections: self.resolve_list(sections, LargeField::Sections).await,
            media_items: self.resolve_list(media_items, LargeField::MediaItems).await,
            sources: self.resolve_list(sources, LargeField::Sources).await,
            storage,
        }
    }

    /// Rows are resolved one at a time, in order
    pub async fn rehydrate_all(&self, rows: Vec<ArticleRow>) -> Vec<Article> {
        let mut articles = Vec::with_capacity(rows.len());
        for row in rows {
            articles.push(self.rehydrate(row).await);
        }
        articles
    }

    async fn resolve_list<T: DeserializeOwned>(
        &self,
        value: Option<Stored<Vec<T>>>,
        field: LargeField,
    ) -> Vec<T> {
        match value {
            Some(Stored::Inline(items)) => items,
            Some(Stored::External(path)) => self.fetch(&path, field).await.unwrap_or_default(),
            None => Vec::new(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str, field: LargeField) -> Option<T> {
        let bytes = match self.objects.download(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to download {} from {}: {}", field, path, e);
                return None;
            }
        };

        match decode_envelope(field, &bytes) {
            Ok(value) => {
                debug!("Loaded {} from {}", field, path);
                Some(value)
            }
            Err(e) => {
                warn!("Stored {} at {} is unreadable: {}", field, path, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::model::{ArticleMeta, ArticleSection, StorageColumns};
    use crate::articles::stored::encode_envelope;
    use crate::storage::{MemoryObjectStore, UploadOptions};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn row(id: Uuid) -> ArticleRow {
        ArticleRow {
            id,
            meta: ArticleMeta::default(),
            content: None,
            sections: None,
            media_items: None,
            sources: None,
            storage: StorageColumns::default(),
        }
    }

    async fn put<T: serde::Serialize>(
        objects: &MemoryObjectStore,
        path: &str,
        field: LargeField,
        value: &T,
    ) {
        objects
            .upload(path, encode_envelope(field, value).unwrap(), UploadOptions::json_upsert())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inline_values_pass_through() {
        let rehydrator = ContentRehydrator::new(Arc::new(MemoryObjectStore::new()));
        let id = Uuid::new_v4();
        let mut r = row(id);
        r.content = Some(Stored::Inline("hello".to_string()));
        r.sources = Some(Stored::Inline(vec![json!({"title": "t"})]));

        let article = rehydrator.rehydrate(r).await;
        assert_eq!(article.content, "hello");
        assert_eq!(article.sources, vec![json!({"title": "t"})]);
        assert!(article.sections.is_empty());
        assert!(article.media_items.is_empty());
    }

    #[tokio::test]
    async fn external_values_are_restored() {
        let objects = MemoryObjectStore::new();
        let rehydrator = ContentRehydrator::new(Arc::new(objects.clone()));
        let id = Uuid::new_v4();

        let content = "x".repeat(5000);
        let media: Vec<Value> = (0..25).map(|i| json!({ "url": i })).collect();
        let content_path = LargeField::Content.blob_path(id);
        let media_path = LargeField::MediaItems.blob_path(id);
        put(&objects, &content_path, LargeField::Content, &content).await;
        put(&objects, &media_path, LargeField::MediaItems, &media).await;

        let mut r = row(id);
        r.content = Some(Stored::External(content_path));
        r.media_items = Some(Stored::External(media_path));

        let article = rehydrator.rehydrate(r).await;
        assert_eq!(article.content, content);
        assert_eq!(article.media_items, media);
    }

    #[tokio::test]
    async fn unreadable_blobs_degrade_per_field() {
        let objects = MemoryObjectStore::new();
        let rehydrator = ContentRehydrator::new(Arc::new(objects.clone()));
        let id = Uuid::new_v4();

        let sections_path = LargeField::Sections.blob_path(id);
        let sections = vec![ArticleSection {
            id: "s".to_string(),
            title: "t".to_string(),
            content: "c".to_string(),
            media: vec![],
            sources: vec![],
            order: 0,
        }];
        put(&objects, &sections_path, LargeField::Sections, &sections).await;
        objects.fail_download(sections_path.clone()).await;

        // Envelope keyed for a different field
        let sources_path = LargeField::Sources.blob_path(id);
        put(&objects, &sources_path, LargeField::Content, &"wrong").await;

        let mut r = row(id);
        r.content = Some(Stored::External(LargeField::Content.blob_path(id)));
        r.sections = Some(Stored::External(sections_path));
        r.sources = Some(Stored::External(sources_path));
        r.media_items = Some(Stored::Inline(vec![json!({"url": "kept"})]));

        let article = rehydrator.rehydrate(r).await;
        assert_eq!(article.content, CONTENT_UNAVAILABLE);
        assert!(article.sections.is_empty());
        assert!(article.sources.is_empty());
        assert_eq!(article.media_items, vec![json!({"url": "kept"})]);
    }

    #[tokio::test]
    async fn rehydrate_all_keeps_order() {
        let rehydrator = ContentRehydrator::new(Arc::new(MemoryObjectStore::new()));
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let articles = rehydrator.rehydrate_all(ids.iter().copied().map(row).collect()).await;
        assert_eq!(articles.iter().map(|a| a.id).collect::<Vec<_>>(), ids);
    }
}
