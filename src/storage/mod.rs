//! Object store collaborator for externalized article payloads.
//!
//! The articles layer only ever uploads, downloads and removes whole blobs
//! by key; everything else about the bucket is owned elsewhere.

pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryObjectStore;
pub use supabase::SupabaseStorage;

/// Errors reported by an object store backend
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Storage transport error: {0}")]
    Transport(String),

    #[error("Storage misconfigured: {0}")]
    Configuration(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Options applied to a single upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub content_type: String,
    /// Overwrite any existing object at the same path
    pub upsert: bool,
}

impl UploadOptions {
    pub fn json_upsert() -> Self {
        Self {
            content_type: "application/json".to_string(),
            upsert: true,
        }
    }
}

/// Key-addressed blob store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, options: UploadOptions) -> StorageResult<()>;

    async fn download(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Remove a batch of objects in one request
    async fn remove(&self, paths: &[String]) -> StorageResult<()>;
}
