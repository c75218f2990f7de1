use std::sync::Arc;
use tracing::info;

use crate::articles::ArticlesService;
use crate::config::{AppConfig, DatabaseBackend, StorageBackend};
use crate::database::{ArticleStore, DatabaseManager, MemoryArticleStore, PgArticleRepository};
use crate::storage::{MemoryObjectStore, ObjectStore, SupabaseStorage};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub articles: Arc<ArticlesService>,
}

impl AppState {
    pub fn new(articles: ArticlesService) -> Self {
        Self {
            articles: Arc::new(articles),
        }
    }

    /// Wire the configured relational and object store backends
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn ArticleStore> = match config.database.backend {
            DatabaseBackend::Postgres => {
                let pool = DatabaseManager::connect(&config.database).await?;
                Arc::new(PgArticleRepository::new(pool))
            }
            DatabaseBackend::Memory => {
                info!("Using in-memory article store");
                Arc::new(MemoryArticleStore::new())
            }
        };

        let objects: Arc<dyn ObjectStore> = match config.storage.backend {
            StorageBackend::Supabase => {
                let storage = SupabaseStorage::from_config(&config.storage)?;
                info!("Using Supabase storage bucket '{}'", storage.bucket());
                Arc::new(storage)
            }
            StorageBackend::Memory => {
                info!("Using in-memory object store");
                Arc::new(MemoryObjectStore::new())
            }
        };

        Ok(Self::new(ArticlesService::new(store, objects)))
    }
}
