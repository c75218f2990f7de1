pub mod manager;
pub mod memory;
pub mod record;
pub mod repository;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::articles::{
    ArticleFilters, ArticleOrder, ArticlePagination, ArticleRow, StorageColumns, VoteType,
};

pub use manager::DatabaseManager;
pub use memory::MemoryArticleStore;
pub use record::{ColumnValue, WriteSet};
pub use repository::PgArticleRepository;

/// Errors from the relational store
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Row could not be decoded: {0}")]
    InvalidRow(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Row store for the `articles` table.
///
/// Rows come back raw: large fields may still hold storage markers, which
/// only the articles service resolves.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn insert(&self, id: Uuid, write: &WriteSet) -> Result<ArticleRow, DatabaseError>;

    /// `None` when no row has this id
    async fn update(
        &self,
        id: Uuid,
        write: &WriteSet,
    ) -> Result<Option<ArticleRow>, DatabaseError>;

    /// `false` when no row has this id
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;

    async fn find(&self, id: Uuid) -> Result<Option<ArticleRow>, DatabaseError>;

    /// Only the sidecar columns of a row
    async fn storage_columns(&self, id: Uuid) -> Result<Option<StorageColumns>, DatabaseError>;

    /// One page of rows plus the total match count
    async fn list(
        &self,
        filters: &ArticleFilters,
        order: ArticleOrder,
        pagination: &ArticlePagination,
    ) -> Result<(Vec<ArticleRow>, i64), DatabaseError>;

    async fn find_vote(
        &self,
        article_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<VoteType>, DatabaseError>;

    /// Record or withdraw (`None`) one user's vote and recompute the
    /// article's `vote_score`. `false` when no row has this id.
    async fn set_vote(
        &self,
        article_id: Uuid,
        user_id: Uuid,
        vote: Option<VoteType>,
    ) -> Result<bool, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}
