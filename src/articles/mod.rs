//! Articles with hybrid row/object storage.
//!
//! Small article payloads live entirely in the `articles` row. Large
//! `content`, `sections`, `media_items` and `sources` values are moved to
//! the object store on write ([`PayloadSizer`]) and spliced back on every
//! read ([`ContentRehydrator`]), so callers of [`ArticlesService`] only ever
//! see original values.

pub mod externalizer;
pub mod limits;
pub mod model;
pub mod rehydrator;
pub mod service;
pub mod stored;

use thiserror::Error;
use uuid::Uuid;

use crate::database::DatabaseError;
use crate::storage::StorageError;

pub use externalizer::{PayloadSizer, PreparedArticle, PreparedBody, SizingPlan};
pub use model::{
    Article, ArticleBody, ArticleDraft, ArticleFields, ArticleFilters, ArticleMeta, ArticleOrder,
    ArticlePage, ArticlePagination, ArticleRow, ArticleSection, ArticleStatus,
    CreateArticleRequest, StorageColumns, UpdateArticleRequest, Visibility, VoteType,
    VotedArticle,
};
pub use rehydrator::{ContentRehydrator, CONTENT_UNAVAILABLE};
pub use service::ArticlesService;
pub use stored::{LargeField, Stored};

#[derive(Debug, Error)]
pub enum ArticleError {
    /// Content has no safe truncation, so a failed content upload aborts the write
    #[error("Storage system error, try again")]
    ContentStorage(#[source] StorageError),

    /// Existing blobs could not be read before being overwritten
    #[error("Storage system error, try again")]
    Storage(#[source] StorageError),

    #[error(
        "Article is {size} bytes, over the {limit} byte limit; reduce the content size, then retry"
    )]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("{0}")]
    Validation(String),

    #[error("Article not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Failed to encode article payload: {0}")]
    Serialization(#[from] serde_json::Error),
}
