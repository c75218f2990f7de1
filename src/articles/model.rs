use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use super::limits::{MAX_PAGE_SIZE, MAX_TAGS};
use super::stored::{LargeField, Stored};
use super::ArticleError;

fn new_section_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSection {
    #[serde(default = "new_section_id")]
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<Value>,
    #[serde(default)]
    pub sources: Vec<Value>,
    pub order: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
    Archived,
    Scheduled,
}

impl ArticleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Draft => "draft",
            ArticleStatus::Published => "published",
            ArticleStatus::Archived => "archived",
            ArticleStatus::Scheduled => "scheduled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    #[default]
    Account,
    Public,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Private => "private",
            Visibility::Account => "account",
            Visibility::Public => "public",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::Upvote => "upvote",
            VoteType::Downvote => "downvote",
        }
    }

    /// Contribution to `vote_score`
    pub fn weight(self) -> i64 {
        match self {
            VoteType::Upvote => 1,
            VoteType::Downvote => -1,
        }
    }

    /// Vote left after the caller clicks `self` while holding `current`:
    /// the same type again withdraws the vote, the other type replaces it
    pub fn toggle(self, current: Option<VoteType>) -> Option<VoteType> {
        if current == Some(self) {
            None
        } else {
            Some(self)
        }
    }
}

impl FromStr for VoteType {
    type Err = ArticleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteType::Upvote),
            "downvote" => Ok(VoteType::Downvote),
            _ => Err(ArticleError::Validation(
                "Vote type must be 'upvote' or 'downvote'".to_string(),
            )),
        }
    }
}

/// Scalar article metadata carried by a write. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFields {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub author: Option<String>,
    pub status: Option<ArticleStatus>,
    pub visibility: Option<Visibility>,
    pub read_time: Option<String>,
    pub image_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub account_id: Option<Uuid>,
}

/// The large fields of a write, always holding original values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleBody {
    pub content: Option<String>,
    pub sections: Option<Vec<ArticleSection>>,
    pub media_items: Option<Vec<Value>>,
    pub sources: Option<Vec<Value>>,
}

/// Article write payload before any size handling
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleDraft {
    pub fields: ArticleFields,
    pub body: ArticleBody,
}

fn validate_tags(tags: &[String]) -> Result<(), ArticleError> {
    if tags.len() > MAX_TAGS {
        return Err(ArticleError::Validation(format!(
            "Maximum {} tags allowed",
            MAX_TAGS
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,
    pub subtitle: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Display name only; the creator id comes from the caller
    pub author: String,
    #[serde(default)]
    pub status: ArticleStatus,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub media_items: Vec<Value>,
    #[serde(default)]
    pub sources: Vec<Value>,
    #[serde(default)]
    pub sections: Vec<ArticleSection>,
    pub read_time: String,
    pub image_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub account_id: Uuid,
}

impl CreateArticleRequest {
    pub fn validate(&self) -> Result<(), ArticleError> {
        if self.title.trim().is_empty() {
            return Err(ArticleError::Validation("Title is required".to_string()));
        }
        validate_tags(&self.tags)
    }

    pub fn into_draft(self) -> ArticleDraft {
        ArticleDraft {
            fields: ArticleFields {
                title: Some(self.title),
                subtitle: Some(self.subtitle),
                category: Some(self.category),
                tags: Some(self.tags),
                author: Some(self.author),
                status: Some(self.status),
                visibility: Some(self.visibility),
                read_time: Some(self.read_time),
                image_url: self.image_url,
                publish_date: self.publish_date,
                account_id: Some(self.account_id),
            },
            body: ArticleBody {
                content: Some(self.content),
                sections: Some(self.sections),
                media_items: Some(self.media_items),
                sources: Some(self.sources),
            },
        }
    }
}

/// Partial update; account and creator are deliberately absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<ArticleStatus>,
    pub visibility: Option<Visibility>,
    pub media_items: Option<Vec<Value>>,
    pub sources: Option<Vec<Value>>,
    pub sections: Option<Vec<ArticleSection>>,
    pub read_time: Option<String>,
    pub image_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
}

impl UpdateArticleRequest {
    pub fn validate(&self) -> Result<(), ArticleError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ArticleError::Validation("Title cannot be empty".to_string()));
            }
        }
        match &self.tags {
            Some(tags) => validate_tags(tags),
            None => Ok(()),
        }
    }

    pub fn into_draft(self) -> ArticleDraft {
        ArticleDraft {
            fields: ArticleFields {
                title: self.title,
                subtitle: self.subtitle,
                category: self.category,
                tags: self.tags,
                author: None,
                status: self.status,
                visibility: self.visibility,
                read_time: self.read_time,
                image_url: self.image_url,
                publish_date: self.publish_date,
                account_id: None,
            },
            body: ArticleBody {
                content: self.content,
                sections: self.sections,
                media_items: self.media_items,
                sources: self.sources,
            },
        }
    }
}

/// Scalar columns shared by raw rows and rehydrated articles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleMeta {
    pub account_id: Option<Uuid>,
    pub created_by_user_id: Option<Uuid>,
    pub title: String,
    pub subtitle: String,
    pub category: String,
    pub tags: Vec<String>,
    pub author: String,
    pub status: ArticleStatus,
    pub visibility: Visibility,
    pub read_time: String,
    pub image_url: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    /// Upvotes minus downvotes, maintained by the store
    pub vote_score: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Sidecar columns that point at externalized payloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageColumns {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sections_storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_items_storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_storage_path: Option<String>,
}

impl StorageColumns {
    pub fn path(&self, field: LargeField) -> Option<&str> {
        match field {
            LargeField::Content => self.content_storage_path.as_deref(),
            LargeField::Sections => self.sections_storage_path.as_deref(),
            LargeField::MediaItems => self.media_items_storage_path.as_deref(),
            LargeField::Sources => self.sources_storage_path.as_deref(),
        }
    }

    /// All non-null blob paths, in field order
    pub fn paths(&self) -> Vec<String> {
        LargeField::ALL
            .iter()
            .filter_map(|field| self.path(*field))
            .map(str::to_string)
            .collect()
    }
}

/// A row exactly as the relational store returns it
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ArticleRow {
    pub id: Uuid,
    #[serde(flatten)]
    pub meta: ArticleMeta,
    #[serde(default)]
    pub content: Option<Stored<String>>,
    #[serde(default)]
    pub sections: Option<Stored<Vec<ArticleSection>>>,
    #[serde(default)]
    pub media_items: Option<Stored<Vec<Value>>>,
    #[serde(default)]
    pub sources: Option<Stored<Vec<Value>>>,
    #[serde(flatten)]
    pub storage: StorageColumns,
}

/// An article with every externalized field resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    #[serde(flatten)]
    pub meta: ArticleMeta,
    pub content: String,
    pub sections: Vec<ArticleSection>,
    pub media_items: Vec<Value>,
    pub sources: Vec<Value>,
    #[serde(flatten)]
    pub storage: StorageColumns,
}

/// An article as returned to one caller, with that caller's vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VotedArticle {
    #[serde(flatten)]
    pub article: Article,
    pub user_vote: Option<VoteType>,
}

/// Sort order of a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArticleOrder {
    #[default]
    Newest,
    /// Highest `vote_score` first, newest first among equal scores
    TopVoted,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleFilters {
    pub status: Option<ArticleStatus>,
    pub category: Option<String>,
    /// Case-insensitive match on title or subtitle
    pub search: Option<String>,
    pub visibility: Option<Visibility>,
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArticlePagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for ArticlePagination {
    fn default() -> Self {
        Self { page: 1, page_size: 10 }
    }
}

impl ArticlePagination {
    pub fn validate(&self) -> Result<(), ArticleError> {
        if self.page == 0 {
            return Err(ArticleError::Validation("Page starts at 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(ArticleError::Validation("Page size must be positive".to_string()));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(ArticleError::Validation(format!(
                "Page size cannot exceed {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}
