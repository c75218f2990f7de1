//! Write-side half of the hybrid storage: decides per field whether an
//! article payload stays in the row or moves to a blob.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::limits::*;
use super::model::{ArticleBody, ArticleDraft, ArticleFields, ArticleSection};
use super::stored::{encode_envelope, placeholder, LargeField, Stored};
use super::ArticleError;
use crate::database::record::{ColumnValue, WriteSet};
use crate::storage::{ObjectStore, StorageError, UploadOptions};

/// Large fields after sizing. `None` means the write does not touch the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedBody {
    pub content: Option<Stored<String>>,
    /// Original content length in characters, set only when externalized
    pub content_size: Option<usize>,
    pub sections: Option<Stored<Vec<ArticleSection>>>,
    pub media_items: Option<Stored<Vec<Value>>>,
    pub sources: Option<Stored<Vec<Value>>>,
    /// Fields whose blob write failed and were truncated in the row instead
    pub degraded: Vec<LargeField>,
}

impl PreparedBody {
    pub fn touches(&self, field: LargeField) -> bool {
        match field {
            LargeField::Content => self.content.is_some(),
            LargeField::Sections => self.sections.is_some(),
            LargeField::MediaItems => self.media_items.is_some(),
            LargeField::Sources => self.sources.is_some(),
        }
    }

    pub fn storage_path(&self, field: LargeField) -> Option<&str> {
        match field {
            LargeField::Content => self.content.as_ref().and_then(Stored::storage_path),
            LargeField::Sections => self.sections.as_ref().and_then(Stored::storage_path),
            LargeField::MediaItems => self.media_items.as_ref().and_then(Stored::storage_path),
            LargeField::Sources => self.sources.as_ref().and_then(Stored::storage_path),
        }
    }

    /// Blob paths written for this payload
    pub fn external_paths(&self) -> Vec<String> {
        LargeField::ALL
            .iter()
            .filter_map(|field| self.storage_path(*field))
            .map(str::to_string)
            .collect()
    }
}

/// Persistable article payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedArticle {
    pub fields: ArticleFields,
    pub body: PreparedBody,
}

impl PreparedArticle {
    /// Row columns for this payload.
    ///
    /// A touched large field always writes its sidecar path (NULL when
    /// inline) so a row never keeps a pointer to a blob it no longer uses.
    pub fn write_set(&self) -> serde_json::Result<WriteSet> {
        let mut write = WriteSet::new();
        let f = &self.fields;

        if let Some(v) = &f.title {
            write.set("title", ColumnValue::text(v));
        }
        if let Some(v) = &f.subtitle {
            write.set("subtitle", ColumnValue::text(v));
        }
        if let Some(v) = &f.category {
            write.set("category", ColumnValue::text(v));
        }
        if let Some(v) = &f.tags {
            write.set("tags", ColumnValue::Json(serde_json::to_value(v)?));
        }
        if let Some(v) = &f.author {
            write.set("author", ColumnValue::text(v));
        }
        if let Some(v) = f.status {
            write.set("status", ColumnValue::text(v.as_str()));
        }
        if let Some(v) = f.visibility {
            write.set("visibility", ColumnValue::text(v.as_str()));
        }
        if let Some(v) = &f.read_time {
            write.set("read_time", ColumnValue::text(v));
        }
        if let Some(v) = &f.image_url {
            write.set("image_url", ColumnValue::text(v));
        }
        if let Some(v) = f.publish_date {
            write.set("publish_date", ColumnValue::Timestamp(Some(v)));
        }
        if let Some(v) = f.account_id {
            write.set("account_id", ColumnValue::Uuid(Some(v)));
        }

        let body = &self.body;
        if let Some(content) = &body.content {
            let text = match content {
                Stored::Inline(c) => c.clone(),
                Stored::External(path) => placeholder(path),
            };
            write.set("content", ColumnValue::text(text));
            write.set(
                "content_size",
                ColumnValue::BigInt(body.content_size.map(|s| s as i64)),
            );
        }
        if let Some(sections) = &body.sections {
            write.set("sections", ColumnValue::Json(serde_json::to_value(sections)?));
        }
        if let Some(media) = &body.media_items {
            write.set("media_items", ColumnValue::Json(serde_json::to_value(media)?));
        }
        if let Some(sources) = &body.sources {
            write.set("sources", ColumnValue::Json(serde_json::to_value(sources)?));
        }
        for field in LargeField::ALL {
            if body.touches(field) {
                write.set(
                    field.storage_path_column(),
                    ColumnValue::Text(body.storage_path(field).map(str::to_string)),
                );
            }
        }

        Ok(write)
    }
}

/// Placement of every touched large field, decided before any blob is
/// written.
///
/// Fields bound for the object store already carry their deterministic
/// path, so the final row size is known up front and an oversized write is
/// refused without touching storage.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingPlan {
    article_id: Uuid,
    prepared: PreparedArticle,
    /// Original values of the fields planned as external
    pending: ArticleBody,
}

impl SizingPlan {
    /// Must be fed original values: sizing already prepared output would
    /// measure the markers instead of the content.
    pub fn new(article_id: Uuid, draft: ArticleDraft) -> Result<Self, ArticleError> {
        let ArticleDraft { fields, body } = draft;
        let mut prepared = PreparedBody::default();
        let mut pending = ArticleBody::default();

        if let Some(content) = body.content {
            let length = content.chars().count();
            if length > STORAGE_THRESHOLD {
                let path = LargeField::Content.blob_path(article_id);
                prepared.content = Some(Stored::External(path));
                prepared.content_size = Some(length);
                pending.content = Some(content);
            } else {
                prepared.content = Some(Stored::Inline(content));
            }
        }

        if let Some(sections) = body.sections {
            let oversized = json_len(&sections)? > FIELD_SIZE_LIMIT;
            prepared.sections = Some(plan_list(
                article_id,
                LargeField::Sections,
                sections,
                oversized,
                &mut pending.sections,
            ));
        }

        if let Some(media) = body.media_items {
            let oversized = media.len() > MAX_MEDIA_ITEMS || json_len(&media)? > FIELD_SIZE_LIMIT;
            prepared.media_items = Some(plan_list(
                article_id,
                LargeField::MediaItems,
                media,
                oversized,
                &mut pending.media_items,
            ));
        }

        if let Some(sources) = body.sources {
            let oversized = sources.len() > MAX_SOURCES || json_len(&sources)? > FIELD_SIZE_LIMIT;
            prepared.sources = Some(plan_list(
                article_id,
                LargeField::Sources,
                sources,
                oversized,
                &mut pending.sources,
            ));
        }

        let prepared = PreparedArticle { fields, body: prepared };
        check_total(article_id, &prepared)?;

        Ok(Self {
            article_id,
            prepared,
            pending,
        })
    }

    pub fn article_id(&self) -> Uuid {
        self.article_id
    }

    /// Row payload as it will be written if every upload succeeds
    pub fn prepared(&self) -> &PreparedArticle {
        &self.prepared
    }

    /// Fields that will be uploaded, in write order
    pub fn external_fields(&self) -> Vec<LargeField> {
        LargeField::ALL
            .iter()
            .copied()
            .filter(|field| self.prepared.body.storage_path(*field).is_some())
            .collect()
    }

    pub fn external_paths(&self) -> Vec<String> {
        self.prepared.body.external_paths()
    }
}

fn plan_list<T>(
    article_id: Uuid,
    field: LargeField,
    items: Vec<T>,
    oversized: bool,
    pending: &mut Option<Vec<T>>,
) -> Stored<Vec<T>> {
    if !oversized {
        return Stored::Inline(items);
    }
    *pending = Some(items);
    Stored::External(field.blob_path(article_id))
}

fn check_total(article_id: Uuid, prepared: &PreparedArticle) -> Result<(), ArticleError> {
    let size = prepared.write_set()?.serialized_len()?;
    if size > TOTAL_PAYLOAD_LIMIT {
        warn!(
            "Article {} payload is {} bytes after externalization (limit {})",
            article_id, size, TOTAL_PAYLOAD_LIMIT
        );
        return Err(ArticleError::PayloadTooLarge {
            size,
            limit: TOTAL_PAYLOAD_LIMIT,
        });
    }
    Ok(())
}

/// Record a list that had to stay in the row although it was planned external
fn settle<T>(
    field: LargeField,
    stored: Stored<Vec<T>>,
    degraded: &mut Vec<LargeField>,
) -> Stored<Vec<T>> {
    if !stored.is_external() {
        degraded.push(field);
    }
    stored
}

/// Carries out a [`SizingPlan`] against the object store.
pub struct PayloadSizer {
    objects: Arc<dyn ObjectStore>,
}

impl PayloadSizer {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Upload the planned blobs, content first.
    ///
    /// A content failure aborts before any list is written. A list failure
    /// keeps a truncated copy in the row instead, after which the total size
    /// is checked again.
    pub async fn store(&self, plan: SizingPlan) -> Result<PreparedArticle, ArticleError> {
        let SizingPlan {
            article_id,
            mut prepared,
            pending,
        } = plan;
        let body = &mut prepared.body;

        if let Some(content) = pending.content {
            let path = self
                .write_blob(article_id, LargeField::Content, &content)
                .await?
                .map_err(|e| {
                    error!("Failed to store content for article {}: {}", article_id, e);
                    ArticleError::ContentStorage(e)
                })?;
            info!(
                "Stored {} chars of content for article {} at {}",
                content.chars().count(),
                article_id,
                path
            );
        }

        if let Some(sections) = pending.sections {
            let stored = self
                .store_list(article_id, LargeField::Sections, sections, truncate_sections)
                .await?;
            body.sections = Some(settle(LargeField::Sections, stored, &mut body.degraded));
        }

        if let Some(media) = pending.media_items {
            let stored = self
                .store_list(article_id, LargeField::MediaItems, media, truncate_media_items)
                .await?;
            body.media_items = Some(settle(LargeField::MediaItems, stored, &mut body.degraded));
        }

        if let Some(sources) = pending.sources {
            let stored = self
                .store_list(article_id, LargeField::Sources, sources, truncate_sources)
                .await?;
            body.sources = Some(settle(LargeField::Sources, stored, &mut body.degraded));
        }

        if !prepared.body.degraded.is_empty() {
            check_total(article_id, &prepared)?;
        }

        Ok(prepared)
    }

    /// Upload one list, falling back to a truncated inline copy if the blob
    /// cannot be written
    async fn store_list<T: Serialize>(
        &self,
        article_id: Uuid,
        field: LargeField,
        items: Vec<T>,
        fallback: fn(Vec<T>) -> Vec<T>,
    ) -> Result<Stored<Vec<T>>, ArticleError> {
        match self.write_blob(article_id, field, &items).await? {
            Ok(path) => {
                info!(
                    "Stored {} {} entries for article {} at {}",
                    items.len(),
                    field,
                    article_id,
                    path
                );
                Ok(Stored::External(path))
            }
            Err(e) => {
                warn!(
                    "Failed to store {} for article {}, keeping a truncated copy in the row: {}",
                    field, article_id, e
                );
                Ok(Stored::Inline(fallback(items)))
            }
        }
    }

    /// Upsert `{field: value, timestamp}` at the field's blob path.
    /// The outer error is an encoding failure, the inner one a storage failure.
    async fn write_blob<T: Serialize>(
        &self,
        article_id: Uuid,
        field: LargeField,
        value: &T,
    ) -> Result<Result<String, StorageError>, ArticleError> {
        let path = field.blob_path(article_id);
        let bytes = encode_envelope(field, value)?;
        Ok(self
            .objects
            .upload(&path, bytes, UploadOptions::json_upsert())
            .await
            .map(|_| path))
    }
}

fn json_len<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn truncate_sections(sections: Vec<ArticleSection>) -> Vec<ArticleSection> {
    sections
        .into_iter()
        .take(FALLBACK_MAX_SECTIONS)
        .map(|mut section| {
            section.content = truncate_chars(&section.content, FALLBACK_SECTION_CONTENT_CHARS);
            section.media.truncate(FALLBACK_SECTION_MEDIA);
            section.sources.truncate(FALLBACK_SECTION_SOURCES);
            section
        })
        .collect()
}

fn truncate_media_items(media: Vec<Value>) -> Vec<Value> {
    media
        .into_iter()
        .take(MAX_MEDIA_ITEMS)
        .map(|mut item| {
            if let Value::Object(map) = &mut item {
                let limits = [
                    ("url", FALLBACK_MEDIA_URL_CHARS),
                    ("name", FALLBACK_MEDIA_NAME_CHARS),
                ];
                for (key, max) in limits {
                    if let Some(Value::String(s)) = map.get_mut(key) {
                        *s = truncate_chars(s, max);
                    }
                }
            }
            item
        })
        .collect()
}

fn truncate_sources(sources: Vec<Value>) -> Vec<Value> {
    sources.into_iter().take(MAX_SOURCES).collect()
}
