use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::externalizer::{PayloadSizer, PreparedBody, SizingPlan};
use super::model::{
    Article, ArticleFilters, ArticleOrder, ArticlePage, ArticlePagination, ArticleRow,
    ArticleStatus, CreateArticleRequest, StorageColumns, UpdateArticleRequest, Visibility,
    VoteType, VotedArticle,
};
use super::rehydrator::ContentRehydrator;
use super::stored::LargeField;
use super::ArticleError;
use crate::database::record::ColumnValue;
use crate::database::{ArticleStore, DatabaseError};
use crate::storage::{ObjectStore, StorageError, UploadOptions};

/// Blobs an update is about to overwrite, kept so a failed write can put
/// them back
#[derive(Debug, Default)]
struct BlobSnapshot {
    /// Blobs the row already pointed at, with their bytes before the write
    existing: Vec<(String, Vec<u8>)>,
    /// Paths the row did not point at before the write
    created: Vec<String>,
}

/// Article operations over a relational store and an object store.
///
/// Every write goes through [`PayloadSizer`] and every read through
/// [`ContentRehydrator`]; storage markers never leave this type.
pub struct ArticlesService {
    store: Arc<dyn ArticleStore>,
    objects: Arc<dyn ObjectStore>,
    sizer: PayloadSizer,
    rehydrator: ContentRehydrator,
}

impl ArticlesService {
    pub fn new(store: Arc<dyn ArticleStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            sizer: PayloadSizer::new(objects.clone()),
            rehydrator: ContentRehydrator::new(objects.clone()),
            store,
            objects,
        }
    }

    /// Oversized payloads are refused before anything is uploaded. Blobs
    /// written for a create that then fails are removed.
    pub async fn create(
        &self,
        user_id: Option<Uuid>,
        request: CreateArticleRequest,
    ) -> Result<Article, ArticleError> {
        request.validate()?;
        let id = Uuid::new_v4();

        let plan = SizingPlan::new(id, request.into_draft())?;
        let planned = plan.external_paths();

        let (row, body) = match self.insert_planned(id, user_id, plan).await {
            Ok(written) => written,
            Err(e) => {
                if !planned.is_empty() {
                    self.remove_blobs(id, planned).await;
                }
                return Err(e);
            }
        };

        info!(
            "Created article {} ({} externalized fields)",
            id,
            body.external_paths().len()
        );
        Ok(self.rehydrator.rehydrate(row).await)
    }

    async fn insert_planned(
        &self,
        id: Uuid,
        user_id: Option<Uuid>,
        plan: SizingPlan,
    ) -> Result<(ArticleRow, PreparedBody), ArticleError> {
        let prepared = self.sizer.store(plan).await?;
        let mut write = prepared.write_set()?;
        write.set("created_by_user_id", ColumnValue::Uuid(user_id));

        let row = self.store.insert(id, &write).await?;
        Ok((row, prepared.body))
    }

    /// Partial update. Either the row and its blobs both change or neither
    /// does: blobs overwritten by a failed write are restored and blobs it
    /// created are removed.
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateArticleRequest,
    ) -> Result<Article, ArticleError> {
        request.validate()?;

        let previous = self
            .store
            .storage_columns(id)
            .await?
            .ok_or(ArticleError::NotFound(id))?;

        let plan = SizingPlan::new(id, request.into_draft())?;
        let snapshot = self.snapshot(&previous, &plan).await?;

        let (row, body) = match self.update_planned(id, plan).await {
            Ok(written) => written,
            Err(e) => {
                warn!("Update of article {} failed, restoring stored files: {}", id, e);
                self.restore(id, snapshot).await;
                return Err(e);
            }
        };

        // A touched field that no longer uses its old path leaves that blob stale
        let stale: Vec<String> = LargeField::ALL
            .iter()
            .filter(|field| body.touches(**field))
            .filter_map(|field| {
                previous
                    .path(*field)
                    .filter(|old| body.storage_path(*field) != Some(*old))
            })
            .map(str::to_string)
            .collect();
        if !stale.is_empty() {
            self.remove_blobs(id, stale).await;
        }

        info!("Updated article {}", id);
        Ok(self.rehydrator.rehydrate(row).await)
    }

    async fn update_planned(
        &self,
        id: Uuid,
        plan: SizingPlan,
    ) -> Result<(ArticleRow, PreparedBody), ArticleError> {
        let prepared = self.sizer.store(plan).await?;
        let write = prepared.write_set()?;

        let row = self
            .store
            .update(id, &write)
            .await?
            .ok_or(ArticleError::NotFound(id))?;
        Ok((row, prepared.body))
    }

    /// Read every blob the plan will overwrite
    async fn snapshot(
        &self,
        previous: &StorageColumns,
        plan: &SizingPlan,
    ) -> Result<BlobSnapshot, ArticleError> {
        let mut snapshot = BlobSnapshot::default();

        for field in plan.external_fields() {
            let path = field.blob_path(plan.article_id());
            if previous.path(field) != Some(path.as_str()) {
                snapshot.created.push(path);
                continue;
            }

            match self.objects.download(&path).await {
                Ok(bytes) => snapshot.existing.push((path, bytes)),
                Err(StorageError::NotFound(_)) => snapshot.created.push(path),
                Err(e) => {
                    error!("Failed to read {} before overwriting it: {}", path, e);
                    return Err(ArticleError::Storage(e));
                }
            }
        }

        Ok(snapshot)
    }

    /// Best-effort: put overwritten blobs back and drop the new ones
    async fn restore(&self, id: Uuid, snapshot: BlobSnapshot) {
        for (path, bytes) in snapshot.existing {
            if let Err(e) = self.objects.upload(&path, bytes, UploadOptions::json_upsert()).await {
                error!("Failed to restore {} for article {}: {}", path, id, e);
            }
        }
        if !snapshot.created.is_empty() {
            self.remove_blobs(id, snapshot.created).await;
        }
    }

    /// Delete the row, then its blobs. Blob cleanup is best-effort.
    pub async fn delete(&self, id: Uuid) -> Result<(), ArticleError> {
        let storage = self
            .store
            .storage_columns(id)
            .await?
            .ok_or(ArticleError::NotFound(id))?;

        if !self.store.delete(id).await? {
            return Err(ArticleError::NotFound(id));
        }

        let paths = storage.paths();
        if !paths.is_empty() {
            self.remove_blobs(id, paths).await;
        }

        info!("Deleted article {}", id);
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Article, ArticleError> {
        let row = self.store.find(id).await?.ok_or(ArticleError::NotFound(id))?;
        Ok(self.rehydrator.rehydrate(row).await)
    }

    /// The article plus the caller's vote, if the caller is known
    pub async fn get_for_user(
        &self,
        id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<VotedArticle, ArticleError> {
        let article = self.get(id).await?;
        let user_vote = match user_id {
            Some(user_id) => self.store.find_vote(id, user_id).await?,
            None => None,
        };
        Ok(VotedArticle { article, user_vote })
    }

    /// Voting the same way twice withdraws the vote; the other way switches it
    pub async fn vote(
        &self,
        user_id: Uuid,
        id: Uuid,
        vote: VoteType,
    ) -> Result<VotedArticle, ArticleError> {
        let current = self.store.find_vote(id, user_id).await?;
        let next = vote.toggle(current);

        if !self.store.set_vote(id, user_id, next).await? {
            return Err(ArticleError::NotFound(id));
        }

        match next {
            Some(vote) => info!("User {} cast {} on article {}", user_id, vote.as_str(), id),
            None => info!("User {} withdrew their vote on article {}", user_id, id),
        }
        self.get_for_user(id, Some(user_id)).await
    }

    /// Newest first
    pub async fn list(
        &self,
        filters: &ArticleFilters,
        pagination: ArticlePagination,
    ) -> Result<ArticlePage, ArticleError> {
        self.page(filters, ArticleOrder::Newest, pagination).await
    }

    /// Public, published articles ranked by votes. Other visibility and
    /// status filters are ignored.
    pub async fn discover(
        &self,
        category: Option<String>,
        search: Option<String>,
        pagination: ArticlePagination,
    ) -> Result<ArticlePage, ArticleError> {
        let filters = ArticleFilters {
            status: Some(ArticleStatus::Published),
            visibility: Some(Visibility::Public),
            category,
            search,
            account_id: None,
        };
        self.page(&filters, ArticleOrder::TopVoted, pagination).await
    }

    async fn page(
        &self,
        filters: &ArticleFilters,
        order: ArticleOrder,
        pagination: ArticlePagination,
    ) -> Result<ArticlePage, ArticleError> {
        pagination.validate()?;

        let (rows, total_count) = self.store.list(filters, order, &pagination).await?;
        let articles = self.rehydrator.rehydrate_all(rows).await;
        let has_more = pagination.offset() + (articles.len() as i64) < total_count;

        Ok(ArticlePage {
            articles,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
            has_more,
        })
    }

    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        self.store.ping().await
    }

    async fn remove_blobs(&self, id: Uuid, paths: Vec<String>) {
        if let Err(e) = self.objects.remove(&paths).await {
            warn!("Failed to remove {} stored files for article {}: {}", paths.len(), id, e);
        }
    }
}
