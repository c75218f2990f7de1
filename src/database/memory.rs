use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::record::WriteSet;
use super::{ArticleStore, DatabaseError};
use crate::articles::{
    ArticleFilters, ArticleOrder, ArticlePagination, ArticleRow, StorageColumns, VoteType,
};

#[derive(Debug, Clone)]
struct StoredRow {
    seq: u64,
    columns: Map<String, Value>,
}

/// Process-local `articles` table with the same row shape as Postgres'
/// `row_to_json` output. Used by the `memory` database backend and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryArticleStore {
    rows: Arc<RwLock<HashMap<Uuid, StoredRow>>>,
    /// (article_id, user_id) -> vote
    votes: Arc<RwLock<HashMap<(Uuid, Uuid), VoteType>>>,
    next_seq: Arc<AtomicU64>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make inserts and updates fail until switched off
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw column map of a row, markers included
    pub async fn raw(&self, id: Uuid) -> Option<Map<String, Value>> {
        self.rows.read().await.get(&id).map(|r| r.columns.clone())
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("simulated write failure".to_string()));
        }
        Ok(())
    }

    fn now() -> Value {
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

fn decode<T: DeserializeOwned>(columns: &Map<String, Value>) -> Result<T, DatabaseError> {
    serde_json::from_value(Value::Object(columns.clone()))
        .map_err(|e| DatabaseError::InvalidRow(e.to_string()))
}

fn text<'a>(columns: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    columns.get(key).and_then(Value::as_str)
}

fn vote_score(columns: &Map<String, Value>) -> i64 {
    columns.get("vote_score").and_then(Value::as_i64).unwrap_or(0)
}

fn matches(columns: &Map<String, Value>, filters: &ArticleFilters) -> bool {
    if let Some(status) = filters.status {
        if text(columns, "status") != Some(status.as_str()) {
            return false;
        }
    }
    if let Some(category) = &filters.category {
        if text(columns, "category") != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(visibility) = filters.visibility {
        if text(columns, "visibility") != Some(visibility.as_str()) {
            return false;
        }
    }
    if let Some(account_id) = filters.account_id {
        if text(columns, "account_id") != Some(account_id.to_string().as_str()) {
            return false;
        }
    }
    if let Some(search) = filters.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        let hit = ["title", "subtitle"].iter().any(|key| {
            text(columns, key)
                .map(|v| v.to_lowercase().contains(&needle))
                .unwrap_or(false)
        });
        if !hit {
            return false;
        }
    }
    true
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn insert(&self, id: Uuid, write: &WriteSet) -> Result<ArticleRow, DatabaseError> {
        self.check_writable()?;

        let mut rows = self.rows.write().await;
        if rows.contains_key(&id) {
            return Err(DatabaseError::QueryError(format!("duplicate key: {}", id)));
        }

        let mut columns = write.to_json_map();
        columns.insert("id".to_string(), Value::String(id.to_string()));
        columns.insert("created_at".to_string(), Self::now());
        columns.insert("updated_at".to_string(), Self::now());

        let row = decode(&columns)?;
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        rows.insert(id, StoredRow { seq, columns });
        Ok(row)
    }

    async fn update(
        &self,
        id: Uuid,
        write: &WriteSet,
    ) -> Result<Option<ArticleRow>, DatabaseError> {
        self.check_writable()?;

        let mut rows = self.rows.write().await;
        let Some(stored) = rows.get_mut(&id) else {
            return Ok(None);
        };

        let mut columns = stored.columns.clone();
        columns.extend(write.to_json_map());
        columns.insert("updated_at".to_string(), Self::now());

        let row = decode(&columns)?;
        stored.columns = columns;
        Ok(Some(row))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let removed = self.rows.write().await.remove(&id).is_some();
        if removed {
            self.votes.write().await.retain(|(article_id, _), _| *article_id != id);
        }
        Ok(removed)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ArticleRow>, DatabaseError> {
        self.rows
            .read()
            .await
            .get(&id)
            .map(|stored| decode(&stored.columns))
            .transpose()
    }

    async fn storage_columns(&self, id: Uuid) -> Result<Option<StorageColumns>, DatabaseError> {
        self.rows
            .read()
            .await
            .get(&id)
            .map(|stored| decode(&stored.columns))
            .transpose()
    }

    async fn list(
        &self,
        filters: &ArticleFilters,
        order: ArticleOrder,
        pagination: &ArticlePagination,
    ) -> Result<(Vec<ArticleRow>, i64), DatabaseError> {
        let rows = self.rows.read().await;

        let mut matched: Vec<&StoredRow> =
            rows.values().filter(|r| matches(&r.columns, filters)).collect();
        // Insertion order breaks timestamp ties
        matched.sort_by(|a, b| {
            let a_created = text(&a.columns, "created_at").unwrap_or_default();
            let b_created = text(&b.columns, "created_at").unwrap_or_default();
            let newest = b_created.cmp(a_created).then(b.seq.cmp(&a.seq));
            match order {
                ArticleOrder::Newest => newest,
                ArticleOrder::TopVoted => vote_score(&b.columns)
                    .cmp(&vote_score(&a.columns))
                    .then(newest),
            }
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit() as usize)
            .map(|r| decode(&r.columns))
            .collect::<Result<Vec<ArticleRow>, _>>()?;

        Ok((page, total))
    }

    async fn find_vote(
        &self,
        article_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<VoteType>, DatabaseError> {
        Ok(self.votes.read().await.get(&(article_id, user_id)).copied())
    }

    async fn set_vote(
        &self,
        article_id: Uuid,
        user_id: Uuid,
        vote: Option<VoteType>,
    ) -> Result<bool, DatabaseError> {
        self.check_writable()?;

        let mut rows = self.rows.write().await;
        let Some(stored) = rows.get_mut(&article_id) else {
            return Ok(false);
        };

        let mut votes = self.votes.write().await;
        match vote {
            Some(vote) => votes.insert((article_id, user_id), vote),
            None => votes.remove(&(article_id, user_id)),
        };
        let score: i64 = votes
            .iter()
            .filter(|((id, _), _)| *id == article_id)
            .map(|(_, vote)| vote.weight())
            .sum();
        stored.columns.insert("vote_score".to_string(), Value::from(score));
        Ok(true)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::ArticleStatus;
    use crate::database::record::ColumnValue;

    fn write(title: &str, status: ArticleStatus) -> WriteSet {
        let mut w = WriteSet::new();
        w.set("title", ColumnValue::text(title))
            .set("subtitle", ColumnValue::text("sub"))
            .set("status", ColumnValue::text(status.as_str()));
        w
    }

    #[tokio::test]
    async fn insert_update_find_roundtrip() {
        let store = MemoryArticleStore::new();
        let id = Uuid::new_v4();
        store.insert(id, &write("First", ArticleStatus::Draft)).await.unwrap();

        let mut patch = WriteSet::new();
        patch.set("title", ColumnValue::text("Renamed"));
        let row = store.update(id, &patch).await.unwrap().unwrap();
        assert_eq!(row.meta.title, "Renamed");
        assert_eq!(row.meta.subtitle, "sub");

        assert!(store.update(Uuid::new_v4(), &patch).await.unwrap().is_none());
        assert!(store.find(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_filters_and_orders_newest_first() {
        let store = MemoryArticleStore::new();
        for (title, status) in [
            ("Rust news", ArticleStatus::Published),
            ("Go news", ArticleStatus::Draft),
            ("More RUST", ArticleStatus::Published),
        ] {
            store.insert(Uuid::new_v4(), &write(title, status)).await.unwrap();
        }

        let filters = ArticleFilters {
            status: Some(ArticleStatus::Published),
            search: Some("rust".to_string()),
            ..Default::default()
        };
        let (rows, total) = store
            .list(&filters, ArticleOrder::Newest, &ArticlePagination::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].meta.title, "More RUST");
        assert_eq!(rows[1].meta.title, "Rust news");

        let second_page = ArticlePagination { page: 2, page_size: 1 };
        let (rows, total) = store
            .list(&filters, ArticleOrder::Newest, &second_page)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].meta.title, "Rust news");
    }

    #[tokio::test]
    async fn votes_maintain_score_and_order() {
        let store = MemoryArticleStore::new();
        let quiet = Uuid::new_v4();
        let popular = Uuid::new_v4();
        store.insert(popular, &write("Popular", ArticleStatus::Published)).await.unwrap();
        store.insert(quiet, &write("Quiet", ArticleStatus::Published)).await.unwrap();

        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        assert!(store.set_vote(popular, alice, Some(VoteType::Upvote)).await.unwrap());
        assert!(store.set_vote(popular, bob, Some(VoteType::Upvote)).await.unwrap());
        assert!(store.set_vote(quiet, alice, Some(VoteType::Downvote)).await.unwrap());
        assert!(!store.set_vote(Uuid::new_v4(), alice, Some(VoteType::Upvote)).await.unwrap());

        assert_eq!(store.find(popular).await.unwrap().unwrap().meta.vote_score, 2);
        assert_eq!(store.find_vote(quiet, alice).await.unwrap(), Some(VoteType::Downvote));

        let (rows, _) = store
            .list(&ArticleFilters::default(), ArticleOrder::TopVoted, &ArticlePagination::default())
            .await
            .unwrap();
        assert_eq!(rows[0].meta.title, "Popular");
        assert_eq!(rows[1].meta.title, "Quiet");

        assert!(store.set_vote(popular, bob, None).await.unwrap());
        assert_eq!(store.find(popular).await.unwrap().unwrap().meta.vote_score, 1);
        assert_eq!(store.find_vote(popular, bob).await.unwrap(), None);

        store.delete(quiet).await.unwrap();
        assert_eq!(store.find_vote(quiet, alice).await.unwrap(), None);
    }

    #[tokio::test]
    async fn scripted_write_failures() {
        let store = MemoryArticleStore::new();
        store.fail_writes(true);
        assert!(store.insert(Uuid::new_v4(), &WriteSet::new()).await.is_err());
        assert!(store.is_empty().await);
    }
}
