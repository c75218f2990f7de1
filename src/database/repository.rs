use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use super::manager::DatabaseManager;
use super::record::{ColumnValue, WriteSet};
use super::{ArticleStore, DatabaseError};
use crate::articles::{
    ArticleFilters, ArticleOrder, ArticlePagination, ArticleRow, StorageColumns, VoteType,
};

const TABLE: &str = "articles";

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Postgres-backed `articles` table
#[derive(Clone)]
pub struct PgArticleRepository {
    pool: PgPool,
}

impl PgArticleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Filter parameter bound into a list query
#[derive(Debug, Clone, PartialEq)]
enum FilterParam {
    Text(String),
    Uuid(Uuid),
}

/// WHERE clause and its parameters; placeholders start at `$1`
#[derive(Debug, Clone, Default, PartialEq)]
struct FilterSql {
    clause: String,
    params: Vec<FilterParam>,
}

fn filter_sql(filters: &ArticleFilters) -> FilterSql {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    let mut push = |condition: &str, param: FilterParam| {
        params.push(param);
        conditions.push(condition.replace("$?", &format!("${}", params.len())));
    };

    if let Some(status) = filters.status {
        push("a.status = $?", FilterParam::Text(status.as_str().to_string()));
    }
    if let Some(category) = &filters.category {
        push("a.category = $?", FilterParam::Text(category.clone()));
    }
    if let Some(visibility) = filters.visibility {
        push("a.visibility = $?", FilterParam::Text(visibility.as_str().to_string()));
    }
    if let Some(account_id) = filters.account_id {
        push("a.account_id = $?", FilterParam::Uuid(account_id));
    }
    if let Some(search) = filters.search.as_deref().filter(|s| !s.is_empty()) {
        push(
            "(a.title ILIKE $? OR a.subtitle ILIKE $?)",
            FilterParam::Text(format!("%{}%", escape_like(search))),
        );
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };
    FilterSql { clause, params }
}

fn order_sql(order: ArticleOrder) -> &'static str {
    match order {
        ArticleOrder::Newest => " ORDER BY a.created_at DESC",
        ArticleOrder::TopVoted => " ORDER BY a.vote_score DESC, a.created_at DESC",
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn bind_column<'q>(q: PgQuery<'q>, value: &'q ColumnValue) -> PgQuery<'q> {
    match value {
        ColumnValue::Text(v) => q.bind(v.as_deref()),
        ColumnValue::BigInt(v) => q.bind(*v),
        ColumnValue::Uuid(v) => q.bind(*v),
        ColumnValue::Timestamp(v) => q.bind(*v),
        ColumnValue::Json(Value::Null) => q.bind(None::<Json<Value>>),
        ColumnValue::Json(v) => q.bind(Json(v)),
    }
}

fn bind_filter<'q>(q: PgQuery<'q>, param: &'q FilterParam) -> PgQuery<'q> {
    match param {
        FilterParam::Text(s) => q.bind(s.as_str()),
        FilterParam::Uuid(u) => q.bind(*u),
    }
}

fn decode_row<T: DeserializeOwned>(row: &PgRow) -> Result<T, DatabaseError> {
    let value: Value = row.try_get("row")?;
    serde_json::from_value(value).map_err(|e| DatabaseError::InvalidRow(e.to_string()))
}

#[async_trait]
impl ArticleStore for PgArticleRepository {
    async fn insert(&self, id: Uuid, write: &WriteSet) -> Result<ArticleRow, DatabaseError> {
        tracing::debug!("Inserting article {}: {} columns", id, write.columns().len());

        let mut fields = vec![quote_identifier("id")];
        fields.extend(write.columns().iter().map(|(name, _)| quote_identifier(name)));
        let placeholders = (1..=fields.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let query = format!(
            "INSERT INTO {} AS a ({}) VALUES ({}) RETURNING row_to_json(a) AS row",
            TABLE,
            fields.join(", "),
            placeholders
        );

        let mut q = sqlx::query(&query).bind(id);
        for (_, value) in write.columns() {
            q = bind_column(q, value);
        }

        let row = q.fetch_one(&self.pool).await?;
        decode_row(&row)
    }

    async fn update(
        &self,
        id: Uuid,
        write: &WriteSet,
    ) -> Result<Option<ArticleRow>, DatabaseError> {
        tracing::debug!("Updating article {}: {} columns", id, write.columns().len());

        let mut assignments: Vec<String> = write
            .columns()
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ${}", quote_identifier(name), i + 2))
            .collect();
        assignments.push("\"updated_at\" = now()".to_string());

        let query = format!(
            "UPDATE {} AS a SET {} WHERE a.id = $1 RETURNING row_to_json(a) AS row",
            TABLE,
            assignments.join(", ")
        );

        let mut q = sqlx::query(&query).bind(id);
        for (_, value) in write.columns() {
            q = bind_column(q, value);
        }

        match q.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(decode_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ArticleRow>, DatabaseError> {
        let row = sqlx::query("SELECT row_to_json(a) AS row FROM articles a WHERE a.id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn storage_columns(&self, id: Uuid) -> Result<Option<StorageColumns>, DatabaseError> {
        let row = sqlx::query(
            "SELECT row_to_json(t) AS row FROM (
                SELECT content_storage_path, content_size, sections_storage_path,
                       media_items_storage_path, sources_storage_path
                FROM articles WHERE id = $1
             ) t",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_row).transpose()
    }

    async fn list(
        &self,
        filters: &ArticleFilters,
        order: ArticleOrder,
        pagination: &ArticlePagination,
    ) -> Result<(Vec<ArticleRow>, i64), DatabaseError> {
        let filter = filter_sql(filters);

        let count_query = format!("SELECT COUNT(*) AS count FROM {} a{}", TABLE, filter.clause);
        let mut count_q = sqlx::query(&count_query);
        for param in &filter.params {
            count_q = bind_filter(count_q, param);
        }
        let total: i64 = count_q.fetch_one(&self.pool).await?.try_get("count")?;

        let next = filter.params.len();
        let select_query = format!(
            "SELECT row_to_json(a) AS row FROM {} a{}{} LIMIT ${} OFFSET ${}",
            TABLE,
            filter.clause,
            order_sql(order),
            next + 1,
            next + 2
        );
        let mut select_q = sqlx::query(&select_query);
        for param in &filter.params {
            select_q = bind_filter(select_q, param);
        }
        let rows = select_q
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.pool)
            .await?;

        let articles = rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<ArticleRow>, _>>()?;
        Ok((articles, total))
    }

    async fn find_vote(
        &self,
        article_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<VoteType>, DatabaseError> {
        let row = sqlx::query(
            "SELECT vote_type FROM article_votes WHERE article_id = $1 AND user_id = $2",
        )
        .bind(article_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let vote_type: String = row.try_get("vote_type")?;
        vote_type
            .parse()
            .map(Some)
            .map_err(|_| DatabaseError::InvalidRow(format!("unknown vote type '{}'", vote_type)))
    }

    async fn set_vote(
        &self,
        article_id: Uuid,
        user_id: Uuid,
        vote: Option<VoteType>,
    ) -> Result<bool, DatabaseError> {
        // Vote and score change together
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM articles WHERE id = $1 FOR UPDATE")
            .bind(article_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Ok(false);
        }

        match vote {
            Some(vote) => {
                sqlx::query(
                    "INSERT INTO article_votes (article_id, user_id, vote_type)
                     VALUES ($1, $2, $3)
                     ON CONFLICT (article_id, user_id)
                     DO UPDATE SET vote_type = EXCLUDED.vote_type",
                )
                .bind(article_id)
                .bind(user_id)
                .bind(vote.as_str())
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query("DELETE FROM article_votes WHERE article_id = $1 AND user_id = $2")
                    .bind(article_id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query(
            "UPDATE articles SET vote_score = (
                SELECT COALESCE(SUM(CASE WHEN vote_type = 'upvote' THEN 1 ELSE -1 END), 0)
                FROM article_votes WHERE article_id = $1
             ) WHERE id = $1",
        )
        .bind(article_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::{ArticleStatus, Visibility};

    #[test]
    fn empty_filters_have_no_where_clause() {
        let sql = filter_sql(&ArticleFilters::default());
        assert_eq!(sql, FilterSql::default());
    }

    #[test]
    fn filters_number_placeholders_in_order() {
        let account = Uuid::nil();
        let sql = filter_sql(&ArticleFilters {
            status: Some(ArticleStatus::Published),
            category: None,
            search: Some("50%_off".to_string()),
            visibility: Some(Visibility::Public),
            account_id: Some(account),
        });

        assert_eq!(
            sql.clause,
            concat!(
                " WHERE a.status = $1 AND a.visibility = $2 AND a.account_id = $3",
                " AND (a.title ILIKE $4 OR a.subtitle ILIKE $4)"
            )
        );
        assert_eq!(
            sql.params,
            vec![
                FilterParam::Text("published".to_string()),
                FilterParam::Text("public".to_string()),
                FilterParam::Uuid(account),
                FilterParam::Text("%50\\%\\_off%".to_string()),
            ]
        );
    }

    #[test]
    fn discover_order_ranks_by_votes() {
        assert_eq!(order_sql(ArticleOrder::Newest), " ORDER BY a.created_at DESC");
        assert!(order_sql(ArticleOrder::TopVoted).starts_with(" ORDER BY a.vote_score DESC"));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("content"), "\"content\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
