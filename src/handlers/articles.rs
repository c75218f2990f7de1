use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::articles::{
    Article, ArticleFilters, ArticlePage, ArticlePagination, ArticleStatus, CreateArticleRequest,
    UpdateArticleRequest, Visibility, VoteType, VotedArticle,
};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

/// Header carrying the id of the calling user; recorded as the article creator
pub const USER_ID_HEADER: &str = "x-user-id";

/// Query string of `GET /api/articles`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<ArticleStatus>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub visibility: Option<Visibility>,
    pub account_id: Option<Uuid>,
}

impl ListQuery {
    fn into_parts(self) -> (ArticleFilters, ArticlePagination) {
        let filters = ArticleFilters {
            status: self.status,
            category: self.category,
            search: self.search,
            visibility: self.visibility,
            account_id: self.account_id,
        };
        (filters, pagination(self.page, self.page_size))
    }
}

/// Query string of `GET /api/articles/public/discover`
#[derive(Debug, Default, Deserialize)]
pub struct DiscoverQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
}

/// Query string of `POST /api/articles/:id/vote`
#[derive(Debug, Deserialize)]
pub struct VoteQuery {
    pub vote_type: String,
}

fn pagination(page: Option<u32>, page_size: Option<u32>) -> ArticlePagination {
    let defaults = ArticlePagination::default();
    ArticlePagination {
        page: page.unwrap_or(defaults.page),
        page_size: page_size.unwrap_or(defaults.page_size),
    }
}

/// Bodies over the router's size limit are a 413, not malformed JSON
fn json_error(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::payload_too_large(
            "Request body is too large; reduce the content size and try again",
        );
    }
    ApiError::invalid_json(rejection.body_text())
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::bad_request(format!("Invalid article id '{}'", id)))
}

fn user_id(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| ApiError::bad_request("X-User-Id must be a UUID"))
}

/// POST /api/articles - create an article
pub async fn create_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreateArticleRequest>, JsonRejection>,
) -> ApiResult<Article> {
    let user_id = user_id(&headers)?;
    let Json(request) = payload.map_err(json_error)?;

    let article = state.articles.create(user_id, request).await?;
    Ok(ApiResponse::created(article))
}

/// GET /api/articles - paginated list, newest first
pub async fn list_articles(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<ArticlePage> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let (filters, pagination) = query.into_parts();

    let page = state.articles.list(&filters, pagination).await?;
    Ok(ApiResponse::success(page))
}

/// GET /api/articles/:id - includes the caller's `user_vote`
pub async fn get_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<VotedArticle> {
    let id = parse_id(&id)?;
    let user_id = user_id(&headers)?;

    let article = state.articles.get_for_user(id, user_id).await?;
    Ok(ApiResponse::success(article))
}

/// POST /api/articles/:id/vote?vote_type=upvote|downvote
pub async fn vote_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    query: Result<Query<VoteQuery>, QueryRejection>,
) -> ApiResult<VotedArticle> {
    let id = parse_id(&id)?;
    let user_id = user_id(&headers)?
        .ok_or_else(|| ApiError::bad_request("X-User-Id is required to vote"))?;
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let vote: VoteType = query.vote_type.parse()?;

    let article = state.articles.vote(user_id, id, vote).await?;
    Ok(ApiResponse::success(article))
}

/// GET /api/articles/public/discover - public published articles, top voted first
pub async fn discover_articles(
    State(state): State<AppState>,
    query: Result<Query<DiscoverQuery>, QueryRejection>,
) -> ApiResult<ArticlePage> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let pagination = pagination(query.page, query.page_size);

    let page = state
        .articles
        .discover(query.category, query.search, pagination)
        .await?;
    Ok(ApiResponse::success(page))
}

/// PUT|PATCH /api/articles/:id - partial update; absent fields are kept
pub async fn update_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateArticleRequest>, JsonRejection>,
) -> ApiResult<Article> {
    let id = parse_id(&id)?;
    let Json(request) = payload.map_err(json_error)?;

    let article = state.articles.update(id, request).await?;
    Ok(ApiResponse::success(article))
}

/// DELETE /api/articles/:id
pub async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let id = parse_id(&id)?;
    state.articles.delete(id).await?;
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}
