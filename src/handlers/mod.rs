// handlers/mod.rs - HTTP surface of the articles service
//
// GET  /                              service info
// GET  /health                        relational store ping
// /api/articles[/:id]                 article CRUD
// POST /api/articles/:id/vote         toggle the caller's vote
// GET  /api/articles/public/discover  public articles ranked by votes

pub mod articles;
pub mod system;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::ApiConfig;
use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .merge(article_routes())
        .layer(DefaultBodyLimit::max(config.max_request_size_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state);

    if config.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn article_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/articles",
            get(articles::list_articles).post(articles::create_article),
        )
        .route(
            "/api/articles/:id",
            get(articles::get_article)
                .put(articles::update_article)
                .patch(articles::update_article)
                .delete(articles::delete_article),
        )
        .route("/api/articles/:id/vote", post(articles::vote_article))
        .route("/api/articles/public/discover", get(articles::discover_articles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::articles::ArticlesService;
    use crate::config::MAX_REQUEST_SIZE_BYTES;
    use crate::database::MemoryArticleStore;
    use crate::storage::MemoryObjectStore;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const USER: &str = "0b5e3c7a-8d4f-4e2a-9c1b-6f7e8d9a0b1c";

    fn config(max_request_size_bytes: usize) -> ApiConfig {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            enable_request_logging: false,
            max_request_size_bytes,
        }
    }

    fn router_with_limit(limit: usize) -> (Router, MemoryObjectStore) {
        let objects = MemoryObjectStore::new();
        let service = ArticlesService::new(
            Arc::new(MemoryArticleStore::new()),
            Arc::new(objects.clone()),
        );
        (app(AppState::new(service), &config(limit)), objects)
    }

    fn router() -> (Router, MemoryObjectStore) {
        router_with_limit(MAX_REQUEST_SIZE_BYTES)
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };
        send(router, builder.body(body).unwrap()).await
    }

    async fn vote(router: &Router, id: &str, vote_type: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/articles/{}/vote?vote_type={}", id, vote_type))
            .header("x-user-id", USER)
            .body(Body::empty())
            .unwrap();
        send(router, request).await
    }

    fn article(content: String) -> Value {
        json!({
            "title": "Routing",
            "subtitle": "Through axum",
            "content": content,
            "category": "engineering",
            "author": "Grace",
            "read_time": "3 min",
            "account_id": "7d8f0c1e-3b2a-4c5d-8e9f-0a1b2c3d4e5f",
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _) = router();
        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["database"], json!("ok"));
    }

    #[tokio::test]
    async fn article_lifecycle() {
        let (router, objects) = router();
        let content = "x".repeat(5000);

        let create = Some(article(content.clone()));
        let (status, created) = call(&router, Method::POST, "/api/articles", create).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["success"], json!(true));
        assert_eq!(created["data"]["content"], json!(content));
        let id = created["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/articles/{}", id);
        assert_eq!(objects.len().await, 1);

        let (status, fetched) = call(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"]["content"], json!(content));
        assert_eq!(fetched["data"]["user_vote"], Value::Null);

        let patch = Some(json!({ "content": "short now" }));
        let (status, patched) = call(&router, Method::PATCH, &uri, patch).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["data"]["content"], json!("short now"));
        assert!(objects.is_empty().await);

        let list = "/api/articles?page=1&page_size=5&status=draft";
        let (status, listed) = call(&router, Method::GET, list, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"]["total_count"], json!(1));

        let (status, _) = call(&router, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, missing) = call(&router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["error"], json!(true));
        assert_eq!(missing["code"], json!("NOT_FOUND"));
    }

    #[tokio::test]
    async fn oversized_article_is_413() {
        let (router, _) = router();
        let mut body = article("short".to_string());
        body["subtitle"] = json!("s".repeat(1_000_001));

        let (status, error) = call(&router, Method::POST, "/api/articles", Some(body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error["code"], json!("PAYLOAD_TOO_LARGE"));
    }

    #[tokio::test]
    async fn body_over_router_limit_is_413() {
        let (router, _) = router_with_limit(64 * 1024);
        let body = Some(article("x".repeat(100_000)));

        let (status, error) = call(&router, Method::POST, "/api/articles", body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error["code"], json!("PAYLOAD_TOO_LARGE"));
        assert!(error["message"].as_str().unwrap().contains("reduce the content size"));
    }

    #[tokio::test]
    async fn multi_megabyte_content_is_accepted() {
        let (router, objects) = router();
        let content = "m".repeat(3_000_000);

        let create = Some(article(content.clone()));
        let (status, created) = call(&router, Method::POST, "/api/articles", create).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["data"]["content_size"], json!(3_000_000));
        assert_eq!(created["data"]["content"].as_str().unwrap().len(), content.len());
        assert_eq!(objects.len().await, 1);
    }

    #[tokio::test]
    async fn voting_and_discover() {
        let (router, _) = router();
        let mut body = article("body".to_string());
        body["status"] = json!("published");
        body["visibility"] = json!("public");
        let (_, created) = call(&router, Method::POST, "/api/articles", Some(body)).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, voted) = vote(&router, &id, "upvote").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(voted["data"]["user_vote"], json!("upvote"));
        assert_eq!(voted["data"]["vote_score"], json!(1));

        let (status, cleared) = vote(&router, &id, "upvote").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cleared["data"]["user_vote"], Value::Null);
        assert_eq!(cleared["data"]["vote_score"], json!(0));

        let (status, error) = vote(&router, &id, "sideways").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error["message"], json!("Vote type must be 'upvote' or 'downvote'"));

        let anonymous = format!("/api/articles/{}/vote?vote_type=upvote", id);
        let (status, _) = call(&router, Method::POST, &anonymous, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let discover = "/api/articles/public/discover?page=1&page_size=10";
        let (status, page) = call(&router, Method::GET, discover, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["data"]["total_count"], json!(1));
        assert_eq!(page["data"]["articles"][0]["id"], json!(id));
    }

    #[tokio::test]
    async fn bad_input_is_400() {
        let (router, _) = router();

        let (status, _) = call(&router, Method::GET, "/api/articles/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let incomplete = Some(json!({ "title": "t" }));
        let (status, body) = call(&router, Method::POST, "/api/articles", incomplete).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("INVALID_JSON"));

        let (status, _) = call(&router, Method::GET, "/api/articles?page_size=500", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
