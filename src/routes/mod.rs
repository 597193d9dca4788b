//! HTTP routes

pub mod files;
pub mod health;
pub mod queue;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

/// Largest accepted storage request body
pub const MAX_REQUEST_BYTES: usize = 4 * 1024;

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/v1/store", post(store::submit))
        .route("/v1/files/:hash", get(files::get_file))
        .route("/v1/queue/stats", get(queue::stats))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::db::test_support::temp_pool;
    use crate::providers::mock::MockProvider;
    use crate::providers::ProviderRegistry;
    use crate::queue::QueueStore;

    async fn app() -> (TempDir, Router) {
        let (dir, pool) = temp_pool().await;
        let registry = ProviderRegistry::builder()
            .register(Arc::new(MockProvider::succeeding("ipfs", "cid:xyz")))
            .unwrap()
            .register(Arc::new(MockProvider::succeeding("s3", "s3://bucket/key")))
            .unwrap()
            .build();
        let queue = QueueStore::open(pool, Arc::new(registry)).await.unwrap();

        (dir, router(AppState::new(Config::default(), queue)))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn store_body(hash: &str) -> Value {
        json!({
            "requirements": [],
            "providers": { "ipfs": {}, "s3": { "key": "archive/abc" } },
            "hash": hash,
            "file_pointer": "uploads/abc123"
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, app) = app().await;

        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "archive-backend");
        assert_eq!(body["providers"], json!(["ipfs", "s3"]));
        assert_eq!(body["workers"], 2);
    }

    #[tokio::test]
    async fn test_store_then_lookup() {
        let (_dir, app) = app().await;

        let response = app
            .clone()
            .oneshot(post_json("/v1/store", store_body("abc123")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["hash"], "abc123");
        assert_eq!(body["providers"], json!(["ipfs", "s3"]));
        assert_eq!(body["tasks"].as_array().unwrap().len(), 2);
        assert_eq!(body["tasks"][0]["status"], "pending");

        let response = app.clone().oneshot(get_request("/v1/files/abc123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["file_id"], "abc123");
        assert_eq!(body["handles"], json!({ "ipfs": null, "s3": null }));
        assert_eq!(body["request"]["providers"]["s3"]["key"], "archive/abc");
        assert_eq!(body["tasks"].as_array().unwrap().len(), 2);

        let response = app.oneshot(get_request("/v1/queue/stats")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["pending"], 2);
        assert_eq!(body["claimed"], 0);
    }

    #[tokio::test]
    async fn test_duplicate_store_conflicts() {
        let (_dir, app) = app().await;

        let first = app
            .clone()
            .oneshot(post_json("/v1/store", store_body("abc123")))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(post_json("/v1/store", store_body("abc123")))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["error"], "duplicate_file");
    }

    #[tokio::test]
    async fn test_store_rejects_bad_requests() {
        let (_dir, app) = app().await;

        let unknown = json!({
            "providers": { "tape": {} },
            "hash": "abc123",
            "file_pointer": "uploads/abc123"
        });
        let response = app
            .clone()
            .oneshot(post_json("/v1/store", unknown))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "unknown_provider");

        let no_providers = json!({
            "providers": {},
            "hash": "abc123",
            "file_pointer": "uploads/abc123"
        });
        let response = app
            .clone()
            .oneshot(post_json("/v1/store", no_providers))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Nothing was recorded by the rejected submissions
        let response = app.oneshot(get_request("/v1/files/abc123")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (_dir, app) = app().await;

        let mut body = store_body("abc123");
        body["requirements"] = json!(["x".repeat(MAX_REQUEST_BYTES)]);

        let response = app.oneshot(post_json("/v1/store", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unknown_file_is_not_found() {
        let (_dir, app) = app().await;

        let response = app.oneshot(get_request("/v1/files/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "not_found");
    }
}
