//! API route definitions

use crate::handlers;
use crate::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
pub fn create_router(state: SharedState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/provider", get(handlers::current_provider))
        .route("/books", get(handlers::list_books).post(handlers::create_book))
        .route("/books/stats", get(handlers::book_stats))
        .route("/books/featured", get(handlers::featured_books))
        .route(
            "/books/{id}",
            get(handlers::get_book)
                .patch(handlers::update_book)
                .delete(handlers::delete_book),
        )
        .route("/authors", get(handlers::list_authors).post(handlers::create_author))
        .route("/authors/stats", get(handlers::author_stats))
        .route(
            "/authors/{id}",
            get(handlers::get_author)
                .patch(handlers::update_author)
                .delete(handlers::delete_author),
        )
        .route("/users/{user_id}/shelf", get(handlers::user_shelf))
        .route("/users/{user_id}/shelf/stats", get(handlers::user_shelf_stats))
        .route("/shelf", post(handlers::create_shelf_entry))
        .route(
            "/shelf/{id}",
            axum::routing::patch(handlers::update_shelf_entry).delete(handlers::delete_shelf_entry),
        )
        .route("/migrations", get(handlers::migration_status))
        .route("/migrations/apply", post(handlers::apply_migrations))
        .route("/migrations/reset", post(handlers::reset_migrations))
        .with_state(state);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CompressionLayer::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubSession;
    use crate::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use bookbase_database::{Database, Provider};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const TS: &str = "2024-03-01T12:00:00+00:00";

    fn app(session: Arc<StubSession>, admin_token: Option<&str>) -> Router {
        let state = AppState::new(Database::from_session(session))
            .with_admin_token(admin_token.map(str::to_string));
        create_router(Arc::new(state))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_provider() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        session.push(vec![json!({"ok": 1})]);
        let (status, body) = send(app(session, None), get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["provider"], "pooled-local");
    }

    #[tokio::test]
    async fn test_health_unavailable_on_backend_failure() {
        let session = Arc::new(StubSession::new(Provider::EdgeHttp));
        session.push_error("connection refused");
        let (status, body) = send(app(session, None), get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_provider_route() {
        let session = Arc::new(StubSession::new(Provider::PooledCloud));
        let (status, body) = send(app(session, None), get("/api/v1/provider")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ledger_table"], "pooled_cloud_migrations");
    }

    #[tokio::test]
    async fn test_missing_book_is_404() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        let (status, body) = send(app(session, None), get("/api/v1/books/9")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_book_search_passes_filters() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        session.push(vec![json!({"total": 0})]);
        let (status, body) = send(
            app(session.clone(), None),
            get("/api/v1/books?genre=Fiction&sort=rating&direction=desc&per_page=5"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["per_page"], 5);
        assert_eq!(body["data"]["total"], 0);

        let sql = session.executed();
        assert!(sql[0].contains("LOWER(b.genre) = LOWER($1)"));
        assert!(sql[1].contains("ORDER BY b.rating DESC NULLS LAST"));
    }

    #[tokio::test]
    async fn test_create_author_returns_201() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        session.push(vec![json!({
            "id": 1, "name": "Ada", "bio": null, "nationality": null,
            "birth_year": null, "created_at": TS, "updated_at": TS
        })]);
        let (status, body) = send(
            app(session, None),
            post_json("/api/v1/authors", json!({"name": "Ada"}), None),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["name"], "Ada");
    }

    #[tokio::test]
    async fn test_author_delete_refusal_is_409() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        session.push(vec![]);
        session.push(vec![json!({"present": true, "dependents": 3})]);
        let request = Request::builder()
            .method("DELETE")
            .uri("/api/v1/authors/1")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(session, None), request).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["data"]["dependents"], 3);
        assert_eq!(body["data"]["dependent_entity"], "book");
    }

    #[tokio::test]
    async fn test_migrations_disabled_without_token() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        let (status, _) = send(app(session.clone(), None), get("/api/v1/migrations")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(session.executed().is_empty());
    }

    #[tokio::test]
    async fn test_migrations_require_matching_token() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        let (status, _) = send(
            app(session.clone(), Some("s3cret")),
            post_json("/api/v1/migrations/apply", json!({}), Some("wrong")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(session.executed().is_empty());

        for near_miss in ["s3cre", "s3cret2", "S3CRET"] {
            let (status, _) = send(
                app(session.clone(), Some("s3cret")),
                post_json("/api/v1/migrations/apply", json!({}), Some(near_miss)),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{near_miss}");
        }
        assert!(session.executed().is_empty());
    }

    #[tokio::test]
    async fn test_reset_without_confirm_is_rejected() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        let (status, body) = send(
            app(session.clone(), Some("s3cret")),
            post_json("/api/v1/migrations/reset", json!({"confirm": false}), Some("s3cret")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("reset_migrations"));
        assert!(session.executed().is_empty());
    }

    #[tokio::test]
    async fn test_migration_status_with_token() {
        let session = Arc::new(StubSession::new(Provider::PooledLocal));
        session.push(vec![json!({"present": false})]);
        let request = Request::builder()
            .uri("/api/v1/migrations")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(session, Some("s3cret")), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pending"][0], "0001_baseline");
    }
}
