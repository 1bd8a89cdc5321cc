mod admin;
pub mod auth;
pub mod body;
pub mod error;

use axum::{
    handler::HandlerWithoutStateExt,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::AppState;
use error::ApiError;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Admin routes (role-gated)
    let admin_routes = Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin_layer,
        ));

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/login", post(auth::login))
        .route("/signup", post(auth::signup))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .nest("/admin", admin_routes);

    // Static files take unmatched GETs when the directory exists
    let static_dir = &state.config.server.static_dir;
    let router = if static_dir.is_dir() {
        tracing::info!("Serving static files from {}", static_dir.display());
        router.fallback_service(
            ServeDir::new(static_dir)
                .call_fallback_on_method_not_allowed(true)
                .not_found_service(not_found.into_service()),
        )
    } else {
        router.fallback(not_found)
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> ApiError {
    ApiError::not_found("not found")
}


#[cfg(test)]
mod tests {
    use super::test_support::{send, test_router, test_state};
    use crate::config::Config;
    use crate::db::connect_in_memory;
    use crate::AppState;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_health() {
        let app = test_router(test_state().await);
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = test_router(test_state().await);
        for (method, uri) in [("GET", "/exercises"), ("POST", "/nope")] {
            let (status, body) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(body, json!({ "error": "not found" }));
        }
    }

    #[tokio::test]
    async fn test_static_dir_fallback() {
        let dir = std::env::temp_dir().join(format!("liftlog-static-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("status.json"), r#"{"static":true}"#).unwrap();

        let mut config = Config::default();
        config.server.static_dir = dir.clone();
        let db = connect_in_memory().await.unwrap();
        let app = test_router(Arc::new(AppState::new(config, db)));

        let (status, body) = send(&app, "GET", "/status.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "static": true }));

        let (status, body) = send(&app, "GET", "/missing.json", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "not found" }));

        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
