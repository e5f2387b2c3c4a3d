//! Route configuration and setup.

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use deckform_core::Config;

use crate::handlers;
use crate::state::AppState;

/// Setup all application routes.
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Router<()> {
    let cors = setup_cors(config);

    let api = Router::new()
        .route("/uploads", post(handlers::uploads::request_upload))
        .route(
            "/uploads/{upload_id}/bytes",
            put(handlers::uploads::put_upload_bytes),
        )
        .route(
            "/uploads/{upload_id}/confirm",
            post(handlers::uploads::confirm_upload),
        )
        .route("/jobs/{job_id}", get(handlers::uploads::get_upload_job))
        .route("/tasks", get(handlers::tasks::list_tasks))
        .route("/tasks/stats", get(handlers::tasks::task_stats))
        .route("/tasks/{task_id}", get(handlers::tasks::get_task))
        .route("/tasks/{task_id}/cancel", post(handlers::tasks::cancel_task))
        .route("/assemblies", post(handlers::assemblies::create_assembly))
        .route(
            "/assemblies/{assembly_id}",
            get(handlers::assemblies::get_assembly),
        )
        .route(
            "/assemblies/{assembly_id}/mutations",
            post(handlers::assemblies::apply_mutation),
        )
        .route(
            "/assemblies/{assembly_id}/members",
            put(handlers::assemblies::upsert_member),
        )
        .route(
            "/comments/{comment_id}",
            delete(handlers::assemblies::delete_comment),
        )
        .route("/events", get(handlers::events::subscribe_events));

    Router::new()
        .route("/health", get(health))
        .nest("/v1", api)
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(1024))
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

fn setup_cors(config: &Config) -> CorsLayer {
    if config.cors_origins.contains(&"*".to_string()) {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(Any)
    }
}
