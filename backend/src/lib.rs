use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod commands;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod remote;
pub mod store;

pub use error::{ApiError, ApiResult, AppError};


pub struct AppState {
    /// Absent when running against the in-memory store.
    pub db_pool: Option<sqlx::PgPool>,
    pub store: Arc<dyn store::CrmStore>,
    pub jobs: jobs::JobRegistry,
}

/// The admin HTTP surface: health plus job history and manual runs.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "CRM maintenance API v1.0.0" }))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1/jobs", handlers::job_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
