use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod jobs;

pub use jobs::job_routes;

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = match &state.db_pool {
        Some(pool) => {
            if crate::database::health_check(pool).await {
                "healthy"
            } else {
                "unreachable"
            }
        }
        None => "in_memory",
    };

    let client = state.jobs.runner().client();
    let contract = client.contract().await;
    let status = if database == "unreachable" { StatusCode::SERVICE_UNAVAILABLE } else { StatusCode::OK };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "healthy" } else { "degraded" },
            "service": "crm-backend",
            "database": database,
            "graphql": {
                "url": client.url(),
                "contract_negotiated": contract.is_some(),
                "query_fields": contract.as_ref().map(|c| c.query_fields.len()),
                "mutation_fields": contract.as_ref().map(|c| c.mutation_fields.len()),
            },
        })),
    )
}
