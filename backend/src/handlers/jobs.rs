use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crm_shared::JobRunResult;

use crate::error::ApiResult;
use crate::jobs::scheduler::JobExecutionLog;
use crate::AppState;

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/runs", get(list_runs))
        .route("/:name/run", post(run_job))
}

async fn list_jobs() -> Json<Vec<&'static str>> {
    Json(crate::jobs::JOB_NAMES.to_vec())
}

async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<JobExecutionLog>> {
    Json(state.jobs.get_execution_logs().await)
}

async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<JobRunResult>> {
    let result = state.jobs.run_job_now(&name).await?;
    Ok(Json(result))
}
