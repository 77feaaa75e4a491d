use axum::{
    Json,
    extract::{Path, State},
};
use rowforge_types::{Value, json::json};

use crate::{error::ApiError, state::AppState};

/// Poll the job log. An unknown id yields an empty list rather than 404 so
/// the page can start polling before the start request settles.
#[tracing::instrument(name = "GET /api/log/{task_id}", skip(state))]
pub async fn get_log(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let logs = state
        .task(&task_id)
        .map(|t| t.log.snapshot())
        .unwrap_or_default();
    Ok(Json(json!({ "logs": logs })))
}
