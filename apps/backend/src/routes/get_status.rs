use axum::{
    Json,
    extract::{Path, State},
};
use rowforge_types::{Value, json::json};

use crate::{error::ApiError, state::AppState};

#[tracing::instrument(name = "GET /api/status/{task_id}", skip(state))]
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .task(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown task {}", task_id)))?;
    Ok(Json(json!({ "status": task.status() })))
}
