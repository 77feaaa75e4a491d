use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use rowforge::pipeline::JobStatus;

use crate::{error::ApiError, state::AppState};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Serve the finished output workbook as an attachment. 404 until the job
/// is done, like the original service.
#[tracing::instrument(name = "GET /api/download/{task_id}", skip(state))]
pub async fn download_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state
        .task(&task_id)
        .ok_or_else(|| ApiError::not_found(format!("unknown task {}", task_id)))?;

    if task.status() != JobStatus::Done {
        return Err(ApiError::not_found(
            "result not ready yet, check /api/status first",
        ));
    }

    let bytes = tokio::fs::read(&task.out_path)
        .await
        .map_err(|e| ApiError::internal(e.into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"result.xlsx\"".to_string(),
            ),
        ],
        bytes,
    )
        .into_response())
}
