use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State},
};
use rowforge::pipeline::{JobLog, JobStatus, ProcessRequest, run_job};
use rowforge_types::{Value, create_id, json::json};

use crate::{error::ApiError, state::AppState};

/// Accept the two uploads, register the task and fire the background job.
/// The response returns immediately with the task id; progress is exposed
/// through the log and status endpoints.
#[tracing::instrument(name = "POST /api/start", skip(state, multipart))]
pub async fn start_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut param: Option<(String, Vec<u8>)> = None;
    let mut report: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("broken multipart upload: {}", e)))?
    {
        let Some(name) = field.name().map(|n| n.to_string()) else {
            continue;
        };
        if name != "param_file" && name != "report_file" {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            return Err(ApiError::bad_request(
                "a file part has no filename, pick the files again",
            ));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?
            .to_vec();
        match name.as_str() {
            "param_file" => param = Some((filename, bytes)),
            _ => report = Some((filename, bytes)),
        }
    }

    let (Some((param_name, param_bytes)), Some((report_name, report_bytes))) = (param, report)
    else {
        return Err(ApiError::bad_request(
            "upload both the parameter table (param_file) and the report workbook (report_file)",
        ));
    };

    let task_id = create_id();
    let log = JobLog::new();
    log.push(format!("received parameter table: {}", param_name));
    log.push(format!("received report workbook: {}", report_name));

    let upload_dir = state.config.upload_dir();
    let param_path = upload_dir.join(format!("{}_param.xlsx", task_id));
    let report_path = upload_dir.join(format!("{}_report.xlsx", task_id));
    let out_path = state
        .config
        .output_dir()
        .join(format!("{}_result.xlsx", task_id));

    tokio::fs::write(&param_path, &param_bytes)
        .await
        .map_err(|e| ApiError::internal(e.into()))?;
    tokio::fs::write(&report_path, &report_bytes)
        .await
        .map_err(|e| ApiError::internal(e.into()))?;
    log.push("uploads saved, job queued".to_string());

    let task = Arc::new(crate::state::Task::new(log.clone(), out_path.clone()));
    state.tasks.insert(task_id.clone(), task.clone());

    let model = state.model.clone();
    let request = ProcessRequest {
        param_path,
        report_path,
        out_path,
    };
    tokio::spawn(async move {
        task.set_status(JobStatus::Running);
        match run_job(request, model, log.clone()).await {
            Ok(()) => {
                task.set_status(JobStatus::Done);
                log.push("job finished, result available".to_string());
            }
            Err(e) => {
                task.set_status(JobStatus::Failed);
                log.push(format!("job failed: {:#}", e));
            }
        }
    });

    Ok(Json(json!({ "task_id": task_id })))
}
