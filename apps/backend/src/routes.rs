use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::state::AppState;

pub mod download_result;
pub mod get_log;
pub mod get_status;
pub mod start_job;

const INDEX_HTML: &str = include_str!("../assets/index.html");

async fn index() -> axum::response::Html<&'static str> {
    axum::response::Html(INDEX_HTML)
}

pub fn construct_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/start", post(start_job::start_job))
        .route("/api/log/{task_id}", get(get_log::get_log))
        .route("/api/status/{task_id}", get(get_status::get_status))
        .route("/api/download/{task_id}", get(download_result::download_result))
        // Report workbooks run large; the axum default of 2 MB is too tight.
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .with_state(state)
}
