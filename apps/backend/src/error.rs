use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rowforge_types::{create_id, json::json};

/// HTTP-edge error. Internal failures are logged with a reference id and
/// the client only sees the id, never the message.
#[derive(Debug, Clone)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(err: rowforge_types::Error) -> Self {
        let id = create_id();
        tracing::error!("[{}] internal error: {:#}", id, err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("internal error, reference id {}", id),
        }
    }
}

impl From<rowforge_types::Error> for ApiError {
    fn from(err: rowforge_types::Error) -> Self {
        ApiError::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
