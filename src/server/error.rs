//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::CameraError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    /// Preview found neither a slot frame nor a direct grab
    #[error("No frame available")]
    NoFrame,

    /// A blocking worker panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::Camera(CameraError::DeviceUnavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, "CAMERA_UNAVAILABLE")
            }
            ApiError::Camera(CameraError::InvalidMode(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_MODE")
            }
            ApiError::Camera(CameraError::CaptureFailed) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CAPTURE_FAILED")
            }
            ApiError::Camera(CameraError::Encode(_)) | ApiError::Camera(CameraError::FrameLayout { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR")
            }
            ApiError::Camera(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CAMERA_ERROR"),
            ApiError::NoFrame => (StatusCode::SERVICE_UNAVAILABLE, "NO_FRAME"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::warn!(status = %status, error_code = %error_code, message = %message, "Rejected request");
        }

        let body = Json(json!({
            "error": message,
            "error_code": error_code,
        }));

        (status, body).into_response()
    }
}
