use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use covenant_utils::{log_error, CovenantError, ErrorResponse};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Covenant(#[from] CovenantError),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Covenant(err) => {
                let status =
                    StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    log_error!(err, "Request failed", error_code = err.error_code());
                }
                (status, ErrorResponse::from(err))
            }
            ApiError::Multipart(err) => {
                let message = err.body_text();
                (
                    err.status(),
                    ErrorResponse {
                        error: message.clone(),
                        code: "BAD_UPLOAD".to_string(),
                        message,
                        details: None,
                    },
                )
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: message.clone(),
                    code: "BAD_REQUEST".to_string(),
                    message,
                    details: None,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}
