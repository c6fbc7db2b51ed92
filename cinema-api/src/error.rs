use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cinema_core::CoreError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Core(e) => match e {
                CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::ValidationError(_) | CoreError::Expired(_) => StatusCode::BAD_REQUEST,
                CoreError::Conflict(_) => StatusCode::CONFLICT,
                CoreError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CoreError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::Core(CoreError::StoreError(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                "Internal Server Error".to_string()
            }
            AppError::Core(CoreError::ServiceUnavailable(msg)) => {
                tracing::warn!("Service unavailable: {}", msg);
                msg
            }
            AppError::Core(
                CoreError::Unauthenticated(msg)
                | CoreError::Forbidden(msg)
                | CoreError::NotFound(msg)
                | CoreError::ValidationError(msg)
                | CoreError::Expired(msg)
                | CoreError::Conflict(msg),
            ) => msg,
            AppError::BadRequest(msg) => msg,
        };

        let body = Json(json!({
            "ok": false,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
