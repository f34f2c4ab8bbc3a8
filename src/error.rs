use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("model is not available")]
    ModelUnavailable,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("failed to fetch artifact: {0}")]
    Fetch(String),
    #[error("failed to decode artifact: {0}")]
    Decode(String),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error("model execution failed: {0}")]
    Inference(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self {
            ServiceError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Tokenizer(_) | ServiceError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServiceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
