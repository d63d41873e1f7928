use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use shared::ErrorResponse;
use tracing::{error, warn};

use crate::domain::RecordError;

/// A failed request: the domain error plus what the handler was doing,
/// which becomes the client-facing message for storage failures.
#[derive(Debug)]
pub struct ApiError {
    source: RecordError,
    context: &'static str,
}

impl ApiError {
    pub fn new(source: RecordError, context: &'static str) -> Self {
        Self { source, context }
    }

    pub fn status(&self) -> StatusCode {
        match self.source {
            RecordError::Validation(_) | RecordError::PayloadRejected(_) => StatusCode::BAD_REQUEST,
            RecordError::DuplicateKey(_) => StatusCode::CONFLICT,
            RecordError::NotFound(_) => StatusCode::NOT_FOUND,
            RecordError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RecordError> for ApiError {
    fn from(source: RecordError) -> Self {
        Self::new(source, "Something went wrong!")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(
            RecordError::Validation(rejection.body_text()),
            "Invalid JSON body",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.source {
            RecordError::StorageUnavailable(cause) => {
                error!("{}: {:#}", self.context, cause);
                self.context.to_string()
            }
            other => {
                warn!("{}: {}", self.context, other);
                other.to_string()
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Attach a handler context to a domain result
pub trait ApiContext<T> {
    fn api_context(self, context: &'static str) -> Result<T, ApiError>;
}

impl<T> ApiContext<T> for Result<T, RecordError> {
    fn api_context(self, context: &'static str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::new(e, context))
    }
}
