//! Error types for the HTTP surface.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cocoa_trace::core::ValidationError;
use cocoa_trace::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the traceability handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The request body or query string could not be decoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// - Validation and undecodable input: 422
    /// - Duplicate delivery: 409
    /// - Unknown token, delivery or block: 404
    /// - Everything else: 500
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Ledger(err) => match err {
                LedgerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                LedgerError::DuplicateBlock { .. } => StatusCode::CONFLICT,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::Encoding(_)
                | LedgerError::Store(_)
                | LedgerError::IdentityExhausted { .. }
                | LedgerError::InvalidState(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable kind, the `error` field of the response body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "validation_error",
            Self::Ledger(err) => err.kind(),
        }
    }

    fn body(&self) -> ErrorBody {
        let message = match self {
            // Storage details stay in the logs.
            Self::Ledger(LedgerError::Store(_)) => "internal storage error".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            error: self.kind().to_string(),
            message,
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Ledger(LedgerError::Validation(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
