use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Errors surfaced to API clients by the batch operations.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid search: {0}")]
    Validation(String),
    #[error("batch {0} not found")]
    BatchNotFound(Uuid),
    #[error("no restaurants found for this search")]
    NoCandidatesFound,
    #[error("no restaurants found that can be called right now")]
    NoEligibleCandidates,
    #[error("no more restaurants to call for batch {0}")]
    NoMoreCandidates(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Failures talking to one of the external services (telephony, transcription, classification,
/// place search).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} responded with status {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{service} response unusable: {reason}")]
    Malformed {
        service: &'static str,
        reason: String,
    },
}

impl CollaboratorError {
    pub fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { service, source }
    }

    pub fn malformed(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            service,
            reason: reason.into(),
        }
    }
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BatchNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoCandidatesFound
            | AppError::NoEligibleCandidates
            | AppError::NoMoreCandidates(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error=%self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Log the failure of work nobody is waiting on.
pub fn handle_error(context: &str, e: impl std::error::Error) {
    error!(error=%e, "{context}")
}
