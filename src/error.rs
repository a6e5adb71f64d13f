//! Error types for the bridge and their mapping onto the HTTP error contract.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::core::label::LabelError;
use crate::core::models::{JobId, JobStatus};
use crate::core::transport::{FailureKind, SendFailure};

/// Errors raised by the printer registry and the job store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("printer already registered: {0}")]
    DuplicatePrinter(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("job {id} is already {status} and cannot change")]
    JobFinalized { id: JobId, status: JobStatus },

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {0}: an error message is only allowed on failed jobs")]
    ErrorMessageOnHealthyJob(JobId),
}

/// Machine-readable error codes returned to bridge callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PrinterOffline,
    Timeout,
    InvalidZpl,
    NetworkError,
    PrinterNotFound,
    InvalidRequest,
}

impl From<FailureKind> for ErrorCode {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::ConnectionRefused | FailureKind::HostUnreachable => Self::PrinterOffline,
            FailureKind::TimedOut => Self::Timeout,
            FailureKind::WriteError | FailureKind::Network => Self::NetworkError,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Label(#[from] LabelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("print job {job_id} failed: {failure}")]
    PrintFailed {
        job_id: JobId,
        failure: SendFailure,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
            Self::Label(LabelError::MissingField(_)) => ErrorCode::InvalidRequest,
            Self::Label(LabelError::InvalidZpl(_)) => ErrorCode::InvalidZpl,
            Self::Store(StoreError::PrinterNotFound(_)) => ErrorCode::PrinterNotFound,
            Self::Store(StoreError::JobNotFound(_) | StoreError::DuplicatePrinter(_)) => {
                ErrorCode::InvalidRequest
            }
            Self::Store(_) | Self::Internal(_) => ErrorCode::NetworkError,
            Self::PrintFailed { failure, .. } => failure.kind.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Label(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::PrinterNotFound(_) | StoreError::JobNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Store(StoreError::DuplicatePrinter(_)) => StatusCode::CONFLICT,
            Self::Store(_) | Self::PrintFailed { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::PrintFailed { job_id, failure } => ErrorBody {
                error: "Print job failed".to_string(),
                code: self.code(),
                details: Some(failure.to_string()),
                job_id: Some(*job_id),
            },
            Self::Internal(details) => ErrorBody {
                error: "Internal error".to_string(),
                code: self.code(),
                details: Some(details.clone()),
                job_id: None,
            },
            Self::Store(
                e @ (StoreError::JobFinalized { .. }
                | StoreError::InvalidTransition { .. }
                | StoreError::ErrorMessageOnHealthyJob(_)),
            ) => ErrorBody {
                error: "Internal error".to_string(),
                code: self.code(),
                details: Some(e.to_string()),
                job_id: None,
            },
            other => ErrorBody {
                error: other.to_string(),
                code: self.code(),
                details: None,
                job_id: None,
            },
        }
    }
}

/// JSON error body: `{error, code, details?, jobId?}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
