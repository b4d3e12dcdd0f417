//! Crate-wide error taxonomy.
//!
//! `HubError` is the core's internal error type. The `api` module maps it
//! onto HTTP status codes; the scheduler/sync/callback loops only ever log
//! it — they are fail-isolated and never propagate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("persistence store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("probe '{0}' is not registered")]
    UnknownProbe(String),

    #[error("no probe available")]
    NoProbeAvailable,

    #[error("scan '{0}' not found")]
    ScanNotFound(uuid::Uuid),

    #[error("target '{0}' not found")]
    TargetNotFound(String),

    #[error("target '{0}' already exists")]
    TargetAlreadyExists(String),

    #[error("report not available: scan status is '{0}', expected 'Done'")]
    ReportNotReady(String),

    #[error("gvm connection error: {0}")]
    GvmConnection(String),

    #[error("gvm operation error: {0}")]
    GvmOperation(String),
}

impl HubError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HubError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HubError::UnknownProbe(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HubError::NoProbeAvailable => StatusCode::SERVICE_UNAVAILABLE,
            HubError::ScanNotFound(_) | HubError::TargetNotFound(_) => StatusCode::NOT_FOUND,
            HubError::TargetAlreadyExists(_) => StatusCode::CONFLICT,
            HubError::ReportNotReady(_) => StatusCode::CONFLICT,
            HubError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HubError::GvmConnection(_) | HubError::GvmOperation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HubError::Validation(_) => "VALIDATION_ERROR",
            HubError::UnknownProbe(_) => "UNKNOWN_PROBE",
            HubError::NoProbeAvailable => "NO_PROBE_AVAILABLE",
            HubError::ScanNotFound(_) => "SCAN_NOT_FOUND",
            HubError::TargetNotFound(_) => "TARGET_NOT_FOUND",
            HubError::TargetAlreadyExists(_) => "TARGET_ALREADY_EXISTS",
            HubError::ReportNotReady(_) => "REPORT_NOT_READY",
            HubError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            HubError::GvmConnection(_) => "GVM_CONNECTION_ERROR",
            HubError::GvmOperation(_) => "GVM_OPERATION_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        if matches!(self, HubError::StoreUnavailable(_)) {
            tracing::error!(error = %self, "request_failed");
        }
        let body = ErrorBody { error: self.to_string(), code: self.code() };
        (self.status_code(), Json(body)).into_response()
    }
}
