//! Scan routes: `POST /scans`, `GET /scans/{id}`, `GET /scans/{id}/report`,
//! `GET /scans`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::error::HubError;
use crate::models::{GvmStatus, ScanRecord, ScanSummary, ScanType};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitScanRequest {
    #[validate(length(min = 1, message = "target must not be empty"))]
    pub target: String,
    pub scan_type: ScanType,
    #[serde(default)]
    pub ports: Option<Vec<u16>>,
    #[serde(default)]
    pub probe_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitScanResponse {
    pub scan_id: Uuid,
    pub probe_name: String,
    pub message: &'static str,
}

/// `POST /scans`: create then immediately start the scan. Validation
/// failures never reach the store.
pub async fn submit_scan(
    State(state): State<AppState>,
    Json(req): Json<SubmitScanRequest>,
) -> Result<(StatusCode, Json<SubmitScanResponse>), HubError> {
    req.validate().map_err(|e| HubError::Validation(e.to_string()))?;

    let record = state
        .engine
        .create_scan(req.target, req.scan_type, req.ports, req.probe_name, req.name, None)
        .await?;

    state.engine.start_scan(record.scan_id);

    Ok((
        StatusCode::OK,
        Json(SubmitScanResponse {
            scan_id: record.scan_id,
            probe_name: record.probe_name,
            message: "scan submitted",
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub scan_id: Uuid,
    pub probe_name: String,
    pub name: Option<String>,
    pub gvm_status: GvmStatus,
    pub gvm_progress: i32,
    pub target: String,
    pub scan_type: ScanType,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<ScanRecord> for ScanStatusResponse {
    fn from(r: ScanRecord) -> Self {
        Self {
            scan_id: r.scan_id,
            probe_name: r.probe_name,
            name: r.name,
            gvm_status: r.gvm_status,
            gvm_progress: r.gvm_progress,
            target: r.target,
            scan_type: r.scan_type,
            created_at: r.created_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            error: r.error,
        }
    }
}

/// `GET /scans/{id}`: live status.
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ScanStatusResponse>, HubError> {
    let record = state.engine.get_scan(scan_id).await?.ok_or(HubError::ScanNotFound(scan_id))?;
    Ok(Json(record.into()))
}

#[derive(Debug, Serialize)]
pub struct ScanReportResponse {
    pub scan_id: Uuid,
    pub report_xml: String,
    pub summary: ScanSummary,
}

/// `GET /scans/{id}/report`: 409 when the scan has not yet reached
/// `Done` — `report_xml` is only ever populated once `gvm_status ==
/// Done`.
pub async fn get_scan_report(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ScanReportResponse>, HubError> {
    let record = state.engine.get_scan(scan_id).await?.ok_or(HubError::ScanNotFound(scan_id))?;

    match (record.report_xml, record.summary) {
        (Some(report_xml), Some(summary)) => Ok(Json(ScanReportResponse { scan_id, report_xml, summary })),
        _ => Err(HubError::ReportNotReady(record.gvm_status.to_string())),
    }
}

#[derive(Debug, Serialize)]
pub struct ListScansResponse {
    pub total: usize,
    pub scans: Vec<ScanStatusResponse>,
}

/// `GET /scans`: list, newest first (store ordering).
pub async fn list_scans(State(state): State<AppState>) -> Result<Json<ListScansResponse>, HubError> {
    let scans = state.engine.list_scans().await?;
    Ok(Json(ListScansResponse { total: scans.len(), scans: scans.into_iter().map(ScanStatusResponse::from).collect() }))
}
