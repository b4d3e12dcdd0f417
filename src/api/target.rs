//! Target catalog routes: `GET /targets`, `POST /targets`,
//! `GET /targets/{external_id}`. Manual registration goes through
//! `insert_manual_target`, which is distinct from the sync loop's
//! `upsert_target` — duplicates are rejected here, not merged.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::AppState;
use crate::error::HubError;
use crate::models::target::{validate_ports, validate_target};
use crate::models::{Criticality, ScanType, TargetEntry};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTargetRequest {
    #[validate(length(min = 1, message = "external_id must not be empty"))]
    pub external_id: String,
    #[validate(length(min = 1, message = "host must not be empty"))]
    pub host: String,
    #[serde(default)]
    pub ports: Option<Vec<u16>>,
    pub scan_type: ScanType,
    #[serde(default)]
    pub scan_config: Option<String>,
    #[serde(default = "default_criticality")]
    pub criticality: Criticality,
    #[serde(default = "default_frequency_hours")]
    pub scan_frequency_hours: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: serde_json::Value,
}

fn default_criticality() -> Criticality {
    Criticality::Medium
}
fn default_frequency_hours() -> i64 {
    24
}
fn default_enabled() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct TargetResponse {
    pub external_id: String,
    pub host: String,
    pub ports: Option<Vec<u16>>,
    pub scan_type: ScanType,
    pub criticality: Criticality,
    pub scan_frequency_hours: i64,
    pub enabled: bool,
    pub tags: serde_json::Value,
    pub last_scan_at: Option<chrono::DateTime<chrono::Utc>>,
    pub next_scan_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_scan_id: Option<uuid::Uuid>,
}

impl From<TargetEntry> for TargetResponse {
    fn from(t: TargetEntry) -> Self {
        Self {
            external_id: t.external_id,
            host: t.host,
            ports: t.ports,
            scan_type: t.scan_type,
            criticality: t.criticality,
            scan_frequency_hours: t.scan_frequency_hours,
            enabled: t.enabled,
            tags: t.tags,
            last_scan_at: t.last_scan_at,
            next_scan_at: t.next_scan_at,
            last_scan_id: t.last_scan_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListTargetsResponse {
    pub total: usize,
    pub targets: Vec<TargetResponse>,
}

pub async fn create_target(
    State(state): State<AppState>,
    Json(req): Json<CreateTargetRequest>,
) -> Result<(StatusCode, Json<TargetResponse>), HubError> {
    req.validate().map_err(|e| HubError::Validation(e.to_string()))?;
    validate_target(&req.host).map_err(HubError::Validation)?;
    if req.scan_type == ScanType::Directed {
        validate_ports(req.ports.as_deref().unwrap_or(&[])).map_err(HubError::Validation)?;
    }

    let entry = TargetEntry::new(
        req.external_id,
        req.host,
        req.ports,
        req.scan_type,
        req.scan_config,
        req.criticality,
        req.scan_frequency_hours,
        req.enabled,
        req.tags,
    );

    state.store.insert_manual_target(&entry).await?;
    tracing::info!(external_id = %entry.external_id, "target_created");

    Ok((StatusCode::CREATED, Json(entry.into())))
}

pub async fn list_targets(State(state): State<AppState>) -> Result<Json<ListTargetsResponse>, HubError> {
    let targets = state.store.list_targets().await?;
    Ok(Json(ListTargetsResponse {
        total: targets.len(),
        targets: targets.into_iter().map(TargetResponse::from).collect(),
    }))
}

pub async fn get_target(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
) -> Result<Json<TargetResponse>, HubError> {
    let target = state
        .store
        .get_target(&external_id)
        .await?
        .ok_or_else(|| HubError::TargetNotFound(external_id.clone()))?;

    Ok(Json(target.into()))
}
