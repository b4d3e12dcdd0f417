//! `GET /probes`: fleet view — each configured probe's name and its
//! current active-scan count, read straight from the store's
//! `count_active_per_probe` query.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::AppState;
use crate::error::HubError;

#[derive(Debug, Serialize)]
pub struct ProbeView {
    pub name: String,
    pub active_scans: i64,
}

#[derive(Debug, Serialize)]
pub struct ListProbesResponse {
    pub probes: Vec<ProbeView>,
}

pub async fn list_probes(State(state): State<AppState>) -> Result<Json<ListProbesResponse>, HubError> {
    let active_counts = state.store.count_active_per_probe().await?;

    let probes = state
        .registry
        .names()
        .iter()
        .map(|name| ProbeView { name: name.clone(), active_scans: active_counts.get(name).copied().unwrap_or(0) })
        .collect();

    Ok(Json(ListProbesResponse { probes }))
}
