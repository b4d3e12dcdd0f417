use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use super::{auth, health, probe, scan, target, AppState};
use crate::config::ApiConfig;
use crate::middleware::require_bearer_token;

/// V1 API routes.
///
/// ## Public routes (never behind the bearer-token middleware)
/// - GET  /health - aggregate probe-fleet health
/// - GET  /metrics - Prometheus text exposition
/// - POST /auth/token - issue a bearer JWT
///
/// ## Scan routes
/// - POST /scans - submit a scan
/// - GET  /scans - list scans
/// - GET  /scans/{id} - live status
/// - GET  /scans/{id}/report - XML report + severity summary
///
/// ## Probe routes
/// - GET  /probes - fleet view (name, active_scans)
///
/// ## Target catalog routes
/// - GET  /targets - list catalog entries
/// - POST /targets - register a target manually
/// - GET  /targets/{external_id} - one catalog entry
pub fn v1_routes(api_config: ApiConfig) -> Router<AppState> {
    Router::new()
        .route("/scans", post(scan::submit_scan).get(scan::list_scans))
        .route("/scans/{id}", get(scan::get_scan_status))
        .route("/scans/{id}/report", get(scan::get_scan_report))
        .route("/probes", get(probe::list_probes))
        .route("/targets", post(target::create_target).get(target::list_targets))
        .route("/targets/{external_id}", get(target::get_target))
        .route_layer(from_fn_with_state(api_config, require_bearer_token))
}

/// Routes exempt from the bearer-token middleware: `/health`, `/metrics`,
/// `/auth/token`. `/docs` and `/openapi.json` are listed in
/// `PUBLIC_PATHS` too, but this crate does not serve generated API docs,
/// so they have no route to exempt.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics_handler))
        .route("/auth/token", post(auth::issue_token))
}

async fn metrics_handler() -> String {
    crate::metrics::METRICS.encode()
}
