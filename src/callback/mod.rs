//! Completion Callback Dispatcher: POSTs a completed scan's summary to an
//! optional external URL.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::ScanSummary;
use crate::store::Store;

#[derive(Serialize)]
struct CallbackPayload {
    external_target_id: Option<String>,
    scan_id: Uuid,
    probe_name: String,
    host: String,
    gvm_status: String,
    completed_at: Option<DateTime<Utc>>,
    summary: Option<ScanSummary>,
}

pub struct CallbackDispatcher {
    url: String,
    auth_token: String,
    timeout: Duration,
    store: Store,
    client: reqwest::Client,
}

impl CallbackDispatcher {
    /// Returns `None` when no `callback_url` is configured — the lifecycle
    /// engine then simply never invokes it.
    pub fn new(url: String, auth_token: String, timeout_secs: u64, store: Store) -> Option<Self> {
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url,
            auth_token,
            timeout: Duration::from_secs(timeout_secs),
            store,
            client: reqwest::Client::new(),
        })
    }

    /// Assembles the payload and POSTs it with a bounded timeout. Any
    /// failure is logged, never propagated — the lifecycle engine's own
    /// terminal-state handling has already completed by the time this
    /// runs.
    pub async fn notify_async(&self, scan_id: Uuid) {
        let record = match self.store.get_scan(scan_id).await {
            Ok(Some(record)) if record.completed_at.is_some() => record,
            Ok(_) => return,
            Err(e) => {
                tracing::error!(scan_id = %scan_id, error = %e, "callback_lookup_failed");
                return;
            }
        };

        // report_xml is deliberately excluded: it has no bounded size and
        // would make the callback payload unbounded too.
        let payload = CallbackPayload {
            external_target_id: record.external_target_id,
            scan_id: record.scan_id,
            probe_name: record.probe_name,
            host: record.target,
            gvm_status: record.gvm_status.to_string(),
            completed_at: record.completed_at,
            summary: record.summary,
        };

        let mut req = self.client.post(&self.url).timeout(self.timeout).json(&payload);
        if !self.auth_token.is_empty() {
            req = req.header("Authorization", &self.auth_token);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(scan_id = %scan_id, status = %resp.status(), "callback_sent");
            }
            Ok(resp) => {
                tracing::error!(scan_id = %scan_id, status = %resp.status(), "callback_failed");
            }
            Err(e) => {
                tracing::error!(scan_id = %scan_id, error = %e, "callback_failed");
            }
        }
    }
}
