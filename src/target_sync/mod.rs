//! Target Catalog Sync: periodically pulls the target catalog from an
//! external source and reconciles it into the store.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::config::SourceConfig;
use crate::models::{Criticality, ScanType, TargetEntry};
use crate::store::Store;

#[derive(Deserialize)]
struct SourceResponse {
    #[serde(default)]
    targets: Vec<SourceTarget>,
}

#[derive(Deserialize)]
struct SourceTarget {
    id: Option<String>,
    host: Option<String>,
    #[serde(default)]
    ports: Option<Vec<u16>>,
    #[serde(default)]
    scan_type: Option<String>,
    #[serde(default)]
    scan_config: Option<String>,
    #[serde(default)]
    criticality: Option<String>,
    #[serde(default = "default_frequency_hours")]
    scan_frequency_hours: i64,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    tags: serde_json::Value,
}

fn default_frequency_hours() -> i64 {
    24
}

fn default_enabled() -> bool {
    true
}

pub struct TargetSync {
    config: SourceConfig,
    store: Store,
    client: reqwest::Client,
}

impl TargetSync {
    pub fn new(config: SourceConfig, store: Store) -> Self {
        Self { config, store, client: reqwest::Client::new() }
    }

    /// Background loop: no-op when no source URL is configured, so a hub
    /// with a purely API-driven catalog never spins this task.
    pub async fn run_loop(self) {
        if self.config.url.is_empty() {
            tracing::info!("target_sync_disabled");
            return;
        }

        let interval = Duration::from_secs(self.config.sync_interval_secs);
        loop {
            self.sync_once().await;
            tokio::time::sleep(interval).await;
        }
    }

    async fn sync_once(&self) {
        tracing::info!(url = %self.config.url, "target_sync_start");

        let mut req = self.client.get(&self.config.url).timeout(Duration::from_secs(self.config.timeout_secs));
        if !self.config.auth_token.is_empty() {
            req = req.header("Authorization", &self.config.auth_token);
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(error = %e, "target_sync_http_error");
                return;
            }
        };

        if !resp.status().is_success() {
            tracing::error!(status = %resp.status(), "target_sync_http_error");
            return;
        }

        let parsed: SourceResponse = match resp.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "target_sync_error");
                return;
            }
        };

        let mut active_ids = HashSet::with_capacity(parsed.targets.len());
        let mut synced = 0u64;

        for source in parsed.targets {
            let (Some(id), Some(host)) = (source.id, source.host) else {
                tracing::warn!("target_sync_skip_invalid");
                continue;
            };

            if !source.enabled {
                tracing::debug!(external_id = %id, "target_sync_skip_disabled");
                continue;
            }

            let scan_type = source
                .scan_type
                .as_deref()
                .and_then(|s| s.parse::<ScanType>().ok())
                .unwrap_or(ScanType::Full);
            let criticality = source
                .criticality
                .as_deref()
                .and_then(|s| s.parse::<Criticality>().ok())
                .unwrap_or(Criticality::Medium);

            active_ids.insert(id.clone());

            let entry = TargetEntry::new(
                id.clone(),
                host,
                source.ports,
                scan_type,
                source.scan_config,
                criticality,
                source.scan_frequency_hours,
                source.enabled,
                source.tags,
            );

            if let Err(e) = self.store.upsert_target(&entry).await {
                tracing::error!(external_id = %id, error = %e, "target_sync_error");
                continue;
            }
            synced += 1;
        }

        match self.store.deactivate_missing(&active_ids).await {
            Ok(deactivated) => {
                tracing::info!(synced, deactivated, "target_sync_done");
            }
            Err(e) => {
                tracing::error!(error = %e, "target_sync_error");
            }
        }
    }
}
