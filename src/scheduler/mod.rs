//! Recurring Scheduler: periodically polls the target catalog for due
//! targets and submits+starts a scan for each, ordered by criticality.

use std::time::Duration;

use chrono::Utc;

use crate::lifecycle::LifecycleEngine;
use crate::store::Store;

pub struct Scheduler {
    store: Store,
    engine: LifecycleEngine,
    interval_secs: u64,
}

impl Scheduler {
    pub fn new(store: Store, engine: LifecycleEngine, interval_secs: u64) -> Self {
        Self { store, engine, interval_secs }
    }

    pub async fn run_loop(self) {
        tracing::info!(interval_secs = self.interval_secs, "scheduler_started");
        let interval = Duration::from_secs(self.interval_secs);
        loop {
            self.tick().await;
            tokio::time::sleep(interval).await;
        }
    }

    /// One pass over due targets, most critical first (the ordering is
    /// already enforced by `get_due_targets`'s `ORDER BY`). Each target's
    /// failure is independently logged and never stops the rest of the
    /// pass.
    async fn tick(&self) {
        let due = match self.store.get_due_targets(Utc::now()).await {
            Ok(targets) => targets,
            Err(e) => {
                tracing::error!(error = %e, "scheduler_query_failed");
                return;
            }
        };

        for target in due {
            let ports = match target.scan_type {
                crate::models::ScanType::Directed => target.ports.clone(),
                crate::models::ScanType::Full => None,
            };

            let record = self
                .engine
                .create_scan(
                    target.host.clone(),
                    target.scan_type,
                    ports,
                    None,
                    Some(target.external_id.clone()),
                    Some(target.external_id.clone()),
                )
                .await;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(external_id = %target.external_id, error = %e, "scheduler_scan_create_failed");
                    continue;
                }
            };

            if let Err(e) = self
                .store
                .update_target_schedule(&target.external_id, record.scan_id, Utc::now())
                .await
            {
                tracing::error!(external_id = %target.external_id, error = %e, "scheduler_schedule_update_failed");
            }

            tracing::info!(
                external_id = %target.external_id,
                scan_id = %record.scan_id,
                "scheduler_scan_created"
            );
            self.engine.start_scan(record.scan_id);
        }
    }
}
