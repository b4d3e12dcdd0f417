//! Scan Lifecycle Engine: drives one scan end-to-end — create resources,
//! start the task, poll, collect the report, clean up — and persists
//! every meaningful state change along the way.
//!
//! Coroutine + thread mix: `start_scan` spawns an async supervisor
//! (`tokio::spawn`) that hands the whole blocking GMP session off to
//! `tokio::task::spawn_blocking`. The poll loop sleeps with
//! `std::thread::sleep` inside that blocking closure — it genuinely
//! blocks its worker, by design. Persistence writes from the blocking
//! closure bridge back into the async store via a captured
//! `tokio::runtime::Handle`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::callback::CallbackDispatcher;
use crate::config::ScanConfig;
use crate::error::HubError;
use crate::gmp::{parse_summary, GmpSession};
use crate::metrics::METRICS;
use crate::models::target::{validate_ports, validate_target};
use crate::models::{GvmStatus, ScanRecord, ScanType};
use crate::probe::{ProbeRegistry, ProbeSelector};
use crate::store::{ScanUpdate, Store};

/// Outcome of the poll loop (§4.4 step 6): the last-seen status, whether
/// the loop exited via timeout rather than a terminal GMP status, and the
/// elapsed wall-clock seconds (for the duration histogram, §4.4 step 7).
struct PollOutcome {
    status: GvmStatus,
    timed_out: bool,
    elapsed_secs: f64,
}

#[derive(Clone)]
pub struct LifecycleEngine {
    store: Store,
    registry: Arc<ProbeRegistry>,
    selector: ProbeSelector,
    config: Arc<ScanConfig>,
    callback: Option<Arc<CallbackDispatcher>>,
}

impl LifecycleEngine {
    pub fn new(
        store: Store,
        registry: Arc<ProbeRegistry>,
        config: Arc<ScanConfig>,
        callback: Option<Arc<CallbackDispatcher>>,
    ) -> Self {
        let selector = ProbeSelector::new(config.max_consecutive_same_probe);
        Self { store, registry, selector, config, callback }
    }

    /// Validates inputs, selects a probe, persists the record in `New`
    /// status. Never reaches the store on validation failure — a
    /// validation error is surfaced to the caller, never persisted.
    pub async fn create_scan(
        &self,
        target: String,
        scan_type: ScanType,
        ports: Option<Vec<u16>>,
        probe_name: Option<String>,
        name: Option<String>,
        external_target_id: Option<String>,
    ) -> Result<ScanRecord, HubError> {
        validate_target(&target).map_err(HubError::Validation)?;

        match scan_type {
            ScanType::Directed => {
                validate_ports(ports.as_deref().unwrap_or(&[])).map_err(HubError::Validation)?;
            }
            ScanType::Full => {
                if ports.is_some() {
                    return Err(HubError::Validation(
                        "full scans must not specify a port list".to_string(),
                    ));
                }
            }
        }

        let active_counts = self.store.count_active_per_probe().await?;
        let probe_name = self.selector.select(&self.registry, probe_name.as_deref(), &active_counts)?;

        let record = ScanRecord::new(probe_name, target, scan_type, ports, name, external_target_id);
        self.store.insert_scan(&record).await?;

        METRICS.scans_submitted.with_label_values(&[record.scan_type.as_str()]).inc();
        tracing::info!(
            scan_id = %record.scan_id,
            target = %record.target,
            scan_type = record.scan_type.as_str(),
            probe_name = %record.probe_name,
            "scan_created"
        );

        Ok(record)
    }

    pub async fn get_scan(&self, scan_id: Uuid) -> Result<Option<ScanRecord>, HubError> {
        Ok(self.store.get_scan(scan_id).await?)
    }

    pub async fn list_scans(&self) -> Result<Vec<ScanRecord>, HubError> {
        Ok(self.store.list_scans().await?)
    }

    /// Enqueues background execution, returns immediately.
    pub fn start_scan(&self, scan_id: Uuid) {
        let engine = self.clone();
        tokio::spawn(async move { engine.execute_scan(scan_id).await });
    }

    async fn execute_scan(&self, scan_id: Uuid) {
        let Ok(Some(record)) = self.store.get_scan(scan_id).await else {
            return;
        };

        tracing::info!(scan_id = %scan_id, target = %record.target, "scan_executing");
        METRICS.scans_active.inc();

        let engine = self.clone();
        let handle = tokio::runtime::Handle::current();
        let blocking = tokio::task::spawn_blocking(move || engine.run_blocking(scan_id, record, handle));
        if let Err(e) = blocking.await {
            tracing::error!(scan_id = %scan_id, error = %e, "scan_worker_panicked");
        }

        METRICS.scans_active.dec();

        if let Some(callback) = &self.callback {
            callback.notify_async(scan_id).await;
        }
    }

    /// Everything from §4.4 steps 1-10, run on a `spawn_blocking` worker
    /// thread. `handle` bridges persistence writes back into the async
    /// store.
    fn run_blocking(&self, scan_id: Uuid, record: ScanRecord, handle: tokio::runtime::Handle) {
        let Some(client) = self.registry.get_client(&record.probe_name) else {
            self.fail(scan_id, &handle, format!("probe '{}' is no longer registered", record.probe_name));
            return;
        };

        let mut session = match client.connect() {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(scan_id = %scan_id, error = %e, "scan_failed");
                METRICS.gvm_connection_errors.inc();
                self.fail(scan_id, &handle, e.to_string());
                return;
            }
        };

        self.drive(scan_id, &record, &mut session, &handle);
    }

    fn fail(&self, scan_id: Uuid, handle: &tokio::runtime::Handle, error: String) {
        METRICS.scans_failed.inc();
        handle
            .block_on(self.store.update_scan(
                scan_id,
                ScanUpdate { error: Some(error), completed_at: Some(Utc::now()), ..Default::default() },
            ))
            .ok();
    }

    /// Create resources, start, poll, collect, clean up. GMP resource ids
    /// are tracked locally so that, on any operation failure, cleanup can
    /// still reverse whatever was created so far.
    fn drive(&self, scan_id: Uuid, record: &ScanRecord, session: &mut GmpSession, handle: &tokio::runtime::Handle) {
        let mut port_list_id: Option<String> = None;
        let mut target_id: Option<String> = None;
        let mut task_id: Option<String> = None;
        let mut report_id: Option<String> = None;

        let result: Result<(), HubError> = (|| {
            if record.scan_type == ScanType::Directed {
                if let Some(ports) = &record.ports {
                    let name = format!("scan-{scan_id}-ports");
                    let id = session.create_port_list(&name, ports)?;
                    port_list_id = Some(id.clone());
                    handle.block_on(self.store.update_scan(
                        scan_id,
                        ScanUpdate { gvm_port_list_id: Some(id), ..Default::default() },
                    ))?;
                }
            }

            let target_name = format!("scan-{scan_id}-target");
            let default_port_list =
                if port_list_id.is_none() { Some(self.config.default_port_list.as_str()) } else { None };
            let tid = session.create_target(
                &target_name,
                &record.target,
                port_list_id.as_deref(),
                default_port_list,
                None,
            )?;
            target_id = Some(tid.clone());
            handle.block_on(
                self.store
                    .update_scan(scan_id, ScanUpdate { gvm_target_id: Some(tid), ..Default::default() }),
            )?;

            let task_name = format!("scan-{scan_id}");
            let kid = session.create_task(
                &task_name,
                target_id.as_deref().expect("just set"),
                None,
                None,
                Some(&self.config.scan_config_name),
                Some(&self.config.scanner_name),
            )?;
            task_id = Some(kid.clone());
            handle.block_on(
                self.store.update_scan(scan_id, ScanUpdate { gvm_task_id: Some(kid), ..Default::default() }),
            )?;

            let rid = session.start_task(task_id.as_deref().expect("just set"))?;
            report_id = Some(rid.clone());
            let started_at = Utc::now();
            handle.block_on(self.store.update_scan(
                scan_id,
                ScanUpdate { gvm_report_id: Some(rid), started_at: Some(started_at), ..Default::default() },
            ))?;

            tracing::info!(
                scan_id = %scan_id,
                task_id = %task_id.as_deref().unwrap_or_default(),
                report_id = %report_id.as_deref().unwrap_or_default(),
                "scan_started"
            );

            let outcome = self.poll(scan_id, task_id.as_deref().expect("just set"), session, handle)?;

            METRICS.scan_duration.observe(outcome.elapsed_secs);
            METRICS.scans_completed.with_label_values(&[outcome.status.as_str()]).inc();

            let mut completion = ScanUpdate { completed_at: Some(Utc::now()), ..Default::default() };
            if !outcome.timed_out && outcome.status.is_error_terminal() {
                completion.error = Some(format!("Scan ended with status: {}", outcome.status));
            }
            handle.block_on(self.store.update_scan(scan_id, completion))?;

            if !outcome.timed_out && outcome.status.as_str() == GvmStatus::DONE {
                self.collect_report(scan_id, report_id.as_deref().expect("set on start"), session, handle)?;
            }

            Ok(())
        })();

        if let Err(e) = result {
            tracing::error!(scan_id = %scan_id, error = %e, "scan_failed");
            self.fail(scan_id, handle, e.to_string());
        }

        if self.config.cleanup_after_report {
            self.cleanup(scan_id, session, task_id.as_deref(), target_id.as_deref(), port_list_id.as_deref());
        }
    }

    /// Step 6: poll `get_task_status` every `poll_interval_secs`, exiting
    /// on a terminal status or on `max_duration_secs` elapsed (timeout
    /// stops the task and is treated as its own outcome, not a hard error
    /// — the scan still proceeds to cleanup).
    fn poll(
        &self,
        scan_id: Uuid,
        task_id: &str,
        session: &mut GmpSession,
        handle: &tokio::runtime::Handle,
    ) -> Result<PollOutcome, HubError> {
        let start = Instant::now();
        let max_duration = std::time::Duration::from_secs(self.config.max_duration_secs);
        let poll_interval = std::time::Duration::from_secs(self.config.poll_interval_secs);

        loop {
            let elapsed = start.elapsed();
            if elapsed > max_duration {
                tracing::warn!(
                    scan_id = %scan_id,
                    elapsed_secs = elapsed.as_secs(),
                    max_duration_secs = self.config.max_duration_secs,
                    "scan_timeout"
                );
                session.stop_task(task_id).ok();
                let status = session
                    .get_task_status(task_id)
                    .map(|(s, _)| GvmStatus::new(s))
                    .unwrap_or_else(|_| GvmStatus::new(GvmStatus::STOP_REQUESTED));

                handle.block_on(self.store.update_scan(
                    scan_id,
                    ScanUpdate {
                        gvm_status: Some(status.clone()),
                        error: Some(format!(
                            "Scan timed out after {}s (max: {}s)",
                            elapsed.as_secs(),
                            self.config.max_duration_secs
                        )),
                        ..Default::default()
                    },
                ))?;

                return Ok(PollOutcome { status, timed_out: true, elapsed_secs: elapsed.as_secs_f64() });
            }

            let (status_text, progress) = session.get_task_status(task_id)?;
            let status = GvmStatus::new(status_text);

            handle.block_on(self.store.update_scan(
                scan_id,
                ScanUpdate {
                    gvm_status: Some(status.clone()),
                    gvm_progress: Some(progress),
                    ..Default::default()
                },
            ))?;

            tracing::info!(scan_id = %scan_id, gvm_status = %status, gvm_progress = progress, "scan_poll");

            if status.is_terminal() {
                return Ok(PollOutcome { status, timed_out: false, elapsed_secs: start.elapsed().as_secs_f64() });
            }

            std::thread::sleep(poll_interval);
        }
    }

    /// Step 9: only reachable when the terminal status is `Done`.
    fn collect_report(
        &self,
        scan_id: Uuid,
        report_id: &str,
        session: &mut GmpSession,
        handle: &tokio::runtime::Handle,
    ) -> Result<(), HubError> {
        tracing::info!(scan_id = %scan_id, "collecting_report");
        let report_xml = session.get_report_xml(report_id)?;
        let summary = parse_summary(&report_xml);

        tracing::info!(
            scan_id = %scan_id,
            hosts = summary.hosts_scanned,
            high = summary.vulns_high,
            medium = summary.vulns_medium,
            low = summary.vulns_low,
            "report_collected"
        );

        handle.block_on(self.store.update_scan(
            scan_id,
            ScanUpdate { report_xml: Some(report_xml), summary: Some(summary), ..Default::default() },
        ))?;

        Ok(())
    }

    /// Best-effort, dependents first (task → target → port list), each
    /// failure logged and never propagated — cleanup continues even after
    /// an earlier step fails.
    fn cleanup(
        &self,
        scan_id: Uuid,
        session: &mut GmpSession,
        task_id: Option<&str>,
        target_id: Option<&str>,
        port_list_id: Option<&str>,
    ) {
        if task_id.is_none() && target_id.is_none() && port_list_id.is_none() {
            return;
        }

        tracing::info!(scan_id = %scan_id, "cleaning_gvm_resources");

        if let Some(id) = task_id {
            if let Err(e) = session.delete_task(id) {
                tracing::warn!(scan_id = %scan_id, error = %e, "cleanup_task_failed");
            }
        }
        if let Some(id) = target_id {
            if let Err(e) = session.delete_target(id) {
                tracing::warn!(scan_id = %scan_id, error = %e, "cleanup_target_failed");
            }
        }
        if let Some(id) = port_list_id {
            if let Err(e) = session.delete_port_list(id) {
                tracing::warn!(scan_id = %scan_id, error = %e, "cleanup_port_list_failed");
            }
        }

        tracing::info!(scan_id = %scan_id, "gvm_resources_cleaned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_scan_rejects_empty_ports_on_directed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::connect(dir.path().join("t.db").to_str().unwrap()).await.unwrap();
        let registry = Arc::new(ProbeRegistry::new(vec![]));
        let engine = LifecycleEngine::new(store, registry, Arc::new(ScanConfig::default()), None);

        let err = engine
            .create_scan("10.0.0.1".to_string(), ScanType::Directed, None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }

    #[tokio::test]
    async fn create_scan_rejects_invalid_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::connect(dir.path().join("t.db").to_str().unwrap()).await.unwrap();
        let registry = Arc::new(ProbeRegistry::new(vec![]));
        let engine = LifecycleEngine::new(store, registry, Arc::new(ScanConfig::default()), None);

        let err = engine
            .create_scan("not a host!!".to_string(), ScanType::Full, None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
    }

    #[tokio::test]
    async fn create_scan_fails_without_any_probe() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::connect(dir.path().join("t.db").to_str().unwrap()).await.unwrap();
        let registry = Arc::new(ProbeRegistry::new(vec![]));
        let engine = LifecycleEngine::new(store, registry, Arc::new(ScanConfig::default()), None);

        let err = engine
            .create_scan("10.0.0.1".to_string(), ScanType::Full, None, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::NoProbeAvailable));
    }
}
