//! Prometheus metrics exposed on `/metrics`. Names match the hub's prior
//! incarnation verbatim so existing dashboards translate directly.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;

pub struct Metrics {
    pub scans_submitted: CounterVec,
    pub scans_completed: CounterVec,
    pub scans_failed: Counter,
    pub scans_active: Gauge,
    pub scan_duration: Histogram,
    pub gvm_connection_errors: Counter,
    pub registry: Registry,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let scans_submitted = CounterVec::new(
            Opts::new(
                "greenbone_scans_submitted_total",
                "Total scans submitted",
            ),
            &["scan_type"],
        )
        .expect("metric");
        let scans_completed = CounterVec::new(
            Opts::new(
                "greenbone_scans_completed_total",
                "Total scans that reached a terminal state",
            ),
            &["gvm_status"],
        )
        .expect("metric");
        let scans_failed = Counter::new(
            "greenbone_scans_failed_total",
            "Total scans that failed due to adapter/connection errors",
        )
        .expect("metric");
        let scans_active = Gauge::new(
            "greenbone_scans_active",
            "Number of scans currently in progress",
        )
        .expect("metric");
        let scan_duration = Histogram::with_opts(
            HistogramOpts::new(
                "greenbone_scan_duration_seconds",
                "Scan duration from start to terminal state",
            )
            .buckets(vec![
                60.0, 300.0, 600.0, 1800.0, 3600.0, 7200.0, 14400.0, 28800.0, 43200.0, 86400.0,
            ]),
        )
        .expect("metric");
        let gvm_connection_errors = Counter::new(
            "greenbone_gvm_connection_errors_total",
            "Total GVM connection failures",
        )
        .expect("metric");

        registry
            .register(Box::new(scans_submitted.clone()))
            .expect("register");
        registry
            .register(Box::new(scans_completed.clone()))
            .expect("register");
        registry
            .register(Box::new(scans_failed.clone()))
            .expect("register");
        registry
            .register(Box::new(scans_active.clone()))
            .expect("register");
        registry
            .register(Box::new(scan_duration.clone()))
            .expect("register");
        registry
            .register(Box::new(gvm_connection_errors.clone()))
            .expect("register");

        Self {
            scans_submitted,
            scans_completed,
            scans_failed,
            scans_active,
            scan_duration,
            gvm_connection_errors,
            registry,
        }
    }

    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::with_capacity(4096);
        if encoder.encode(&families, &mut buf).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

pub static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);
