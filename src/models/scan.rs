use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gvm::GvmStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    Full,
    Directed,
}

impl ScanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Full => "full",
            ScanType::Directed => "directed",
        }
    }
}

impl std::str::FromStr for ScanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ScanType::Full),
            "directed" => Ok(ScanType::Directed),
            other => Err(format!("unknown scan_type '{other}'")),
        }
    }
}

/// Severity histogram computed from a GMP report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub hosts_scanned: u32,
    pub vulns_high: u32,
    pub vulns_medium: u32,
    pub vulns_low: u32,
    pub vulns_log: u32,
}

/// The hub's lifecycle-tracking record of one task's execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan_id: Uuid,
    pub probe_name: String,
    pub name: Option<String>,
    pub target: String,
    pub scan_type: ScanType,
    pub ports: Option<Vec<u16>>,
    pub external_target_id: Option<String>,

    pub gvm_port_list_id: Option<String>,
    pub gvm_target_id: Option<String>,
    pub gvm_task_id: Option<String>,
    pub gvm_report_id: Option<String>,

    pub gvm_status: GvmStatus,
    pub gvm_progress: i32,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub report_xml: Option<String>,
    pub summary: Option<ScanSummary>,
    pub error: Option<String>,
}

impl ScanRecord {
    pub fn new(
        probe_name: String,
        target: String,
        scan_type: ScanType,
        ports: Option<Vec<u16>>,
        name: Option<String>,
        external_target_id: Option<String>,
    ) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            probe_name,
            name,
            target,
            scan_type,
            ports,
            external_target_id,
            gvm_port_list_id: None,
            gvm_target_id: None,
            gvm_task_id: None,
            gvm_report_id: None,
            gvm_status: GvmStatus::default(),
            gvm_progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            report_xml: None,
            summary: None,
            error: None,
        }
    }

    /// `completed_at` is set iff the scan is terminal.
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }
}
