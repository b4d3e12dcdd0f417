use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scan::ScanType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Critical,
    High,
    Medium,
    Low,
}

impl Criticality {
    /// Numeric weight used to order due targets.
    pub fn weight(&self) -> i32 {
        match self {
            Criticality::Critical => 4,
            Criticality::High => 3,
            Criticality::Medium => 2,
            Criticality::Low => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criticality::Critical => "critical",
            Criticality::High => "high",
            Criticality::Medium => "medium",
            Criticality::Low => "low",
        }
    }
}

impl std::str::FromStr for Criticality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Criticality::Critical),
            "high" => Ok(Criticality::High),
            "medium" => Ok(Criticality::Medium),
            "low" => Ok(Criticality::Low),
            other => Err(format!("unknown criticality '{other}'")),
        }
    }
}

/// A catalog entry describing what to scan recurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetEntry {
    pub external_id: String,
    pub host: String,
    pub ports: Option<Vec<u16>>,
    pub scan_type: ScanType,
    pub scan_config: Option<String>,
    pub criticality: Criticality,
    pub scan_frequency_hours: i64,
    pub enabled: bool,
    pub tags: serde_json::Value,

    pub last_scan_at: Option<DateTime<Utc>>,
    pub next_scan_at: Option<DateTime<Utc>>,
    pub last_scan_id: Option<uuid::Uuid>,

    pub gvm_target_id: Option<String>,
    pub gvm_port_list_id: Option<String>,

    pub synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TargetEntry {
    pub fn new(
        external_id: String,
        host: String,
        ports: Option<Vec<u16>>,
        scan_type: ScanType,
        scan_config: Option<String>,
        criticality: Criticality,
        scan_frequency_hours: i64,
        enabled: bool,
        tags: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            external_id,
            host,
            ports,
            scan_type,
            scan_config,
            criticality,
            scan_frequency_hours,
            enabled,
            tags,
            last_scan_at: None,
            next_scan_at: Some(now),
            last_scan_id: None,
            gvm_target_id: None,
            gvm_port_list_id: None,
            synced_at: now,
            created_at: now,
        }
    }
}

/// Validate a scan target: IPv4/IPv6 address, CIDR block, or hostname.
///
/// Accepts `192.168.1.5`, `192.168.1.0/24`, `example.com`; rejects empty
/// strings, `/0` CIDR (too broad to be a meaningful single target), and
/// strings that are neither a valid address nor a valid hostname.
pub fn validate_target(target: &str) -> Result<(), String> {
    if target.trim().is_empty() {
        return Err("target must not be empty".to_string());
    }

    if let Some((addr, prefix)) = target.split_once('/') {
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("invalid CIDR prefix '{prefix}'"))?;
        let ip: std::net::IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR address '{addr}'"))?;
        let max_prefix = if ip.is_ipv4() { 32 } else { 128 };
        if prefix == 0 || prefix > max_prefix {
            return Err(format!("CIDR prefix /{prefix} out of range"));
        }
        return Ok(());
    }

    if target.parse::<std::net::IpAddr>().is_ok() {
        return Ok(());
    }

    is_valid_hostname(target)
        .then_some(())
        .ok_or_else(|| format!("'{target}' is not a valid IP, CIDR, or hostname"))
}

fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Validate a port list for a `directed` scan.
pub fn validate_ports(ports: &[u16]) -> Result<(), String> {
    if ports.is_empty() {
        return Err("directed scans require a non-empty port list".to_string());
    }
    for &p in ports {
        if p == 0 {
            return Err("port 0 is not valid".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ip_cidr_and_hostname() {
        assert!(validate_target("192.168.1.5").is_ok());
        assert!(validate_target("192.168.1.0/24").is_ok());
        assert!(validate_target("example.com").is_ok());
    }

    #[test]
    fn rejects_empty_and_zero_cidr() {
        assert!(validate_target("").is_err());
        assert!(validate_target("192.168.1.0/0").is_err());
    }

    #[test]
    fn rejects_garbage_hostname() {
        assert!(validate_target("not a host!!").is_err());
    }

    #[test]
    fn rejects_empty_port_list_for_directed() {
        assert!(validate_ports(&[]).is_err());
    }

    #[test]
    fn rejects_zero_port() {
        assert!(validate_ports(&[0, 80]).is_err());
    }

    #[test]
    fn accepts_valid_ports() {
        assert!(validate_ports(&[22, 80, 443]).is_ok());
    }
}
