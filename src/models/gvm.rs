//! GMP status domain.
//!
//! Statuses are opaque strings forwarded verbatim from the GVM server. We
//! never re-encode them as a closed Rust enum; the terminal/error
//! classifications are predicates over the raw text instead.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GvmStatus(pub String);

impl GvmStatus {
    pub const NEW: &'static str = "New";
    pub const REQUESTED: &'static str = "Requested";
    pub const QUEUED: &'static str = "Queued";
    pub const RUNNING: &'static str = "Running";
    pub const STOP_REQUESTED: &'static str = "Stop Requested";
    pub const STOPPED: &'static str = "Stopped";
    pub const DONE: &'static str = "Done";
    pub const DELETE_REQUESTED: &'static str = "Delete Requested";
    pub const ULTIMATE_DELETE_REQUESTED: &'static str = "Ultimate Delete Requested";
    pub const INTERRUPTED: &'static str = "Interrupted";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Terminal statuses: no further polling is required.
    pub fn is_terminal(&self) -> bool {
        matches!(self.0.as_str(), Self::DONE | Self::STOPPED | Self::INTERRUPTED)
    }

    /// Error-terminal statuses: terminal, but not a clean finish.
    pub fn is_error_terminal(&self) -> bool {
        matches!(self.0.as_str(), Self::STOPPED | Self::INTERRUPTED)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GvmStatus {
    fn default() -> Self {
        Self(Self::NEW.to_string())
    }
}

impl fmt::Display for GvmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GvmStatus {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_is_terminal_not_error() {
        let s = GvmStatus::new("Done");
        assert!(s.is_terminal());
        assert!(!s.is_error_terminal());
    }

    #[test]
    fn running_is_not_terminal() {
        let s = GvmStatus::new("Running");
        assert!(!s.is_terminal());
    }

    #[test]
    fn stopped_and_interrupted_are_error_terminal() {
        assert!(GvmStatus::new("Stopped").is_error_terminal());
        assert!(GvmStatus::new("Interrupted").is_error_terminal());
        assert!(!GvmStatus::new("Done").is_error_terminal());
    }
}
