//! Probe Selector: picks a probe for a new scan using an explicit-name
//! override, else the minimum-active-count heuristic.

use std::collections::HashMap;

use crate::error::HubError;

use super::ProbeRegistry;

#[derive(Clone)]
pub struct ProbeSelector {
    /// Accepted from config but not enforced by the selection algorithm —
    /// load-minimum with explicit-name override is canonical; this field
    /// documents the no-op rather than silently dropping it from the
    /// config surface.
    #[allow(dead_code)]
    max_consecutive_same_probe: u32,
}

impl ProbeSelector {
    pub fn new(max_consecutive_same_probe: u32) -> Self {
        Self { max_consecutive_same_probe }
    }

    /// Explicit name wins (fails `UnknownProbe` if not registered);
    /// otherwise the probe with the minimum active count, ties broken by
    /// configured order.
    pub fn select(
        &self,
        registry: &ProbeRegistry,
        explicit: Option<&str>,
        active_counts: &HashMap<String, i64>,
    ) -> Result<String, HubError> {
        if let Some(name) = explicit {
            return if registry.contains(name) {
                Ok(name.to_string())
            } else {
                Err(HubError::UnknownProbe(name.to_string()))
            };
        }

        registry
            .names()
            .iter()
            .min_by_key(|name| active_counts.get(*name).copied().unwrap_or(0))
            .cloned()
            .ok_or(HubError::NoProbeAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GvmConfig;
    use crate::models::ProbeConfig;

    fn registry(names: &[&str]) -> ProbeRegistry {
        ProbeRegistry::new(
            names
                .iter()
                .map(|n| ProbeConfig {
                    name: n.to_string(),
                    gvm: GvmConfig {
                        host: "127.0.0.1".to_string(),
                        port: 9390,
                        username: "a".to_string(),
                        password: "b".to_string(),
                        timeout_secs: 1,
                        retry_attempts: 1,
                        retry_delay_secs: 0,
                    },
                })
                .collect(),
        )
    }

    #[test]
    fn explicit_name_wins_when_registered() {
        let reg = registry(&["p1", "p2"]);
        let selector = ProbeSelector::new(3);
        let counts = HashMap::new();
        assert_eq!(selector.select(&reg, Some("p2"), &counts).unwrap(), "p2");
    }

    #[test]
    fn explicit_unknown_probe_fails() {
        let reg = registry(&["p1"]);
        let selector = ProbeSelector::new(3);
        let counts = HashMap::new();
        let err = selector.select(&reg, Some("ghost"), &counts).unwrap_err();
        assert!(matches!(err, HubError::UnknownProbe(_)));
    }

    #[test]
    fn picks_minimum_active_count() {
        let reg = registry(&["p1", "p2"]);
        let selector = ProbeSelector::new(3);
        let mut counts = HashMap::new();
        counts.insert("p1".to_string(), 2);
        counts.insert("p2".to_string(), 0);
        assert_eq!(selector.select(&reg, None, &counts).unwrap(), "p2");
    }

    #[test]
    fn ties_broken_by_configured_order() {
        let reg = registry(&["p1", "p2", "p3"]);
        let selector = ProbeSelector::new(3);
        let counts = HashMap::new();
        assert_eq!(selector.select(&reg, None, &counts).unwrap(), "p1");
    }

    #[test]
    fn no_probes_fails() {
        let reg = registry(&[]);
        let selector = ProbeSelector::new(3);
        let counts = HashMap::new();
        let err = selector.select(&reg, None, &counts).unwrap_err();
        assert!(matches!(err, HubError::NoProbeAvailable));
    }
}
