//! Probe Registry: named probes, each with its own GMP endpoint and
//! credentials. Configuration is loaded once at startup and never
//! mutated at runtime — there is no runtime probe registration.

pub mod selector;

use std::collections::HashMap;

use futures::future::join_all;

use crate::gmp::GmpClient;
use crate::models::ProbeConfig;

pub use selector::ProbeSelector;

#[derive(Clone)]
pub struct ProbeRegistry {
    clients: HashMap<String, GmpClient>,
    order: Vec<String>,
}

impl ProbeRegistry {
    pub fn new(configs: Vec<ProbeConfig>) -> Self {
        let mut clients = HashMap::with_capacity(configs.len());
        let mut order = Vec::with_capacity(configs.len());
        for cfg in configs {
            order.push(cfg.name.clone());
            clients.insert(cfg.name, GmpClient::new(cfg.gvm));
        }
        Self { clients, order }
    }

    /// Configured probe names in stable startup order — selector ties are
    /// broken by this order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    pub fn get_client(&self, name: &str) -> Option<GmpClient> {
        self.clients.get(name).cloned()
    }

    /// Aggregate fleet health: a cheap `get_scanners` call per probe, run
    /// concurrently, each on its own blocking thread since the GMP
    /// transport is synchronous.
    pub async fn health(&self) -> (bool, HashMap<String, String>) {
        let checks = self.order.iter().map(|name| {
            let name = name.clone();
            let client = self.clients.get(&name).expect("registered name").clone();
            async move {
                let outcome = tokio::task::spawn_blocking(move || {
                    client.connect().and_then(|mut session| session.get_scanners().map(|_| ()))
                })
                .await;

                let status = match outcome {
                    Ok(Ok(())) => "connected".to_string(),
                    Ok(Err(e)) => e.to_string(),
                    Err(e) => format!("probe health check panicked: {e}"),
                };
                (name, status)
            }
        });

        let results = join_all(checks).await;
        let healthy = results.iter().all(|(_, status)| status == "connected");
        (healthy, results.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GvmConfig;

    fn cfg(name: &str) -> ProbeConfig {
        ProbeConfig {
            name: name.to_string(),
            gvm: GvmConfig {
                host: "127.0.0.1".to_string(),
                port: 9390,
                username: "admin".to_string(),
                password: "admin".to_string(),
                timeout_secs: 1,
                retry_attempts: 1,
                retry_delay_secs: 0,
            },
        }
    }

    #[test]
    fn names_preserve_configured_order() {
        let registry = ProbeRegistry::new(vec![cfg("p1"), cfg("p2"), cfg("p3")]);
        assert_eq!(registry.names(), &["p1".to_string(), "p2".to_string(), "p3".to_string()]);
    }

    #[test]
    fn contains_reflects_configured_probes() {
        let registry = ProbeRegistry::new(vec![cfg("p1")]);
        assert!(registry.contains("p1"));
        assert!(!registry.contains("p2"));
    }
}
