//! HTTP API: axum handlers over the lifecycle engine, store and probe
//! registry.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::lifecycle::LifecycleEngine;
use crate::probe::ProbeRegistry;
use crate::store::Store;

pub mod auth;
pub mod health;
pub mod probe;
pub mod routes;
pub mod scan;
pub mod target;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: Arc<ProbeRegistry>,
    pub engine: LifecycleEngine,
    pub config: Arc<AppConfig>,
}
