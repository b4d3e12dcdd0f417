use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    http::{header, Method},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod callback;
mod config;
mod error;
mod gmp;
mod lifecycle;
mod metrics;
mod middleware;
mod models;
mod probe;
mod scheduler;
mod store;
mod target_sync;

use api::AppState;
use callback::CallbackDispatcher;
use config::AppConfig;
use lifecycle::LifecycleEngine;
use probe::ProbeRegistry;
use scheduler::Scheduler;
use store::Store;
use target_sync::TargetSync;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("scanhub={}", config.logging.level)),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(probes = config.probes.len(), "scanhub_starting");

    let store = Store::connect(&config.database_path).await?;
    tracing::info!(path = %config.database_path, "store_connected");

    let registry = Arc::new(ProbeRegistry::new(config.probes.clone()));
    let callback = CallbackDispatcher::new(
        config.source.callback_url.clone(),
        config.source.auth_token.clone(),
        config.source.timeout_secs,
        store.clone(),
    )
    .map(Arc::new);

    let engine =
        LifecycleEngine::new(store.clone(), registry.clone(), Arc::new(config.scan.clone()), callback.clone());

    let scheduler_task = {
        let scheduler = Scheduler::new(store.clone(), engine.clone(), config.source.scheduler_interval_secs);
        tokio::spawn(scheduler.run_loop())
    };

    let sync_task = {
        let sync = TargetSync::new(config.source.clone(), store.clone());
        tokio::spawn(sync.run_loop())
    };

    let api_config = config.api.clone();
    let app_config = Arc::new(config.clone());
    let app_state = AppState { store, registry, engine, config: app_config };

    let cors = build_cors();

    let app = Router::new()
        .merge(api::routes::public_routes())
        .nest("/v1", api::routes::v1_routes(api_config))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    // Graceful shutdown: cancel the cooperative background loops.
    // In-flight lifecycle workers are not joined here — they are
    // allowed to observe cancellation at their own next poll boundary.
    scheduler_task.abort();
    sync_task.abort();

    tracing::info!("scanhub_shutdown_complete");
    Ok(())
}

fn build_cors() -> CorsLayer {
    let frontend_url = std::env::var("FRONTEND_URL").unwrap_or_else(|_| "*".to_string());

    if frontend_url == "*" {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]);
    }

    let origins: Vec<header::HeaderValue> =
        frontend_url.split(',').filter_map(|s| s.trim().parse::<header::HeaderValue>().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, starting graceful shutdown"),
        _ = terminate => tracing::info!("received sigterm, starting graceful shutdown"),
    }
}
