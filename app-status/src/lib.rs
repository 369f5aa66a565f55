pub mod api;
pub mod config;
pub mod flags;
pub mod metrics_defs;
pub mod model;
pub mod resolver;
pub mod service;
pub mod store;

#[cfg(test)]
mod testutils;

use flags::{FlagAggregator, StaticFlagOracle};
use service::StatusService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum AppStatusError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Opens the configured store, builds the flag oracle once and serves the
/// status API and the admin probes until either listener fails.
pub async fn run(config: config::Config) -> Result<(), AppStatusError> {
    let store = store::from_config(&config.store).await?;

    let oracle = Arc::new(StaticFlagOracle::new(config.flags.rules.clone()));
    let mut aggregator = FlagAggregator::new(oracle, config.flags.names.clone());
    if let Some(timeout) = config.flags.evaluation_timeout() {
        aggregator = aggregator.with_timeout(timeout);
    }
    tracing::info!(
        flags = ?aggregator.flag_names(),
        "Configured feature flags"
    );

    let service = StatusService::new(store, aggregator);

    let ready = Arc::new(AtomicBool::new(false));
    let ready_probe = ready.clone();
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(move || ready_probe.load(Ordering::Relaxed)),
    );

    let addr = format!("{}:{}", config.listener.host, config.listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Status API listening");
    ready.store(true, Ordering::Relaxed);

    let api_task = async { axum::serve(listener, api::router(service)).await };

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}
