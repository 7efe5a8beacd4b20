mod aggregate;
mod api;
mod charts;
mod config;
mod model;
mod nav;
mod poller;
mod render;
mod search;
mod status;
mod ui;
mod web;

use crate::api::{Backend, HttpBackend};
use crate::config::AppConfig;
use crate::poller::{DashboardStore, Poller};
use crate::web::AppState;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Arc::new(AppConfig::from_env());

    tracing::info!(
        "Starting lineboard on {} (backend: {}, department: {})",
        config.http_bind,
        config.backend_url,
        config.context.department
    );

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&config)?);
    let store = Arc::new(DashboardStore::new());
    let poller = Poller::new(Arc::clone(&backend), store, Arc::clone(&config));
    let dashboard_task = poller.spawn_dashboard_loop();

    let state = AppState {
        config,
        backend,
        poller,
    };

    web::serve(state).await?;

    dashboard_task.abort();
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = fmt().with_env_filter(env_filter).try_init();
}
