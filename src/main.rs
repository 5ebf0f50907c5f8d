//! Plugin host binary
//!
//! Wires configuration, the lifecycle manager and the HTTP listeners
//! together: recover already-present packages, serve until interrupted,
//! then drain before exit.

use plugin_host::plugin::{LibraryLoader, LifecycleGateway, LifecycleRegistry, PackageStore};
use plugin_host::server;
use plugin_host::{HostConfig, HostResult};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> HostResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = HostConfig::from_env()?;
    if !config.auth_configured() {
        warn!("AUTH_TOKEN is not set - authentication will reject all protected requests");
    }

    let store = PackageStore::open(&config.plugins_dir).await?;
    let registry = Arc::new(LifecycleRegistry::new());
    let gateway = Arc::new(LifecycleGateway::new(
        store,
        Arc::new(LibraryLoader::new()),
        registry,
    ));

    match gateway.startup_recover().await {
        Ok(count) => info!("Initial plugins loaded and started ({count})"),
        Err(e) => error!("Startup recovery failed: {}", e),
    }

    let servers = server::serve(&config, gateway.clone()).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| plugin_host::HostError::internal(e.to_string()))?;

    info!("Shutting down, stopping plugins...");
    gateway.drain().await;
    for listener in servers {
        listener.stop();
    }
    info!("Plugin host stopped");
    Ok(())
}
