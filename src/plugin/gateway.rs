//! Lifecycle gateway
//!
//! The operation set external callers invoke: upload-and-activate,
//! deactivate-and-remove, list, startup recovery and drain. The
//! gateway owns the ordering and idempotence rules layered on top of
//! the registry; the HTTP layer only triggers these operations.

use crate::error::{HostError, HostResult};
use crate::plugin::registry::LifecycleRegistry;
use crate::plugin::store::PackageStore;
use crate::plugin::types::{PluginDescriptor, PluginListing, PluginLoader, PluginPackage};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Lifecycle events emitted on transitions
#[derive(Debug, Clone)]
pub enum PluginEvent {
    /// Plugin was loaded into the registry
    Loaded { plugin_id: String },

    /// Plugin was started
    Started { plugin_id: String },

    /// Plugin was stopped
    Stopped { plugin_id: String },

    /// Plugin was unloaded and its entry removed
    Unloaded { plugin_id: String },

    /// A load or start attempt left the plugin non-functional
    Failed { plugin_id: String, error: String },
}

type EventHandlers = Vec<Box<dyn Fn(PluginEvent) + Send + Sync>>;

/// Gateway translating external triggers into registry transitions
pub struct LifecycleGateway {
    store: PackageStore,
    loader: Arc<dyn PluginLoader>,
    registry: Arc<LifecycleRegistry>,
    event_handlers: RwLock<EventHandlers>,
}

impl LifecycleGateway {
    pub fn new(
        store: PackageStore,
        loader: Arc<dyn PluginLoader>,
        registry: Arc<LifecycleRegistry>,
    ) -> Self {
        Self {
            store,
            loader,
            registry,
            event_handlers: RwLock::new(Vec::new()),
        }
    }

    /// The registry behind this gateway
    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.registry
    }

    /// The package store behind this gateway
    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Store, resolve, load and start an uploaded package as one
    /// logical unit
    ///
    /// A resolution failure leaves the stored artifact on disk but never
    /// registers it; a later upload of the same name supersedes the
    /// orphan. An instantiation or start failure leaves the plugin in
    /// `Failed` state and is surfaced to the caller.
    pub async fn upload_and_activate(
        &self,
        name: &str,
        content: &[u8],
    ) -> HostResult<PluginDescriptor> {
        let package = self.store.put(name, content).await?;
        self.activate(package).await
    }

    async fn activate(&self, package: PluginPackage) -> HostResult<PluginDescriptor> {
        let descriptor = self.loader.resolve(&package)?;
        let plugin_id = descriptor.id.clone();

        let handle = match self.loader.instantiate(&package, &descriptor) {
            Ok(handle) => handle,
            Err(e) => {
                self.registry
                    .mark_failed(descriptor.clone(), package)
                    .await?;
                self.emit(PluginEvent::Failed {
                    plugin_id,
                    error: e.to_string(),
                })
                .await;
                return Err(e);
            }
        };

        self.registry
            .load(descriptor.clone(), package, handle)
            .await?;
        self.emit(PluginEvent::Loaded {
            plugin_id: plugin_id.clone(),
        })
        .await;

        if let Err(e) = self.registry.start(&plugin_id).await {
            self.emit(PluginEvent::Failed {
                plugin_id,
                error: e.to_string(),
            })
            .await;
            return Err(e);
        }
        self.emit(PluginEvent::Started { plugin_id }).await;

        Ok(descriptor)
    }

    /// Stop, unload and delete a plugin
    ///
    /// Accepts a raw id with an optional `:version` suffix (stripped).
    /// Teardown is best-effort: stop-hook errors are logged and the
    /// entry is removed regardless; artifact deletion tolerates an
    /// already-missing file. Calling this twice in a row leaves the
    /// registry in the same state (absent).
    pub async fn deactivate_and_remove(&self, raw_id: &str) -> HostResult<()> {
        let plugin_id = strip_version_suffix(raw_id);
        info!("Deactivating plugin {}", plugin_id);

        match self.registry.stop(plugin_id).await {
            Ok(_) => self.emit(PluginEvent::Stopped {
                plugin_id: plugin_id.to_string(),
            })
            .await,
            Err(HostError::NotFound(_)) | Err(HostError::IllegalState(_)) => {}
            Err(HostError::ShuttingDown) => return Err(HostError::ShuttingDown),
            Err(e) => warn!("Stop of {} failed: {}", plugin_id, e),
        }

        let package = self.registry.unload(plugin_id).await?;
        if let Some(package) = package {
            self.emit(PluginEvent::Unloaded {
                plugin_id: plugin_id.to_string(),
            })
            .await;
            if let Err(e) = self.store.remove(&package).await {
                // Artifact cleanup is best-effort; the registry entry is gone
                warn!("Could not remove artifact for {}: {}", plugin_id, e);
            }
        }
        Ok(())
    }

    /// All registered plugins as `"id:version"` strings
    pub fn list_active(&self) -> Vec<String> {
        self.registry
            .list()
            .into_iter()
            .map(|listing| listing.tag())
            .collect()
    }

    /// Detailed listing snapshot
    pub fn list(&self) -> Vec<PluginListing> {
        self.registry.list()
    }

    /// Re-resolve and activate every package found in storage
    ///
    /// Called once at process start. One package's failure does not
    /// prevent the others from being recovered. Returns the number of
    /// plugins successfully activated.
    pub async fn startup_recover(&self) -> HostResult<usize> {
        let packages = self.store.scan_existing().await?;
        let total = packages.len();
        let mut recovered = 0;

        for package in packages {
            let name = package.id.clone();
            match self.activate(package).await {
                Ok(descriptor) => {
                    info!("Recovered plugin {}", descriptor);
                    recovered += 1;
                }
                Err(e) => {
                    error!("Recovery of package '{}' failed: {}", name, e);
                }
            }
        }

        info!("Startup recovery: {}/{} package(s) activated", recovered, total);
        Ok(recovered)
    }

    /// Drain the registry: stop all started plugins, then unload all
    pub async fn drain(&self) {
        self.registry.drain().await;
    }

    /// Register a lifecycle event handler
    pub async fn on_event<F>(&self, handler: F)
    where
        F: Fn(PluginEvent) + Send + Sync + 'static,
    {
        self.event_handlers.write().await.push(Box::new(handler));
    }

    async fn emit(&self, event: PluginEvent) {
        let handlers = self.event_handlers.read().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Drop an optional `:version` suffix from a path-supplied plugin id
fn strip_version_suffix(raw_id: &str) -> &str {
    match raw_id.split_once(':') {
        Some((id, _)) => id,
        None => raw_id,
    }
}
