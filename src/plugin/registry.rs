//! Plugin lifecycle registry
//!
//! The authoritative map of plugin id -> instance, and the state
//! machine that governs it:
//!
//! ```text
//! Unloaded --load--> Loaded --start--> Started --stop--> Stopped
//! Stopped  --start--> Started
//! Stopped  --unload--> Unloaded (entry removed)
//! Failed   --unload--> Unloaded (entry removed)
//! ```
//!
//! Operations on the same id are serialized through an id-scoped async
//! lock; operations on different ids proceed fully in parallel. The
//! entry map holds immutable `Arc<PluginEntry>` snapshots that are
//! replaced, never mutated, so `list()` reads without blocking on
//! in-flight mutations and never observes a torn entry.

use crate::error::{HostError, HostResult};
use crate::plugin::types::{
    HandleSlot, PluginDescriptor, PluginEntry, PluginHandle, PluginListing, PluginPackage,
    PluginState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Concurrency-safe plugin lifecycle registry
///
/// One owned instance is constructed at process start and shared by
/// handle; there is no ambient global.
pub struct LifecycleRegistry {
    /// Snapshot map: entries are replaced wholesale on every transition
    entries: RwLock<HashMap<String, Arc<PluginEntry>>>,

    /// Id-scoped locks serializing same-id mutations
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,

    /// Set once by `drain`; mutations then fail fast
    shutting_down: AtomicBool,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            locks: StdMutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    fn id_lock(&self, plugin_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(plugin_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn check_open(&self) -> HostResult<()> {
        if self.shutting_down.load(Ordering::SeqCst) {
            Err(HostError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn snapshot(&self, plugin_id: &str) -> Option<Arc<PluginEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(plugin_id)
            .cloned()
    }

    fn replace(&self, plugin_id: &str, entry: PluginEntry) -> Arc<PluginEntry> {
        let entry = Arc::new(entry);
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(plugin_id.to_string(), entry.clone());
        entry
    }

    fn take(&self, plugin_id: &str) -> Option<Arc<PluginEntry>> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(plugin_id)
    }

    /// Register a resolved, instantiated plugin in `Loaded` state
    ///
    /// If the id is already present the existing instance is stopped and
    /// unloaded first, so the registry holds at most one instance per id
    /// at any time. Errors from the superseded instance's stop hook are
    /// logged and replacement proceeds.
    pub async fn load(
        &self,
        descriptor: PluginDescriptor,
        package: PluginPackage,
        handle: Box<dyn PluginHandle>,
    ) -> HostResult<Arc<PluginEntry>> {
        self.check_open()?;
        let lock = self.id_lock(&descriptor.id);
        let _guard = lock.lock().await;

        if let Some(existing) = self.snapshot(&descriptor.id) {
            info!(
                "Replacing plugin {} v{} (was {})",
                existing.descriptor.id, existing.descriptor.version, existing.state
            );
            if existing.state == PluginState::Started {
                if let Err(e) = Self::stop_handle(&existing).await {
                    warn!(
                        "Stop hook of superseded plugin {} failed: {}",
                        existing.descriptor.id, e
                    );
                }
            }
            self.take(&descriptor.id);
        }

        let slot: HandleSlot = Arc::new(Mutex::new(handle));
        let entry = self.replace(
            &descriptor.id,
            PluginEntry::new(descriptor.clone(), package, PluginState::Loaded, Some(slot)),
        );
        info!("Loaded plugin {} v{}", descriptor.id, descriptor.version);
        Ok(entry)
    }

    /// Admit a `Failed` tombstone for a package whose code unit could
    /// not be instantiated after its descriptor resolved
    ///
    /// The tombstone keeps the failure visible in listings and can only
    /// leave the registry through `unload` (followed by a fresh load).
    pub async fn mark_failed(
        &self,
        descriptor: PluginDescriptor,
        package: PluginPackage,
    ) -> HostResult<Arc<PluginEntry>> {
        self.check_open()?;
        let lock = self.id_lock(&descriptor.id);
        let _guard = lock.lock().await;

        let entry = self.replace(
            &descriptor.id,
            PluginEntry::new(descriptor.clone(), package, PluginState::Failed, None),
        );
        warn!("Plugin {} marked failed", descriptor.id);
        Ok(entry)
    }

    /// Transition `Loaded`/`Stopped` -> `Started`
    ///
    /// A start-hook error leaves the entry in `Failed` and is surfaced
    /// to the caller rather than silently retried.
    pub async fn start(&self, plugin_id: &str) -> HostResult<Arc<PluginEntry>> {
        self.check_open()?;
        let lock = self.id_lock(plugin_id);
        let _guard = lock.lock().await;

        let entry = self
            .snapshot(plugin_id)
            .ok_or_else(|| HostError::not_found(plugin_id))?;

        match entry.state {
            PluginState::Loaded | PluginState::Stopped => {}
            PluginState::Started => {
                return Err(HostError::illegal_state(format!(
                    "plugin {plugin_id} is already started"
                )));
            }
            other => {
                return Err(HostError::illegal_state(format!(
                    "cannot start plugin {plugin_id} from state {other}"
                )));
            }
        }

        let slot = entry
            .handle()
            .ok_or_else(|| HostError::internal(format!("plugin {plugin_id} has no handle")))?;
        let start_result = {
            let mut handle = slot.lock().await;
            handle.start().await
        };

        match start_result {
            Ok(()) => {
                let started = self.replace(plugin_id, entry.with_state(PluginState::Started));
                info!("Started plugin {}", plugin_id);
                Ok(started)
            }
            Err(e) => {
                self.replace(plugin_id, entry.with_state(PluginState::Failed));
                warn!("Start hook of plugin {} failed: {}", plugin_id, e);
                Err(HostError::failed(format!("start {plugin_id}: {e}")))
            }
        }
    }

    /// Transition `Started` -> `Stopped`
    ///
    /// Stopping an already-stopped plugin succeeds silently. Stop-hook
    /// errors are logged and the transition lands anyway; a dead entry
    /// stuck in `Started` would block unload forever.
    pub async fn stop(&self, plugin_id: &str) -> HostResult<Arc<PluginEntry>> {
        self.check_open()?;
        let lock = self.id_lock(plugin_id);
        let _guard = lock.lock().await;
        self.stop_locked(plugin_id).await
    }

    async fn stop_locked(&self, plugin_id: &str) -> HostResult<Arc<PluginEntry>> {
        let entry = self
            .snapshot(plugin_id)
            .ok_or_else(|| HostError::not_found(plugin_id))?;

        match entry.state {
            PluginState::Started => {}
            PluginState::Stopped => {
                debug!("Plugin {} already stopped", plugin_id);
                return Ok(entry);
            }
            other => {
                return Err(HostError::illegal_state(format!(
                    "cannot stop plugin {plugin_id} from state {other}"
                )));
            }
        }

        if let Err(e) = Self::stop_handle(&entry).await {
            warn!("Stop hook of plugin {} failed: {}", plugin_id, e);
        }
        let stopped = self.replace(plugin_id, entry.with_state(PluginState::Stopped));
        info!("Stopped plugin {}", plugin_id);
        Ok(stopped)
    }

    async fn stop_handle(entry: &PluginEntry) -> HostResult<()> {
        match entry.handle() {
            Some(slot) => {
                let mut handle = slot.lock().await;
                handle.stop().await
            }
            None => Ok(()),
        }
    }

    /// Remove an entry entirely, releasing its code unit
    ///
    /// Returns the package that backed the entry so callers can clean up
    /// storage, or `None` when the id was already absent (idempotent).
    /// Fails with `IllegalState` while the plugin is still `Started`.
    pub async fn unload(&self, plugin_id: &str) -> HostResult<Option<PluginPackage>> {
        self.check_open()?;
        let lock = self.id_lock(plugin_id);
        let _guard = lock.lock().await;
        self.unload_locked(plugin_id)
    }

    fn unload_locked(&self, plugin_id: &str) -> HostResult<Option<PluginPackage>> {
        let Some(entry) = self.snapshot(plugin_id) else {
            debug!("Unload of absent plugin {} is a no-op", plugin_id);
            return Ok(None);
        };

        if entry.state == PluginState::Started {
            return Err(HostError::illegal_state(format!(
                "plugin {plugin_id} must be stopped before unload"
            )));
        }

        self.take(plugin_id);
        info!("Unloaded plugin {}", plugin_id);
        Ok(Some(entry.package.clone()))
    }

    /// Point-in-time snapshot of all registered plugins
    ///
    /// Never blocks on in-flight mutations; safe from any number of
    /// concurrent readers.
    pub fn list(&self) -> Vec<PluginListing> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(|entry| PluginListing {
                id: entry.descriptor.id.clone(),
                version: entry.descriptor.version.clone(),
                state: entry.state,
            })
            .collect()
    }

    /// Snapshot of a single plugin, if registered
    pub fn get(&self, plugin_id: &str) -> Option<Arc<PluginEntry>> {
        self.snapshot(plugin_id)
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinated shutdown: stop every started plugin, then unload all
    ///
    /// Runs once; lifecycle requests arriving afterwards fail fast with
    /// `ShuttingDown`. Per-plugin teardown errors are logged, never
    /// propagated, so one bad plugin cannot wedge the drain.
    pub async fn drain(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Drain already performed");
            return;
        }
        info!("Draining plugin registry");

        let ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();

        for plugin_id in ids {
            let lock = self.id_lock(&plugin_id);
            let _guard = lock.lock().await;

            match self.stop_locked(&plugin_id).await {
                Ok(_) | Err(HostError::IllegalState(_)) | Err(HostError::NotFound(_)) => {}
                Err(e) => warn!("Drain: stop of {} failed: {}", plugin_id, e),
            }
            match self.unload_locked(&plugin_id) {
                Ok(_) => {}
                Err(e) => warn!("Drain: unload of {} failed: {}", plugin_id, e),
            }
        }
        info!("Drain complete");
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
