//! Plugin lifecycle types and trait seams

use crate::error::HostResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Lifecycle state of a registered plugin
///
/// `Unloaded` is the implicit state of an id with no registry entry;
/// it never appears in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Unloaded,
    Loaded,
    Started,
    Stopped,
    Failed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PluginState::Unloaded => "unloaded",
            PluginState::Loaded => "loaded",
            PluginState::Started => "started",
            PluginState::Stopped => "stopped",
            PluginState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Identity metadata extracted from a plugin package
///
/// `id` is the stable key for all lifecycle operations; `version` is
/// informational and not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: String,
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.version)
    }
}

/// Immutable reference to an on-disk package artifact
///
/// A later upload under the same name supersedes the package; it is
/// never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginPackage {
    /// Canonical artifact name (file stem of the stored file)
    pub id: String,

    /// Storage location
    pub path: PathBuf,

    /// Artifact size in bytes
    pub size: u64,

    /// When the artifact was written
    pub uploaded_at: DateTime<Utc>,
}

/// A loaded, addressable unit of running code
///
/// The lifecycle registry never depends on the loading mechanism
/// (shared library, subprocess, in-process module); it only ever calls
/// through this interface.
#[async_trait]
pub trait PluginHandle: Send + Sync {
    /// Bring the plugin into service
    async fn start(&mut self) -> HostResult<()>;

    /// Take the plugin out of service
    async fn stop(&mut self) -> HostResult<()>;
}

/// Resolution and instantiation seam over a concrete loading mechanism
///
/// `resolve` is the single validation gate: packages must pass it
/// before ever reaching the registry.
pub trait PluginLoader: Send + Sync {
    /// Extract identity metadata from a package
    fn resolve(&self, package: &PluginPackage) -> HostResult<PluginDescriptor>;

    /// Load the package's code unit and produce its start/stop handle
    fn instantiate(
        &self,
        package: &PluginPackage,
        descriptor: &PluginDescriptor,
    ) -> HostResult<Box<dyn PluginHandle>>;
}

/// Shared slot for a plugin's running code unit
///
/// The slot is shared across entry snapshots of the same id so that
/// replacing an entry does not tear down the instance it describes.
pub type HandleSlot = Arc<Mutex<Box<dyn PluginHandle>>>;

/// Registry entry snapshot
///
/// Entries are immutable: every transition replaces the `Arc` in the
/// registry map wholesale, so concurrent readers never observe a
/// half-updated id/version/state combination.
#[derive(Clone)]
pub struct PluginEntry {
    pub descriptor: PluginDescriptor,
    pub package: PluginPackage,
    pub state: PluginState,
    handle: Option<HandleSlot>,
}

impl PluginEntry {
    pub(crate) fn new(
        descriptor: PluginDescriptor,
        package: PluginPackage,
        state: PluginState,
        handle: Option<HandleSlot>,
    ) -> Self {
        Self {
            descriptor,
            package,
            state,
            handle,
        }
    }

    /// Snapshot with a different state, same identity and handle
    pub(crate) fn with_state(&self, state: PluginState) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            package: self.package.clone(),
            state,
            handle: self.handle.clone(),
        }
    }

    pub(crate) fn handle(&self) -> Option<HandleSlot> {
        self.handle.clone()
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("package", &self.package.path)
            .finish()
    }
}

/// Point-in-time listing row returned by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginListing {
    pub id: String,
    pub version: String,
    pub state: PluginState,
}

impl PluginListing {
    /// `"id:version"` form used by the HTTP listing
    pub fn tag(&self) -> String {
        format!("{}:{}", self.id, self.version)
    }
}
