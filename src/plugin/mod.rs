//! Plugin lifecycle management
//!
//! This module is the core of the host: it brings externally supplied,
//! dynamically loaded units of code into the running process, tracks
//! their state, and tears them down. It is built from four parts:
//!
//! - [`store`]: the durable on-disk package directory
//! - [`loader`]: descriptor resolution and instantiation over `libloading`
//! - [`registry`]: the concurrency-safe state machine, one entry per id
//! - [`gateway`]: the operation set external callers invoke

pub mod gateway;
pub mod loader;
pub mod registry;
pub mod store;
pub mod types;


pub use gateway::{LifecycleGateway, PluginEvent};
pub use loader::LibraryLoader;
pub use registry::LifecycleRegistry;
pub use store::PackageStore;
pub use types::{
    PluginDescriptor, PluginEntry, PluginHandle, PluginListing, PluginLoader, PluginPackage,
    PluginState,
};
