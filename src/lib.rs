//! # Plugin Host
//!
//! A small remote plugin host: it accepts compiled plugin packages over
//! HTTP, loads them into the running process, starts/stops them, and
//! lists what is currently active.
//!
//! The heart of the crate is the [`plugin`] module — the lifecycle
//! manager that safely brings an externally supplied, dynamically
//! loaded unit of code into the process, tracks its state, and tears it
//! down concurrently without corrupting the registry or leaking
//! resources. The [`server`] module merely triggers those transitions
//! over HTTP.
//!
//! ## Embedding the gateway
//!
//! ```rust,no_run
//! use plugin_host::plugin::{
//!     LibraryLoader, LifecycleGateway, LifecycleRegistry, PackageStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> plugin_host::HostResult<()> {
//! let store = PackageStore::open("./plugins").await?;
//! let gateway = LifecycleGateway::new(
//!     store,
//!     Arc::new(LibraryLoader::new()),
//!     Arc::new(LifecycleRegistry::new()),
//! );
//!
//! gateway.startup_recover().await?;
//! let descriptor = gateway
//!     .upload_and_activate("sample.so", &std::fs::read("sample.so")?)
//!     .await?;
//! println!("running: {descriptor}");
//! gateway.drain().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`plugin`]: package store, loader seam, lifecycle registry, gateway
//! - [`server`]: axum routers, bearer auth, listener lifecycle
//! - [`config`]: environment-driven configuration
//! - [`error`]: the `HostError` taxonomy

pub mod config;
pub mod error;
pub mod plugin;
pub mod server;

// Re-export commonly used types for convenience
pub use config::{ExposureMode, HostConfig};
pub use error::{HostError, HostResult};
pub use plugin::{
    LibraryLoader, LifecycleGateway, LifecycleRegistry, PackageStore, PluginDescriptor,
    PluginEvent, PluginHandle, PluginListing, PluginLoader, PluginPackage, PluginState,
};
