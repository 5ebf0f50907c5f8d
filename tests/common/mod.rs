//! Shared test support: a stub loading mechanism over the trait seam
//!
//! Packages are tiny `key=value` manifests, keeping lifecycle tests
//! independent of any real dynamic-library format while exercising the
//! full store -> resolve -> registry path.

use async_trait::async_trait;
use plugin_host::plugin::{
    LifecycleGateway, LifecycleRegistry, PackageStore, PluginDescriptor, PluginHandle,
    PluginLoader, PluginPackage,
};
use plugin_host::{HostError, HostResult};
use std::sync::Arc;

/// Parses `id=...`/`version=...` manifests; `mode=fail-instantiate`
/// and `mode=fail-start` force the respective failure.
pub struct ManifestLoader;

impl ManifestLoader {
    fn parse(package: &PluginPackage) -> HostResult<(PluginDescriptor, Option<String>)> {
        let content = std::fs::read_to_string(&package.path)
            .map_err(|e| HostError::invalid_package(format!("unreadable package: {e}")))?;

        let mut id = None;
        let mut version = None;
        let mut mode = None;
        for line in content.lines() {
            match line.split_once('=') {
                Some(("id", v)) => id = Some(v.to_string()),
                Some(("version", v)) => version = Some(v.to_string()),
                Some(("mode", v)) => mode = Some(v.to_string()),
                _ => return Err(HostError::invalid_package(format!("bad line '{line}'"))),
            }
        }
        match (id, version) {
            (Some(id), Some(version)) => Ok((PluginDescriptor { id, version }, mode)),
            _ => Err(HostError::invalid_package("missing id or version")),
        }
    }
}

impl PluginLoader for ManifestLoader {
    fn resolve(&self, package: &PluginPackage) -> HostResult<PluginDescriptor> {
        Self::parse(package).map(|(descriptor, _)| descriptor)
    }

    fn instantiate(
        &self,
        package: &PluginPackage,
        _descriptor: &PluginDescriptor,
    ) -> HostResult<Box<dyn PluginHandle>> {
        let (_, mode) = Self::parse(package)?;
        if mode.as_deref() == Some("fail-instantiate") {
            return Err(HostError::failed("instantiation refused"));
        }
        Ok(Box::new(StubHandle {
            fail_start: mode.as_deref() == Some("fail-start"),
        }))
    }
}

pub struct StubHandle {
    fail_start: bool,
}

#[async_trait]
impl PluginHandle for StubHandle {
    async fn start(&mut self) -> HostResult<()> {
        if self.fail_start {
            Err(HostError::failed("start hook refused"))
        } else {
            Ok(())
        }
    }

    async fn stop(&mut self) -> HostResult<()> {
        Ok(())
    }
}

/// Gateway over a fresh temp dir and the stub loader
pub async fn stub_gateway() -> (tempfile::TempDir, Arc<LifecycleGateway>) {
    let dir = tempfile::tempdir().unwrap();
    let store = PackageStore::open(dir.path()).await.unwrap();
    let gateway = LifecycleGateway::new(
        store,
        Arc::new(ManifestLoader),
        Arc::new(LifecycleRegistry::new()),
    );
    (dir, Arc::new(gateway))
}

/// Manifest body resolving to the given identity
pub fn manifest(id: &str, version: &str) -> Vec<u8> {
    format!("id={id}\nversion={version}").into_bytes()
}
