//! Durable plugin package storage
//!
//! Module owns the on-disk artifact directory. Uploads land via
//! write-to-temp-then-rename so a concurrent reader never observes a
//! partially written package.

use crate::error::{HostError, HostResult};
use crate::plugin::types::PluginPackage;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store for plugin package artifacts
///
/// The artifact directory is the host's only durable state; registry
/// state is reconstructed from it on restart.
#[derive(Debug, Clone)]
pub struct PackageStore {
    dir: PathBuf,
}

impl PackageStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> HostResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| HostError::storage(format!("cannot create {}: {e}", dir.display())))?;
        info!("Using plugins directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// The artifact directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` under a canonical name derived from `name`,
    /// atomically replacing any existing artifact of that name
    pub async fn put(&self, name: &str, content: &[u8]) -> HostResult<PluginPackage> {
        let file_name = sanitize_file_name(name)?;
        let target = self.dir.join(&file_name);
        let tmp = self.dir.join(format!(".{file_name}.tmp"));

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| HostError::storage(format!("write {}: {e}", tmp.display())))?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            // Leave no temp droppings behind on a failed rename
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(HostError::storage(format!(
                "rename into {}: {e}",
                target.display()
            )));
        }

        debug!("Stored package {} ({} bytes)", target.display(), content.len());
        Ok(PluginPackage {
            id: file_stem(&file_name),
            path: target,
            size: content.len() as u64,
            uploaded_at: Utc::now(),
        })
    }

    /// Delete a package artifact
    ///
    /// Returns `NotFound` if the artifact is already gone; callers doing
    /// best-effort cleanup treat that as a no-op.
    pub async fn remove(&self, package: &PluginPackage) -> HostResult<()> {
        match tokio::fs::remove_file(&package.path).await {
            Ok(()) => {
                info!("Removed package artifact {}", package.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(HostError::not_found(package.id.clone()))
            }
            Err(e) => Err(HostError::storage(format!(
                "remove {}: {e}",
                package.path.display()
            ))),
        }
    }

    /// Enumerate the packages currently present
    ///
    /// Used at process start to repopulate the registry; a fresh call
    /// re-enumerates. Temp files and subdirectories are skipped.
    pub async fn scan_existing(&self) -> HostResult<Vec<PluginPackage>> {
        let mut packages = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| HostError::storage(format!("read {}: {e}", self.dir.display())))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HostError::storage(e.to_string()))?
        {
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    continue;
                }
            };
            packages.push(PluginPackage {
                id: file_stem(&file_name),
                path,
                size: metadata.len(),
                uploaded_at: metadata
                    .modified()
                    .map(chrono::DateTime::from)
                    .unwrap_or_else(|_| Utc::now()),
            });
        }

        debug!("Scanned {} package(s) in {}", packages.len(), self.dir.display());
        Ok(packages)
    }
}

/// Strip any path components from an upload name and reject empty or
/// hidden names; uploads must not escape the artifact directory
fn sanitize_file_name(name: &str) -> HostResult<String> {
    let file_name = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| HostError::invalid_package(format!("unusable package name '{name}'")))?;
    if file_name.starts_with('.') {
        return Err(HostError::invalid_package(format!(
            "unusable package name '{name}'"
        )));
    }
    Ok(file_name)
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store() -> (tempfile::TempDir, PackageStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::open(dir.path()).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_and_scan() {
        let (_dir, store) = temp_store().await;
        let package = store.put("sample.so", b"payload").await.unwrap();
        assert_eq!(package.id, "sample");
        assert_eq!(package.size, 7);
        assert!(package.path.exists());

        let scanned = store.scan_existing().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, "sample");
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let (_dir, store) = temp_store().await;
        let first = store.put("sample.so", b"v1").await.unwrap();
        let second = store.put("sample.so", b"version-two").await.unwrap();
        assert_eq!(first.path, second.path);

        let content = tokio::fs::read(&second.path).await.unwrap();
        assert_eq!(content, b"version-two");
        // Replacement supersedes; only one artifact remains
        assert_eq!(store.scan_existing().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_strips_path_components() {
        let (dir, store) = temp_store().await;
        let package = store.put("../../evil.so", b"x").await.unwrap();
        assert_eq!(package.id, "evil");
        assert_eq!(package.path.parent().unwrap(), dir.path());
    }

    #[tokio::test]
    async fn test_put_rejects_hidden_names() {
        let (_dir, store) = temp_store().await;
        let result = store.put(".sneaky", b"x").await;
        assert!(matches!(result, Err(HostError::InvalidPackage(_))));
    }

    #[tokio::test]
    async fn test_remove_absent_is_not_found() {
        let (_dir, store) = temp_store().await;
        let package = store.put("gone.so", b"x").await.unwrap();
        store.remove(&package).await.unwrap();
        let again = store.remove(&package).await;
        assert!(matches!(again, Err(HostError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_scan_skips_temp_files_and_dirs() {
        let (dir, store) = temp_store().await;
        store.put("real.so", b"x").await.unwrap();
        tokio::fs::write(dir.path().join(".real.so.tmp"), b"partial")
            .await
            .unwrap();
        tokio::fs::create_dir(dir.path().join("subdir")).await.unwrap();

        let scanned = store.scan_existing().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, "real");
    }
}
