//! Environment-driven host configuration
//!
//! The host reads its entire configuration from environment variables;
//! the plugin storage directory is the only durable state it touches.

use crate::error::{HostError, HostResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the HTTP surface is exposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExposureMode {
    /// One listener, bearer auth on every non-health route
    SinglePortAuthenticated,

    /// Two listeners: an internal one without auth for trusted callers,
    /// and an external one with bearer auth
    DualPortSplitAuth,
}

/// Host configuration snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Directory holding plugin package artifacts
    pub plugins_dir: PathBuf,

    /// Port for the internal (unauthenticated) listener
    pub internal_port: u16,

    /// Port for the external (authenticated) listener
    pub external_port: u16,

    /// Bearer secret; `None` disables all protected access (fail closed)
    pub auth_token: Option<String>,

    /// Listener exposure policy
    pub exposure: ExposureMode,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugins_dir: PathBuf::from("./plugins"),
            internal_port: 8666,
            external_port: 8777,
            auth_token: None,
            exposure: ExposureMode::DualPortSplitAuth,
        }
    }
}

impl HostConfig {
    /// Build a configuration from the process environment
    ///
    /// Recognized variables: `PLUGINS_DIR`, `INTERNAL_HTTP_PORT`,
    /// `EXTERNAL_HTTP_PORT`, `AUTH_TOKEN`, `EXPOSURE_MODE`
    /// (`single` or `dual`).
    pub fn from_env() -> HostResult<Self> {
        let defaults = Self::default();

        let plugins_dir = std::env::var("PLUGINS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.plugins_dir);

        let internal_port = parse_port("INTERNAL_HTTP_PORT", defaults.internal_port)?;
        let external_port = parse_port("EXTERNAL_HTTP_PORT", defaults.external_port)?;

        let auth_token = std::env::var("AUTH_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let exposure = match std::env::var("EXPOSURE_MODE").ok().as_deref() {
            None | Some("dual") => ExposureMode::DualPortSplitAuth,
            Some("single") => ExposureMode::SinglePortAuthenticated,
            Some(other) => {
                return Err(HostError::Config(format!(
                    "EXPOSURE_MODE must be 'single' or 'dual', got '{other}'"
                )));
            }
        };

        Ok(Self {
            plugins_dir,
            internal_port,
            external_port,
            auth_token,
            exposure,
        })
    }

    /// Whether protected routes can be served at all
    pub fn auth_configured(&self) -> bool {
        self.auth_token.is_some()
    }
}

fn parse_port(var: &str, default: u16) -> HostResult<u16> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse::<u16>()
            .map_err(|_| HostError::Config(format!("{var} must be a port number, got '{raw}'"))),
        Err(_) => Ok(default),
    }
}
