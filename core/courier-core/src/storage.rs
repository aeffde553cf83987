//! Storage configuration and path management.
//!
//! All on-disk locations (config, credentials, logs) are resolved here so
//! tests can point the whole client at a temp directory.

use std::env;
use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "COURIER_HOME";
const DIR_NAME: &str = ".courier";

/// Central configuration for courier storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.courier/`
/// (or `$COURIER_HOME`). Tests use `StorageConfig::with_root(temp_dir)`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        if let Ok(root) = env::var(HOME_ENV) {
            if !root.trim().is_empty() {
                return Self {
                    root: PathBuf::from(root),
                };
            }
        }
        let root = dirs::home_dir()
            .map(|home| home.join(DIR_NAME))
            .unwrap_or_else(|| env::temp_dir().join(DIR_NAME));
        Self { root }
    }
}

impl StorageConfig {
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to config.toml (endpoints, sampling and reconnect policy).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to credentials.json (driver id + bearer token).
    pub fn credentials_file(&self) -> PathBuf {
        self.root.join("credentials.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}
