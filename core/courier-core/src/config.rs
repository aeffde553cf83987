//! Configuration loading.
//!
//! `~/.courier/config.toml` is optional; every field has a default and the
//! endpoint URLs can be overridden from the environment.
//!
//! ```toml
//! api_base_url = "https://api.example.com/api"
//! socket_base_url = "https://api.example.com"
//! namespace = "/tracking"
//!
//! [sampling]
//! minimum_time_interval_ms = 5000
//! minimum_distance_meters = 10.0
//! desired_accuracy = "high"
//!
//! [reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! ```

use crate::error::{CourierError, Result};
use crate::storage::StorageConfig;
use crate::types::SamplingPolicy;
use courier_protocol::DEFAULT_NAMESPACE;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const API_URL_ENV: &str = "COURIER_API_URL";
pub const SOCKET_URL_ENV: &str = "COURIER_SOCKET_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub api_base_url: String,
    pub socket_base_url: String,
    pub namespace: String,
    pub request_timeout_ms: u64,
    pub permission_timeout_ms: u64,
    pub taken_memory_secs: u64,
    pub sampling: SamplingPolicy,
    pub reconnect: ReconnectPolicy,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            socket_base_url: "http://localhost:3000".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            request_timeout_ms: 10_000,
            permission_timeout_ms: 30_000,
            taken_memory_secs: 300,
            sampling: SamplingPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl CourierConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }

    pub fn taken_memory(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.taken_memory_secs.min(i64::MAX as u64) as i64)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(url) = env::var(SOCKET_URL_ENV) {
            if !url.trim().is_empty() {
                self.socket_base_url = url.trim().to_string();
            }
        }
    }

    fn normalize(&mut self) {
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        self.socket_base_url = self.socket_base_url.trim_end_matches('/').to_string();
        if !self.namespace.starts_with('/') {
            self.namespace = format!("/{}", self.namespace);
        }
    }
}

/// Loads the configuration, returning defaults if the file doesn't exist.
pub fn load_config(storage: &StorageConfig) -> Result<CourierConfig> {
    let path = storage.config_file();
    let mut config = match fs::read_to_string(&path) {
        Ok(content) => toml::from_str::<CourierConfig>(&content).map_err(|err| {
            CourierError::Config {
                path: path.clone(),
                details: err.to_string(),
            }
        })?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => CourierConfig::default(),
        Err(err) => {
            return Err(CourierError::Io {
                context: format!("reading {}", path.display()),
                source: err,
            })
        }
    };
    config.apply_env_overrides();
    config.normalize();
    Ok(config)
}
