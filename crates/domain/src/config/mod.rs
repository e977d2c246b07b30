//! Platform configuration.
//!
//! Every service loads an optional TOML file and then applies the
//! environment overrides documented in the deployment surface
//! (`REGISTRY_HOST`, `REDIS_ADDR`, `STORAGE_TYPE`, …). Defaults are
//! expressed as serde default helpers so a missing file and an empty
//! environment still yield a runnable configuration.

mod channels;
mod controller;
mod gateway;
mod lifecycle;
mod registry;
mod storage;

pub use channels::{ChannelConfig, ChannelsConfig, IrcConfig, IrcServerConfig};
pub use controller::ControllerConfig;
pub use gateway::GatewayConfig;
pub use lifecycle::LifecycleConfig;
pub use registry::RegistryConfig;
pub use storage::{StorageBackend, StorageConfig};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// A single problem found by [`Config::validate`].
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Config {
    /// Load configuration: TOML file if `path` is given and exists,
    /// defaults otherwise, then environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(p)?;
                toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", p.display())))?
            }
            Some(p) => {
                return Err(Error::Config(format!("config file not found: {}", p.display())));
            }
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Apply the documented environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("REGISTRY_HOST") {
            self.registry.host = v;
        }
        if let Some(port) = env_parse::<u16>("REGISTRY_PORT") {
            self.registry.port = port;
        }
        if let Ok(v) = std::env::var("REDIS_ADDR") {
            self.storage.redis_addr = v;
        }
        if let Ok(v) = std::env::var("REDIS_PASSWORD") {
            self.storage.redis_password = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(db) = env_parse::<i64>("REDIS_DB") {
            self.storage.redis_db = db;
        }
        if let Ok(v) = std::env::var("STORAGE_TYPE") {
            match v.parse() {
                Ok(backend) => self.storage.backend = backend,
                Err(_) => tracing::warn!(value = %v, "STORAGE_TYPE not recognized, keeping configured backend"),
            }
        }
        if let Ok(v) = std::env::var("DATA_DIR") {
            self.storage.data_dir = v.into();
        }
        if let Some(port) = env_parse::<u16>("HTTP_PORT") {
            self.gateway.http_port = port;
        }
        if let Some(port) = env_parse::<u16>("GRPC_PORT") {
            self.controller.grpc_port = port;
        }
        if let Some(enabled) = env_parse::<bool>("SERVICE_REGISTRY_ENABLED") {
            self.lifecycle.enabled = enabled;
        }
        if let Ok(v) = std::env::var("SERVICE_REGISTRY_URL") {
            self.lifecycle.registry_url = v;
        }
    }

    /// Sanity-check the configuration. Errors should abort startup;
    /// warnings are logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let mut error = |message: String| {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message,
            })
        };

        if self.registry.cache_capacity == 0 {
            error("registry.cache_capacity must be > 0".into());
        }
        if self.registry.staleness_deadline_secs == 0 {
            error("registry.staleness_deadline_secs must be > 0".into());
        }
        if self.gateway.queue_capacity == 0 {
            error("gateway.queue_capacity must be > 0".into());
        }
        if self.controller.max_patterns == 0 {
            error("controller.max_patterns must be > 0".into());
        }
        for (i, server) in self.channels.irc.servers.iter().enumerate() {
            if server.host.is_empty() {
                error(format!("channels.irc.servers[{i}].host must not be empty"));
            }
        }

        if self.lifecycle.enabled && self.lifecycle.registry_url.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "lifecycle enabled but lifecycle.registry_url is empty".into(),
            });
        }
        issues
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean() {
        let config = Config::default();
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn zero_capacities_are_errors() {
        let mut config = Config::default();
        config.registry.cache_capacity = 0;
        config.gateway.queue_capacity = 0;
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .collect();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let raw = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&raw).unwrap();
        assert_eq!(back.registry.port, config.registry.port);
        assert_eq!(back.gateway.queue_capacity, config.gateway.queue_capacity);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::load(Some(std::path::Path::new("/nonexistent/aegis.toml"))).unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
