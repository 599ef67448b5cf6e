//! Configuration parsing and validation.
//!
//! Configuration is loaded from a TOML file and then adjusted by CLI
//! overrides. Every section is optional; an empty file yields a server on
//! `127.0.0.1:2379` backed by the in-memory store.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// gRPC listener.
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Identity reported in response headers.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Storage backend selection.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Logging.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// gRPC listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:2379").
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Header identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_cluster_id")]
    pub cluster_id: u64,

    #[serde(default = "default_member_id")]
    pub member_id: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_id: default_cluster_id(),
            member_id: default_member_id(),
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend kind. Only "memory" ships with the binary.
    #[serde(default = "default_backend_kind")]
    pub kind: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_bind() -> String {
    "127.0.0.1:2379".to_string()
}

fn default_cluster_id() -> u64 {
    1
}

fn default_member_id() -> u64 {
    1
}

fn default_backend_kind() -> String {
    "memory".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

const BACKEND_KINDS: [&str; 1] = ["memory"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref listen) = overrides.listen {
            self.listener.bind = listen.clone();
        }
    }

    /// Parsed listener address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.listener
            .bind
            .parse()
            .with_context(|| format!("invalid listener.bind address: {}", self.listener.bind))
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;
        self.validate_cluster()?;
        self.validate_backend()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_cluster(&self) -> Result<()> {
        if self.cluster.cluster_id == 0 {
            anyhow::bail!("cluster.cluster_id must be > 0");
        }
        if self.cluster.member_id == 0 {
            anyhow::bail!("cluster.member_id must be > 0");
        }
        Ok(())
    }

    fn validate_backend(&self) -> Result<()> {
        if !BACKEND_KINDS.contains(&self.backend.kind.as_str()) {
            anyhow::bail!(
                "backend.kind must be one of {:?}, got: {}",
                BACKEND_KINDS,
                self.backend.kind
            );
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                LOG_LEVELS,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override listener bind address.
    pub listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.listener.bind, "127.0.0.1:2379");
        assert_eq!(config.cluster.cluster_id, 1);
        assert_eq!(config.backend.kind, "memory");
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&ConfigOverrides {
            log_level: Some("debug".into()),
            listen: Some("0.0.0.0:12379".into()),
        });
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.bind_addr().unwrap().port(), 12379);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let err = Config::from_toml("[backend]\nkind = \"dynamodb\"\n").unwrap_err();
        assert!(err.to_string().contains("backend.kind"));
    }

    #[test]
    fn test_rejects_zero_member_id() {
        let err = Config::from_toml("[cluster]\nmember_id = 0\n").unwrap_err();
        assert!(err.to_string().contains("member_id"));
    }
}
