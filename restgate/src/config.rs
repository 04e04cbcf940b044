// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Gateway configuration
//!
//! Defaults are usable as-is; `from_env` overlays `RESTGATE_*` variables and
//! `from_json_file` reads a JSON document with the same shape as
//! [`GatewayConfig`].

use crate::storage::StorageType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Comma-separated module allow-list
pub const ENV_PLUGIN_ALLOW_LIST: &str = "RESTGATE_PLUGINS";
pub const ENV_PLUGIN_DIR: &str = "RESTGATE_PLUGIN_DIR";
pub const ENV_SESSION_TTL: &str = "RESTGATE_SESSION_TTL_SECS";
pub const ENV_SESSION_RETENTION: &str = "RESTGATE_SESSION_RETENTION";
pub const ENV_STORAGE_TYPE: &str = "RESTGATE_STORAGE";
pub const ENV_DATA_DIR: &str = "RESTGATE_DATA_DIR";
pub const ENV_TOKEN_SECRET: &str = "RESTGATE_TOKEN_SECRET";

const DEV_TOKEN_SECRET: &str = "restgate-development-secret-change-me";

/// Ceiling for every configured lifetime or interval (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn bounded_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

fn check_range(name: &str, value: u64, min: u64) -> ConfigResult<()> {
    if value < min || value > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid(format!(
            "{} must be between {} and {} seconds, got {}",
            name, min, MAX_DURATION_SECS, value
        )));
    }
    Ok(())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// What happens to a session record when it is invalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Remove the record from the store
    #[default]
    HardDelete,
    /// Keep the record, flagged invalidated, for auditing
    SoftInvalidate,
}

impl std::str::FromStr for RetentionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "delete" | "hard_delete" | "hard-delete" => Ok(RetentionPolicy::HardDelete),
            "invalidate" | "soft_invalidate" | "soft-invalidate" => {
                Ok(RetentionPolicy::SoftInvalidate)
            }
            other => Err(format!(
                "Unknown retention policy: {}. Valid options: delete, invalidate",
                other
            )),
        }
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sliding validity window; expiry = last access + ttl
    pub ttl_secs: u64,
    pub retention: RetentionPolicy,
    /// Period of the cache expiry sweep
    pub sweep_interval_secs: u64,
    /// How long past expiry a cache entry may linger before eviction
    pub sweep_grace_secs: u64,
    /// Bound of the persistence queue
    pub queue_capacity: usize,
    /// Idle tick of the drain worker
    pub drain_tick_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 6 * 60 * 60,
            retention: RetentionPolicy::HardDelete,
            sweep_interval_secs: 60,
            sweep_grace_secs: 5 * 60,
            queue_capacity: 1024,
            drain_tick_secs: 30,
        }
    }
}

impl SessionConfig {
    /// Capped at [`MAX_DURATION_SECS`]; `validate` rejects larger values
    pub fn ttl(&self) -> chrono::Duration {
        bounded_seconds(self.ttl_secs)
    }

    pub fn grace(&self) -> chrono::Duration {
        bounded_seconds(self.sweep_grace_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn drain_tick(&self) -> Duration {
        Duration::from_secs(self.drain_tick_secs)
    }
}

/// Bearer token settings for the default JWT issuer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub secret: String,
    /// Upper bound on token validity; session expiry is enforced separately
    pub lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: DEV_TOKEN_SECRET.to_string(),
            lifetime_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl TokenConfig {
    pub fn uses_development_secret(&self) -> bool {
        self.secret == DEV_TOKEN_SECRET
    }

    pub fn lifetime(&self) -> chrono::Duration {
        bounded_seconds(self.lifetime_secs)
    }
}

/// Plugin discovery settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Directory scanned at startup; no scan when unset
    pub directory: Option<PathBuf>,
    /// Declared module names allowed to register; all when unset
    pub allow_list: Option<Vec<String>>,
}

impl PluginConfig {
    pub fn is_allowed(&self, name: &str) -> bool {
        match &self.allow_list {
            Some(list) => list.iter().any(|allowed| allowed == name),
            None => true,
        }
    }
}

/// Parse a comma-separated allow-list, ignoring blanks
pub fn parse_allow_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub storage_type: StorageType,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sled,
            path: PathBuf::from("./restgate-data"),
        }
    }
}

/// Audit fan-out settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// First path segments never dispatched to audit modules
    pub excluded_endpoints: Vec<String>,
    /// Run each module's notification on the blocking pool instead of inline
    pub detached: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            excluded_endpoints: vec!["health".to_string(), "version".to_string()],
            detached: true,
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub session: SessionConfig,
    pub token: TokenConfig,
    pub plugins: PluginConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
}

impl GatewayConfig {
    /// Defaults overlaid with `RESTGATE_*` environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().overlay_env(|var| std::env::var(var).ok())
    }

    /// Read a JSON config file; missing sections take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GatewayConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn overlay_env<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_PLUGIN_DIR) {
            self.plugins.directory = Some(PathBuf::from(dir));
        }
        if let Some(raw) = lookup(ENV_PLUGIN_ALLOW_LIST) {
            let list = parse_allow_list(&raw);
            self.plugins.allow_list = if list.is_empty() { None } else { Some(list) };
        }
        if let Some(raw) = lookup(ENV_SESSION_TTL) {
            self.session.ttl_secs = raw.trim().parse().map_err(|e| ConfigError::Env {
                var: ENV_SESSION_TTL.to_string(),
                message: format!("{}", e),
            })?;
        }
        if let Some(raw) = lookup(ENV_SESSION_RETENTION) {
            self.session.retention = raw.parse().map_err(|message| ConfigError::Env {
                var: ENV_SESSION_RETENTION.to_string(),
                message,
            })?;
        }
        if let Some(raw) = lookup(ENV_STORAGE_TYPE) {
            self.storage.storage_type = raw.parse().map_err(|message| ConfigError::Env {
                var: ENV_STORAGE_TYPE.to_string(),
                message,
            })?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage.path = PathBuf::from(dir);
        }
        if let Some(secret) = lookup(ENV_TOKEN_SECRET) {
            self.token.secret = secret;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        check_range("session.ttl_secs", self.session.ttl_secs, 1)?;
        check_range("session.sweep_grace_secs", self.session.sweep_grace_secs, 0)?;
        check_range("session.sweep_interval_secs", self.session.sweep_interval_secs, 1)?;
        check_range("session.drain_tick_secs", self.session.drain_tick_secs, 1)?;
        check_range("token.lifetime_secs", self.token.lifetime_secs, 1)?;
        if self.session.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session.queue_capacity must be > 0".into(),
            ));
        }
        if self.token.secret.is_empty() {
            return Err(ConfigError::Invalid("token.secret must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.ttl(), chrono::Duration::hours(6));
        assert_eq!(config.session.drain_tick(), Duration::from_secs(30));
        assert!(config.plugins.is_allowed("anything"));
    }

    #[test]
    fn test_env_overlay() {
        let config = GatewayConfig::default()
            .overlay_env(env(&[
                (ENV_PLUGIN_ALLOW_LIST, "audit-log, ,reports"),
                (ENV_SESSION_TTL, "120"),
                (ENV_SESSION_RETENTION, "invalidate"),
                (ENV_STORAGE_TYPE, "memory"),
                (ENV_PLUGIN_DIR, "/opt/restgate/plugins"),
            ]))
            .unwrap();

        assert_eq!(
            config.plugins.allow_list,
            Some(vec!["audit-log".to_string(), "reports".to_string()])
        );
        assert!(config.plugins.is_allowed("reports"));
        assert!(!config.plugins.is_allowed("rogue"));
        assert_eq!(config.session.ttl_secs, 120);
        assert_eq!(config.session.retention, RetentionPolicy::SoftInvalidate);
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(
            config.plugins.directory,
            Some(PathBuf::from("/opt/restgate/plugins"))
        );
    }

    #[test]
    fn test_env_overlay_rejects_bad_values() {
        let err = GatewayConfig::default()
            .overlay_env(env(&[(ENV_SESSION_TTL, "six hours")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));

        let err = GatewayConfig::default()
            .overlay_env(env(&[(ENV_SESSION_TTL, "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_oversized_lifetimes_are_rejected() {
        let err = GatewayConfig::default()
            .overlay_env(env(&[(ENV_SESSION_TTL, u64::MAX.to_string().as_str())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = GatewayConfig::default()
            .overlay_env(env(&[(ENV_SESSION_TTL, "10000000000000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let ceiling = MAX_DURATION_SECS.to_string();
        let config = GatewayConfig::default()
            .overlay_env(env(&[(ENV_SESSION_TTL, ceiling.as_str())]))
            .unwrap();
        assert_eq!(config.session.ttl(), chrono::Duration::days(3650));

        let mut config = GatewayConfig::default();
        config.token.lifetime_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.token.lifetime_secs = 60;
        config.session.sweep_grace_secs = u64::MAX;
        assert!(config.validate().is_err());

        // Conversions never wrap negative, even on an unvalidated config.
        let session = SessionConfig {
            ttl_secs: u64::MAX,
            ..SessionConfig::default()
        };
        assert_eq!(session.ttl(), chrono::Duration::days(3650));
    }

    #[test]
    fn test_json_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("restgate.json");
        std::fs::write(
            &path,
            r#"{ "session": { "ttl_secs": 60, "retention": "soft_invalidate" },
                 "storage": { "storage_type": "memory" } }"#,
        )
        .unwrap();

        let config = GatewayConfig::from_json_file(&path).unwrap();
        assert_eq!(config.session.ttl_secs, 60);
        assert_eq!(config.session.retention, RetentionPolicy::SoftInvalidate);
        assert_eq!(config.session.queue_capacity, 1024);
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(config.audit.excluded_endpoints, vec!["health", "version"]);
    }
}
