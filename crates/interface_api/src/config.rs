//! API configuration
//!
//! Loaded from `API_*` environment variables (and a `.env` file, if present,
//! via `dotenvy` in the binary). Unset keys fall back to the defaults below.

use std::path::PathBuf;

use serde::Deserialize;

use core_kernel::CoreError;
use domain_bill::CommandServiceConfig;
use domain_session::RecoveryPolicy;
use infra_db::DatabaseConfig;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Maximum pooled database connections
    pub database_max_connections: u32,
    /// Log level
    pub log_level: String,
    /// Root directory for per-participant session snapshots
    pub session_dir: PathBuf,
    /// Sessions saved longer ago than this are discarded
    pub session_max_age_hours: u64,
    /// Push low-severity conflicts through without asking
    pub auto_dismiss_low_severity: bool,
    /// Attempts a delete makes when it keeps losing version races
    pub delete_retry_limit: u32,
    /// Buffer of the change fan-out per subscriber
    pub change_channel_capacity: usize,
    /// Unresolved conflicts are dropped after this many minutes
    pub pending_conflict_ttl_minutes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/splitledger".to_string(),
            database_max_connections: 10,
            log_level: "info".to_string(),
            session_dir: PathBuf::from("./data/sessions"),
            session_max_age_hours: 24,
            auto_dismiss_low_severity: false,
            delete_retry_limit: 3,
            change_channel_capacity: 1024,
            pending_conflict_ttl_minutes: 24 * 60,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Rejects settings the services cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.database_url.trim().is_empty() {
            return Err(CoreError::configuration("database_url must be set"));
        }
        if self.session_max_age_hours == 0 {
            return Err(CoreError::configuration("session_max_age_hours must be at least 1"));
        }
        if self.delete_retry_limit == 0 {
            return Err(CoreError::configuration("delete_retry_limit must be at least 1"));
        }
        if self.pending_conflict_ttl_minutes == 0 {
            return Err(CoreError::configuration("pending_conflict_ttl_minutes must be at least 1"));
        }
        if self.change_channel_capacity == 0 {
            return Err(CoreError::configuration("change_channel_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_config(&self) -> CommandServiceConfig {
        CommandServiceConfig {
            auto_dismiss_low_severity: self.auto_dismiss_low_severity,
            delete_retry_limit: self.delete_retry_limit,
            pending_conflict_ttl_secs: self.pending_conflict_ttl_minutes.saturating_mul(60),
            ..CommandServiceConfig::default()
        }
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        RecoveryPolicy::with_max_age_hours(self.session_max_age_hours)
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database_url).max_connections(self.database_max_connections)
    }
}
