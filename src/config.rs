use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use relaymon_monitor::{MaintenanceSettings, MonitorSettings, SourceSettings};
use relaymon_store::DbSettings;

/// Top-level configuration: an optional TOML file with environment
/// variable overrides applied on top. Every field has a documented
/// default, so running with no config at all is valid.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseSection,
    pub monitor: MonitorSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let defaults = DbSettings::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            user: defaults.user,
            password: defaults.password,
            database: defaults.database,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSection {
    /// Log file tailed when journald is unavailable.
    pub log_path: PathBuf,
    /// systemd unit whose journal is the preferred source.
    pub journal_unit: String,
    pub limit_refresh_secs: u64,
    pub sweep_interval_secs: u64,
    pub retention_days: i64,
    pub fallback_delay_secs: u64,
    pub poll_interval_ms: u64,
    pub source_retry_secs: u64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        let source = SourceSettings::default();
        let maintenance = MaintenanceSettings::default();
        Self {
            log_path: source.log_path,
            journal_unit: source.journal_unit,
            limit_refresh_secs: maintenance.limit_refresh_interval.as_secs(),
            sweep_interval_secs: maintenance.sweep_interval.as_secs(),
            retention_days: maintenance.retention_days,
            fallback_delay_secs: source.fallback_delay.as_secs(),
            poll_interval_ms: source.poll_interval.as_millis() as u64,
            source_retry_secs: source.retry_interval.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration. An explicitly given file must exist and parse;
    /// with no file, defaults are used. Environment overrides are applied
    /// either way.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// dotenv-style overrides, matching the deployment convention of the
    /// management backend that shares this store.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("RELAYMON_DB_HOST") {
            self.database.host = host;
        }
        if let Ok(port) = env::var("RELAYMON_DB_PORT") {
            if let Ok(port) = port.parse() {
                self.database.port = port;
            }
        }
        if let Ok(user) = env::var("RELAYMON_DB_USER") {
            self.database.user = user;
        }
        if let Ok(password) = env::var("RELAYMON_DB_PASS") {
            self.database.password = password;
        }
        if let Ok(database) = env::var("RELAYMON_DB_NAME") {
            self.database.database = database;
        }
        if let Ok(path) = env::var("RELAYMON_LOG_PATH") {
            self.monitor.log_path = path.into();
        }
        if let Ok(unit) = env::var("RELAYMON_JOURNAL_UNIT") {
            self.monitor.journal_unit = unit;
        }
    }

    pub fn db_settings(&self) -> DbSettings {
        DbSettings {
            host: self.database.host.clone(),
            port: self.database.port,
            user: self.database.user.clone(),
            password: self.database.password.clone(),
            database: self.database.database.clone(),
        }
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            source: SourceSettings {
                log_path: self.monitor.log_path.clone(),
                journal_unit: self.monitor.journal_unit.clone(),
                fallback_delay: Duration::from_secs(self.monitor.fallback_delay_secs),
                poll_interval: Duration::from_millis(self.monitor.poll_interval_ms),
                retry_interval: Duration::from_secs(self.monitor.source_retry_secs),
            },
            maintenance: MaintenanceSettings {
                limit_refresh_interval: Duration::from_secs(self.monitor.limit_refresh_secs),
                sweep_interval: Duration::from_secs(self.monitor.sweep_interval_secs),
                retention_days: self.monitor.retention_days,
            },
        }
    }
}
