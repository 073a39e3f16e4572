//! Configuration loading
//!
//! Priority order, highest first:
//! 1. Command-line argument (applied by each binary after loading)
//! 2. Environment variable (clap `env`, applied by each binary)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing default config file is not fatal: a warning is logged and the
//! compiled defaults are used. A config file named explicitly must exist.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "LEADFLOW_CONFIG";

/// Config file looked up in the working directory when nothing else is given
pub const DEFAULT_CONFIG_FILE: &str = "leadflow.toml";

/// Top-level configuration shared by all Leadflow services
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeadflowConfig {
    /// SQLite record store (leads, idempotency keys, insights)
    pub database_path: PathBuf,
    pub intake: IntakeConfig,
    pub insights: InsightsConfig,
    pub channel: ChannelConfig,
    pub triage: TriageConfig,
    pub logging: LoggingConfig,
}

/// Intake service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub bind_addr: String,
    /// Period of the unpublished-lead reconciliation scan; 0 disables it
    pub reconcile_interval_secs: u64,
    /// Leads younger than this are left alone by reconciliation
    pub reconcile_grace_secs: u64,
}

/// Read-only insight lookup service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub bind_addr: String,
}

/// Event channel settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Separate SQLite file for the channel; defaults to the record store file
    pub database_path: Option<PathBuf>,
    pub stream: String,
    pub consumer_group: String,
    /// Unacknowledged deliveries older than this are handed out again
    pub visibility_timeout_ms: u64,
    /// Poll period while a consumer blocks waiting for messages
    pub poll_interval_ms: u64,
}

/// Triage worker settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// Consumer identity inside the group; generated when absent
    pub consumer_name: Option<String>,
    pub batch_size: usize,
    pub block_timeout_ms: u64,
    /// Deliveries beyond this count are dead-lettered instead of processed
    pub max_deliveries: u32,
    pub classifier: ClassifierKind,
}

/// Which classifier implementation the triage worker uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    RuleBased,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    pub level: String,
}

impl Default for LeadflowConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            intake: IntakeConfig::default(),
            insights: InsightsConfig::default(),
            channel: ChannelConfig::default(),
            triage: TriageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            reconcile_interval_secs: 60,
            reconcile_grace_secs: 30,
        }
    }
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8001".to_string(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            stream: "lead_events".to_string(),
            consumer_group: "triage_workers".to_string(),
            visibility_timeout_ms: 30_000,
            poll_interval_ms: 100,
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            consumer_name: None,
            batch_size: 1,
            block_timeout_ms: 1000,
            max_deliveries: 5,
            classifier: ClassifierKind::RuleBased,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LeadflowConfig {
    /// Load configuration
    ///
    /// `explicit` is the `--config` argument. Without it, `LEADFLOW_CONFIG`
    /// is consulted, then `./leadflow.toml`, then compiled defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        warn!("No config file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Parse a TOML config file; the file must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse TOML text; omitted keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// The file holding the event channel tables
    pub fn channel_database_path(&self) -> PathBuf {
        self.channel
            .database_path
            .clone()
            .unwrap_or_else(|| self.database_path.clone())
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel.stream.trim().is_empty() {
            return Err(Error::Config("channel.stream must not be empty".to_string()));
        }
        if self.channel.consumer_group.trim().is_empty() {
            return Err(Error::Config(
                "channel.consumer_group must not be empty".to_string(),
            ));
        }
        if self.triage.batch_size == 0 {
            return Err(Error::Config("triage.batch_size must be at least 1".to_string()));
        }
        if self.triage.max_deliveries == 0 {
            return Err(Error::Config(
                "triage.max_deliveries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// OS-dependent default record store location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("leadflow").join("leadflow.db"))
        .unwrap_or_else(|| PathBuf::from("./leadflow.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment_conventions() {
        let config = LeadflowConfig::default();
        assert_eq!(config.channel.stream, "lead_events");
        assert_eq!(config.channel.consumer_group, "triage_workers");
        assert_eq!(config.triage.batch_size, 1);
        assert_eq!(config.triage.block_timeout_ms, 1000);
        assert_eq!(config.triage.classifier, ClassifierKind::RuleBased);
        assert!(config.database_path.ends_with("leadflow.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LeadflowConfig::from_toml_str(
            r#"
            database_path = "/tmp/leads.db"

            [channel]
            stream = "custom_stream"

            [triage]
            max_deliveries = 3
            classifier = "rule_based"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/leads.db"));
        assert_eq!(config.channel.stream, "custom_stream");
        assert_eq!(config.channel.consumer_group, "triage_workers");
        assert_eq!(config.triage.max_deliveries, 3);
        assert_eq!(config.intake.bind_addr, "127.0.0.1:8000");
    }

    #[test]
    fn test_channel_database_defaults_to_record_store() {
        let mut config = LeadflowConfig::from_toml_str(r#"database_path = "/tmp/a.db""#).unwrap();
        assert_eq!(config.channel_database_path(), PathBuf::from("/tmp/a.db"));

        config.channel.database_path = Some(PathBuf::from("/tmp/channel.db"));
        assert_eq!(config.channel_database_path(), PathBuf::from("/tmp/channel.db"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            LeadflowConfig::from_toml_str("[triage]\nbatch_size = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            LeadflowConfig::from_toml_str("[channel]\nstream = \"\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            LeadflowConfig::from_toml_str("[triage]\nclassifier = \"oracle\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let result = LeadflowConfig::load(Some(Path::new("/nonexistent/leadflow.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
