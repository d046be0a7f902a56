///
/// # Configuration
///
/// Types and loaders for tandem's process configuration. Absent any
/// configuration the layer is a direct facade over the platform primitives;
/// the only behavioral switch is `scheduler.cooperative`, which routes new
/// worker threads through the cooperative task multiplexer.
///
/// ## Example tandem.toml
///
/// ```toml
/// [scheduler]
/// cooperative = true
/// tasks_per_scheduler = 8
///
/// [strategy]
/// mode = "fallback"
///
/// [log]
/// level = "debug"
/// ```
///
/// ## Environment Variables
///
/// | Variable | Field | Default |
/// |----------|-------|---------|
/// | `TANDEM_COOPERATIVE` | `scheduler.cooperative` | `false` |
/// | `TANDEM_TASKS_PER_SCHEDULER` | `scheduler.tasks_per_scheduler` | `8` |
/// | `TANDEM_STRATEGY` | `strategy.mode` (`auto`/`native`/`fallback`) | `auto` |
/// | `TANDEM_LOG_LEVEL` | `log.level` | `info` |
///

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::SyncError;

pub const DEFAULT_TASKS_PER_SCHEDULER: usize = 8;
pub const MAX_TASKS_PER_SCHEDULER: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub strategy: StrategyConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Run workers on the cooperative scheduler instead of one kernel thread each.
    pub cooperative: bool,
    /// Logical tasks multiplexed onto each scheduling kernel thread.
    pub tasks_per_scheduler: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cooperative: false,
            tasks_per_scheduler: DEFAULT_TASKS_PER_SCHEDULER,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyOverride {
    /// Use whatever the capability probe finds.
    #[default]
    Auto,
    /// Use the native primitives even if the probe disagrees.
    Native,
    /// Always use the emulated primitives.
    Fallback,
}

impl StrategyOverride {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Some(StrategyOverride::Auto),
            "native" => Some(StrategyOverride::Native),
            "fallback" | "emulated" => Some(StrategyOverride::Fallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub mode: StrategyOverride,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// The configured level as a `tracing` level, `None` for "off".
    pub fn tracing_level(&self) -> Result<Option<tracing::Level>, SyncError> {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(None),
            "error" => Ok(Some(tracing::Level::ERROR)),
            "warn" | "warning" => Ok(Some(tracing::Level::WARN)),
            "info" => Ok(Some(tracing::Level::INFO)),
            "debug" => Ok(Some(tracing::Level::DEBUG)),
            "trace" => Ok(Some(tracing::Level::TRACE)),
            other => Err(SyncError::Config {
                reason: format!("unknown log level '{}'", other),
            }),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, SyncError> {
        let content = std::fs::read_to_string(path)?;
        Config::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Config, SyncError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Config, SyncError> {
        Config::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from `TANDEM_*` variables supplied by `lookup`.
    ///
    /// Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(value) = lookup("TANDEM_COOPERATIVE") {
            config.scheduler.cooperative = parse_bool(&value).ok_or_else(|| SyncError::Config {
                reason: format!("TANDEM_COOPERATIVE must be a boolean, got '{}'", value),
            })?;
        }

        if let Some(value) = lookup("TANDEM_TASKS_PER_SCHEDULER") {
            config.scheduler.tasks_per_scheduler =
                value.trim().parse().map_err(|_| SyncError::Config {
                    reason: format!("TANDEM_TASKS_PER_SCHEDULER must be an integer, got '{}'", value),
                })?;
        }

        if let Some(value) = lookup("TANDEM_STRATEGY") {
            config.strategy.mode =
                StrategyOverride::parse(&value).ok_or_else(|| SyncError::Config {
                    reason: format!("unknown TANDEM_STRATEGY '{}'", value),
                })?;
        }

        if let Some(value) = lookup("TANDEM_LOG_LEVEL") {
            config.log.level = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        let tasks = self.scheduler.tasks_per_scheduler;
        if tasks == 0 || tasks > MAX_TASKS_PER_SCHEDULER {
            return Err(SyncError::Config {
                reason: format!(
                    "tasks_per_scheduler must be between 1 and {}, got {}",
                    MAX_TASKS_PER_SCHEDULER, tasks
                ),
            });
        }
        self.log.tracing_level()?;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
