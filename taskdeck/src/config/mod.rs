//! Configuration for the `TaskDeck` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskdeck/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::history::HistoryConfig;
use crate::rate_limit::{RateLimit, RateLimits};
use crate::reminders::ReminderConfig;
use crate::tasks::sync::DEFAULT_PAGE_SIZE;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value is zero or outside its supported range.
    #[error("invalid config value for {key}: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

/// Longest history retention accepted, in days.
const MAX_RETENTION_DAYS: u32 = 36_500;

/// Longest reminder look-ahead accepted, in hours. Due dates are at most a
/// year ahead.
const MAX_DUE_SOON_HOURS: u32 = 24 * 366;

/// Rejects zero.
fn positive<T: Default + PartialEq>(key: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            reason: "must be greater than zero",
        });
    }
    Ok(value)
}

/// `value * unit` seconds, rejecting overflow.
fn seconds(key: &'static str, value: u64, unit: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or(ConfigError::Invalid {
            key,
            reason: "is too large",
        })
}

fn at_most(key: &'static str, value: u32, max: u32) -> Result<u32, ConfigError> {
    if value > max {
        return Err(ConfigError::Invalid {
            key,
            reason: "is too large",
        });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    sync: SyncFileConfig,
    limits: LimitsFileConfig,
    history: HistoryFileConfig,
    reminders: RemindersFileConfig,
}

/// `[sync]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    owner: Option<String>,
    page_size: Option<usize>,
}

/// `[limits]` section; one sub-table per operation.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LimitsFileConfig {
    create: LimitFileConfig,
    update: LimitFileConfig,
    delete: LimitFileConfig,
    history: LimitFileConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LimitFileConfig {
    max: Option<usize>,
    window_secs: Option<u64>,
}

impl LimitFileConfig {
    fn apply(
        &self,
        default: RateLimit,
        keys: (&'static str, &'static str),
    ) -> Result<RateLimit, ConfigError> {
        let (max_key, window_key) = keys;
        Ok(RateLimit {
            max: positive(max_key, self.max.unwrap_or(default.max))?,
            window: self.window_secs.map_or(Ok(default.window), |secs| {
                positive(window_key, secs).map(Duration::from_secs)
            })?,
            message: default.message,
        })
    }
}

/// `[history]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HistoryFileConfig {
    retention_days: Option<u32>,
    cleanup_batch_size: Option<usize>,
    max_items: Option<usize>,
    cleanup_interval_hours: Option<u64>,
}

/// `[reminders]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct RemindersFileConfig {
    due_soon_hours: Option<u32>,
    quiet_period_mins: Option<u64>,
    check_interval_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Owner to sign in as.
    pub owner: Option<String>,
    /// Rows requested per page load.
    pub page_size: usize,
    /// Per-operation rate limits.
    pub limits: RateLimits,
    /// History retention and batching.
    pub history: HistoryConfig,
    /// Interval of the periodic history cleanup.
    pub history_cleanup_interval: Duration,
    /// Reminder thresholds.
    pub reminders: ReminderConfig,
    /// Interval between reminder checks.
    pub reminder_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            owner: None,
            page_size: DEFAULT_PAGE_SIZE,
            limits: RateLimits::default(),
            history: HistoryConfig::default(),
            history_cleanup_interval: Duration::from_secs(24 * 60 * 60),
            reminders: ReminderConfig::default(),
            reminder_interval: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// if any config file cannot be parsed, or if a value is zero or out of
    /// range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let limits = &file.limits;
        let limits = RateLimits {
            create: limits.create.apply(
                defaults.limits.create,
                ("limits.create.max", "limits.create.window_secs"),
            )?,
            update: limits.update.apply(
                defaults.limits.update,
                ("limits.update.max", "limits.update.window_secs"),
            )?,
            delete: limits.delete.apply(
                defaults.limits.delete,
                ("limits.delete.max", "limits.delete.window_secs"),
            )?,
            log_history: limits.history.apply(
                defaults.limits.log_history,
                ("limits.history.max", "limits.history.window_secs"),
            )?,
        };

        let history = &file.history;
        let reminders = &file.reminders;
        Ok(Self {
            owner: cli.owner.clone().or_else(|| file.sync.owner.clone()),
            page_size: positive(
                "sync.page_size",
                cli.page_size
                    .or(file.sync.page_size)
                    .unwrap_or(defaults.page_size),
            )?,
            limits,
            history: HistoryConfig {
                retention: match history.retention_days {
                    Some(days) => {
                        let days = at_most(
                            "history.retention_days",
                            positive("history.retention_days", days)?,
                            MAX_RETENTION_DAYS,
                        )?;
                        chrono::Duration::days(i64::from(days))
                    }
                    None => defaults.history.retention,
                },
                cleanup_batch_size: positive(
                    "history.cleanup_batch_size",
                    history
                        .cleanup_batch_size
                        .unwrap_or(defaults.history.cleanup_batch_size),
                )?,
                max_items: positive(
                    "history.max_items",
                    history.max_items.unwrap_or(defaults.history.max_items),
                )?,
            },
            history_cleanup_interval: match history.cleanup_interval_hours {
                Some(hours) => seconds(
                    "history.cleanup_interval_hours",
                    positive("history.cleanup_interval_hours", hours)?,
                    60 * 60,
                )?,
                None => defaults.history_cleanup_interval,
            },
            reminders: ReminderConfig {
                due_soon: match reminders.due_soon_hours {
                    Some(hours) => {
                        let hours = at_most(
                            "reminders.due_soon_hours",
                            positive("reminders.due_soon_hours", hours)?,
                            MAX_DUE_SOON_HOURS,
                        )?;
                        chrono::Duration::hours(i64::from(hours))
                    }
                    None => defaults.reminders.due_soon,
                },
                quiet_period: match reminders.quiet_period_mins {
                    Some(mins) => seconds("reminders.quiet_period_mins", mins, 60)?,
                    None => defaults.reminders.quiet_period,
                },
            },
            reminder_interval: match reminders.check_interval_secs {
                Some(secs) => {
                    Duration::from_secs(positive("reminders.check_interval_secs", secs)?)
                }
                None => defaults.reminder_interval,
            },
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Owner-scoped task list with live sync")]
pub struct CliArgs {
    /// Owner to sign in as.
    #[arg(long, env = "TASKDECK_OWNER")]
    pub owner: Option<String>,

    /// Path to config file (default: `~/.config/taskdeck/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Rows requested per page load.
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Mark the first N created tasks as completed.
    #[arg(long, default_value_t = 0)]
    pub complete: usize,

    /// Print the final state as JSON.
    #[arg(long)]
    pub json: bool,

    /// Only show tasks whose text contains this term (case-insensitive).
    #[arg(long)]
    pub search: Option<String>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKDECK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskdeck.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Task texts to create, in order.
    pub tasks: Vec<String>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskdeck").join("config.toml");
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
