use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::pomodoro::PomodoroSettings;
use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub pomodoro: TimerDefaults,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

/// Durations (minutes) used when no timer state has been stored yet, and by
/// the stopwatch widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerDefaults {
    #[serde(default = "default_focus")]
    pub focus: u32,
    #[serde(default = "default_short_break")]
    pub short_break: u32,
    #[serde(default = "default_long_break")]
    pub long_break: u32,
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_plays_per_alert")]
    pub plays_per_alert: u32,
    #[serde(default = "default_repeat_interval_secs")]
    pub repeat_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            pomodoro: TimerDefaults::default(),
            alarm: AlarmConfig::default(),
            tick_millis: default_tick_millis(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self {
            focus: default_focus(),
            short_break: default_short_break(),
            long_break: default_long_break(),
            long_break_interval: default_long_break_interval(),
        }
    }
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            plays_per_alert: default_plays_per_alert(),
            repeat_interval_secs: default_repeat_interval_secs(),
        }
    }
}

impl TimerDefaults {
    pub fn settings(&self) -> PomodoroSettings {
        PomodoroSettings {
            focus: self.focus,
            short_break: self.short_break,
            long_break: self.long_break,
            long_break_interval: self.long_break_interval,
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    if let Some(data_dir) = utils::get_data_dir(utils::Profile::Prod) {
        data_dir.join("store.db").to_string_lossy().to_string()
    } else {
        "~/.local/share/tasktimer/store.db".to_string()
    }
}

fn default_focus() -> u32 {
    25
}

fn default_short_break() -> u32 {
    5
}

fn default_long_break() -> u32 {
    15
}

fn default_long_break_interval() -> u32 {
    4
}

fn default_plays_per_alert() -> u32 {
    2
}

fn default_repeat_interval_secs() -> u64 {
    5
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

impl Config {
    /// Load configuration from file, or create default if missing
    /// Uses the provided profile to determine config and database paths
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        let mut config = Self::load_from(&config_path)?;
        // Ensure database path matches profile (in case config was manually edited)
        config.database_path = Self::default_database_path_for_profile(profile);
        Ok(config)
    }

    /// Load configuration from an explicit file, writing defaults there if it
    /// does not exist yet
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default();
            if let Err(e) = config.save_to(config_path) {
                tracing::error!(
                    path = %config_path.display(),
                    error = %e,
                    "failed to save config file"
                );
                return Err(e);
            }
            Ok(config)
        }
    }

    /// Save configuration to the given file
    pub fn save_to(&mut self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(config_path, toml_string)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| {
                ConfigError::ConfigDirError("Could not determine config directory".to_string())
            })?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("store.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/tasktimer-dev/store.db".to_string(),
                utils::Profile::Prod => "~/.local/share/tasktimer/store.db".to_string(),
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }

    pub fn alarm_interval(&self) -> Duration {
        Duration::from_secs(self.alarm.repeat_interval_secs.max(1))
    }
}
