//! TOML-based application configuration.
//!
//! Stores planner preferences including:
//! - Working hours per weekday and their UTC offset
//! - Buffer time between blocks
//! - Estimation, learning and relaxation-ladder constants
//!
//! Configuration is stored at `<data dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::schedule::WorkingHours;
use crate::scheduler::RelaxationPolicy;

/// Baseline estimation constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimationConfig {
    #[serde(default = "default_base_minutes")]
    pub base_minutes: u32,
    #[serde(default = "default_high_multiplier")]
    pub high_multiplier: f64,
    #[serde(default = "default_normal_multiplier")]
    pub normal_multiplier: f64,
    #[serde(default = "default_low_multiplier")]
    pub low_multiplier: f64,
}

/// Learning store constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearningConfig {
    /// EMA blend factor
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Raw samples retained
    #[serde(default = "default_learning_history")]
    pub history_limit: usize,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Calendar queried for busy time
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// Minutes kept free around busy intervals and between blocks
    #[serde(default = "default_buffer_minutes")]
    pub buffer_minutes: u32,
    /// Rescheduling events retained
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub working_hours: WorkingHours,
    #[serde(default)]
    pub estimation: EstimationConfig,
    #[serde(default)]
    pub learning: LearningConfig,
    #[serde(default)]
    pub relaxation: RelaxationPolicy,
}

// Default functions
fn default_calendar_id() -> String {
    "primary".into()
}
fn default_buffer_minutes() -> u32 {
    15
}
fn default_history_limit() -> usize {
    100
}
fn default_base_minutes() -> u32 {
    60
}
fn default_high_multiplier() -> f64 {
    1.5
}
fn default_normal_multiplier() -> f64 {
    1.0
}
fn default_low_multiplier() -> f64 {
    0.7
}
fn default_learning_rate() -> f64 {
    0.1
}
fn default_learning_history() -> usize {
    1000
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            base_minutes: default_base_minutes(),
            high_multiplier: default_high_multiplier(),
            normal_multiplier: default_normal_multiplier(),
            low_multiplier: default_low_multiplier(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            history_limit: default_learning_history(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            calendar_id: default_calendar_id(),
            buffer_minutes: default_buffer_minutes(),
            history_limit: default_history_limit(),
            working_hours: WorkingHours::default(),
            estimation: EstimationConfig::default(),
            learning: LearningConfig::default(),
            relaxation: RelaxationPolicy::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = match current {
                serde_json::Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    fn coerce_value(
        key: &str,
        existing: &serde_json::Value,
        value: &str,
    ) -> Result<serde_json::Value, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };
        Ok(match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => {
                if let Ok(n) = value.parse::<i64>() {
                    serde_json::Value::Number(n.into())
                } else if let Ok(n) = value.parse::<f64>() {
                    serde_json::Number::from_f64(n)
                        .map(serde_json::Value::Number)
                        .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                } else {
                    return Err(invalid(format!("cannot parse '{value}' as number")));
                }
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.into()),
        })
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
        let (leaf, parents) = parts.split_last().ok_or_else(unknown)?;

        let mut current = root;
        for part in parents {
            current = match current {
                serde_json::Value::Array(items) => {
                    let idx = part.parse::<usize>().map_err(|_| unknown())?;
                    items.get_mut(idx).ok_or_else(unknown)?
                }
                other => other.get_mut(*part).ok_or_else(unknown)?,
            };
        }

        let slot = match current {
            serde_json::Value::Array(items) => {
                let idx = leaf.parse::<usize>().map_err(|_| unknown())?;
                items.get_mut(idx).ok_or_else(unknown)?
            }
            serde_json::Value::Object(obj) => obj.get_mut(*leaf).ok_or_else(unknown)?,
            _ => return Err(unknown()),
        };
        *slot = Self::coerce_value(key, slot, value)?;
        Ok(())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if !path.exists() {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            return Ok(cfg);
        }
        Self::load_from(&path)
    }

    /// Load from disk or return default.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default configuration");
                Self::default()
            }
        }
    }

    /// Parse and validate the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let cfg: Config = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.working_hours
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "working_hours".into(),
                message: e.to_string(),
            })?;
        if !(0.0..=1.0).contains(&self.learning.learning_rate) {
            return Err(ConfigError::InvalidValue {
                key: "learning.learning_rate".into(),
                message: "must be within [0, 1]".into(),
            });
        }
        if !(0.0..1.0).contains(&self.relaxation.shrink_fraction) {
            return Err(ConfigError::InvalidValue {
                key: "relaxation.shrink_fraction".into(),
                message: "must be within [0, 1)".into(),
            });
        }
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key. Returns error if key is unknown or the
    /// resulting configuration is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
