//! The trigger rules file and engine settings.
//!
//! Covers:
//! - `load` / `save` (YAML file I/O with atomic write)
//! - XDG-style path helpers (`config_path`, `config_dir`)
//! - Rule validation

use crate::automation::TriggerConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Tuning knobs for the trigger engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    /// Maximum bytes of recent output kept per session for matching.
    #[serde(default = "crate::defaults::buffer_capacity")]
    pub buffer_capacity: usize,
    /// Seconds during which an identical match for the same trigger and
    /// session is not fired again.
    #[serde(default = "crate::defaults::dedup_window_secs")]
    pub dedup_window_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: crate::defaults::buffer_capacity(),
            dedup_window_secs: crate::defaults::dedup_window_secs(),
        }
    }
}

/// Contents of `triggers.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TriggersConfig {
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

impl TriggersConfig {
    /// Load the rules file from the default location, creating a default one
    /// if it does not exist yet.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        log::info!("Trigger config path: {:?}", config_path);

        if config_path.exists() {
            Ok(Self::load_from(&config_path)?)
        } else {
            log::info!(
                "Trigger config not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            if let Err(e) = config.save_to(&config_path) {
                log::error!("Failed to save default trigger config: {}", e);
                return Err(e.into());
            }
            Ok(config)
        }
    }

    /// Load and validate a rules file from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading trigger config from {:?}", path);
        let contents = fs::read_to_string(path)?;
        let config: TriggersConfig = serde_yaml_ng::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded {} trigger(s)", config.triggers.len());
        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml_ng::to_string(self)?;

        // Atomic save: write to temp file then rename to prevent corruption on crash
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, &yaml)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Check every trigger and reject duplicate ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for trigger in &self.triggers {
            trigger.validate().map_err(ConfigError::Validation)?;
            if !seen.insert(trigger.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate trigger id '{}'",
                    trigger.id
                )));
            }
        }
        if self.settings.buffer_capacity == 0 {
            return Err(ConfigError::Validation(
                "settings.buffer_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Triggers that are switched on, in file order.
    pub fn enabled_triggers(&self) -> impl Iterator<Item = &TriggerConfig> {
        self.triggers.iter().filter(|t| t.enabled)
    }

    /// Get the rules file path (using XDG convention)
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("triggers.yaml")
    }

    /// Get the configuration directory path (using XDG convention)
    pub fn config_dir() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            if let Some(config_dir) = dirs::config_dir() {
                config_dir.join("aiterm")
            } else {
                PathBuf::from(".")
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            if let Some(home_dir) = dirs::home_dir() {
                home_dir.join(".config").join("aiterm")
            } else {
                PathBuf::from(".")
            }
        }
    }
}
