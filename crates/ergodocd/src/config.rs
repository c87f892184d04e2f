//! Configuration management for ergodoc.
//!
//! Loads settings from /etc/ergodoc/config.toml or uses defaults.

use anyhow::{Context, Result};
use ergodoc_shared::budget::{
    DEFAULT_MAX_DURATION_MS, DEFAULT_MAX_STEPS, DEFAULT_OBSERVATION_TIMEOUT_MS,
    DEFAULT_POLL_DURATION_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_POLL_SAMPLES,
};
use ergodoc_shared::{PlaybookSet, PollBudget, SessionBudget};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/ergodoc/config.toml";

/// Default config file path for fallback
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/ergodoc/config.toml";

/// Session budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Observation requests per session
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Wall-clock budget per session in milliseconds
    #[serde(default = "default_max_duration")]
    pub max_duration_ms: u64,

    /// Timeout for a single observation in milliseconds
    #[serde(default = "default_observation_timeout")]
    pub observation_timeout_ms: u64,
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

fn default_max_duration() -> u64 {
    DEFAULT_MAX_DURATION_MS
}

fn default_observation_timeout() -> u64 {
    DEFAULT_OBSERVATION_TIMEOUT_MS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_duration_ms: default_max_duration(),
            observation_timeout_ms: default_observation_timeout(),
        }
    }
}

/// Trend polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    #[serde(default = "default_poll_samples")]
    pub max_samples: u32,

    #[serde(default = "default_poll_duration")]
    pub max_duration_ms: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_poll_samples() -> u32 {
    DEFAULT_POLL_SAMPLES
}

fn default_poll_duration() -> u64 {
    DEFAULT_POLL_DURATION_MS
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_samples: default_poll_samples(),
            max_duration_ms: default_poll_duration(),
        }
    }
}

/// Playbook source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybooksConfig {
    /// TOML playbook set; the built-in set when unset
    #[serde(default)]
    pub path: Option<String>,

    /// Playbook used when the command line names none
    #[serde(default = "default_playbook")]
    pub default_playbook: String,
}

fn default_playbook() -> String {
    "performance".to_string()
}

impl Default for PlaybooksConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_playbook: default_playbook(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// EnvFilter directive, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub playbooks: PlaybooksConfig,

    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load config from file, or return defaults
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH)
            .or_else(|_| Self::load_from_path(DEFAULT_CONFIG_PATH))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                Config::default()
            })
    }

    /// Load config from specific path
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save default config to path (for init)
    pub fn save_default(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(&Config::default())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        info!("Saved default config to {}", path.display());
        Ok(())
    }

    /// Session budget, clamped to the hard caps
    pub fn to_session_budget(&self) -> SessionBudget {
        SessionBudget {
            max_steps: self.session.max_steps,
            max_duration_ms: self.session.max_duration_ms,
            observation_timeout_ms: self.session.observation_timeout_ms,
        }
        .clamped()
    }

    pub fn to_poll_budget(&self) -> PollBudget {
        PollBudget {
            interval_ms: self.poll.interval_ms,
            max_samples: self.poll.max_samples,
            max_duration_ms: self.poll.max_duration_ms,
        }
        .clamped()
    }

    /// Built-in playbooks, or the validated set at `playbooks.path`
    pub fn load_playbooks(&self) -> Result<PlaybookSet> {
        let Some(path) = &self.playbooks.path else {
            return Ok(PlaybookSet::builtin());
        };
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
        let set = PlaybookSet::from_toml_str(&content)
            .with_context(|| format!("Invalid playbook set {}", path))?;
        info!(
            "Loaded {} playbook(s), version {}, from {}",
            set.playbooks.len(),
            set.version,
            path
        );
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.max_steps, 8);
        assert_eq!(config.session.max_duration_ms, 60_000);
        assert_eq!(config.playbooks.default_playbook, "performance");
        assert_eq!(config.log.filter, "info");
        assert!(config.playbooks.path.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[session]
max_steps = 3

[poll]
interval_ms = 250
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.max_steps, 3);
        assert_eq!(config.poll.interval_ms, 250);
        // Defaults for missing fields
        assert_eq!(config.session.observation_timeout_ms, 5_000);
        assert_eq!(config.poll.max_samples, 10);
        assert_eq!(config.playbooks.default_playbook, "performance");
    }

    #[test]
    fn test_budgets_are_clamped() {
        let toml_str = r#"
[session]
max_steps = 10000
max_duration_ms = 0
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let budget = config.to_session_budget();
        assert_eq!(budget.max_steps, 64);
        assert_eq!(budget.max_duration_ms, 1);
        assert_eq!(budget.observation_timeout_ms, 1);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::save_default(&path).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.session.max_steps, 8);
        assert_eq!(config.poll.max_duration_ms, 30_000);
    }

    #[test]
    fn test_load_playbooks_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playbooks.toml");
        std::fs::write(
            &path,
            r#"
version = 7

[[playbooks]]
id = "custom"
title = "Custom"

[[playbooks.rules]]
id = "busy"
kind = "process"
root_cause = "Busy"
action = "Look"

[[playbooks.rules.when]]
type = "threshold"
field = "mailbox_depth"
op = "gt"
value = 10.0
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.playbooks.path = Some(path.display().to_string());
        let set = config.load_playbooks().unwrap();
        assert_eq!(set.version, 7);
        assert_eq!(set.ids(), vec!["custom"]);
    }

    #[test]
    fn test_invalid_playbooks_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playbooks.toml");
        std::fs::write(
            &path,
            "version = 1\n[[playbooks]]\nid = \"empty\"\ntitle = \"Empty\"\nrules = []\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.playbooks.path = Some(path.display().to_string());
        assert!(config.load_playbooks().is_err());
    }
}
