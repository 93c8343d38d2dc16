//! Run configuration: TOML file, then `BATON_*` environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DEFAULT_MAX_TURNS;
use crate::orchestrator::ExecutionOptions;

pub const ENV_TASKS_ROOT: &str = "BATON_TASKS_ROOT";
pub const ENV_MAX_TURNS: &str = "BATON_MAX_TURNS";
pub const ENV_TURN_TIMEOUT_SECS: &str = "BATON_TURN_TIMEOUT_SECS";
pub const ENV_RESUME: &str = "BATON_RESUME";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatonConfig {
    /// Directory holding one subdirectory per task
    pub tasks_root: PathBuf,
    pub max_turns: u32,
    pub turn_timeout_secs: Option<u64>,
    /// Continue from the ledger's last turn instead of restarting
    pub resume: bool,
    pub log_json: bool,
}

impl Default for BatonConfig {
    fn default() -> Self {
        Self {
            tasks_root: PathBuf::from(".baton/tasks"),
            max_turns: DEFAULT_MAX_TURNS,
            turn_timeout_secs: None,
            resume: false,
            log_json: false,
        }
    }
}

impl BatonConfig {
    /// Read `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Override fields from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`; unset or empty keys are skipped.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = get(ENV_TASKS_ROOT) {
            self.tasks_root = PathBuf::from(root);
        }
        if let Some(raw) = get(ENV_MAX_TURNS) {
            self.max_turns = parse_env(ENV_MAX_TURNS, &raw)?;
        }
        if let Some(raw) = get(ENV_TURN_TIMEOUT_SECS) {
            self.turn_timeout_secs = Some(parse_env(ENV_TURN_TIMEOUT_SECS, &raw)?);
        }
        if let Some(raw) = get(ENV_RESUME) {
            self.resume = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: ENV_RESUME,
                        value: raw,
                    })
                }
            };
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::Invalid("max_turns must be at least 1".into()));
        }
        if self.tasks_root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("tasks_root must not be empty".into()));
        }
        if self.turn_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "turn_timeout_secs must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            turn_timeout: self.turn_timeout_secs.map(Duration::from_secs),
            resume: self.resume,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: raw.to_string(),
    })
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
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = BatonConfig::load(&dir.path().join("baton.toml")).await.unwrap();
        assert_eq!(cfg, BatonConfig::default());
        assert_eq!(cfg.max_turns, 20);
        assert!(!cfg.resume);
    }

    #[tokio::test]
    async fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baton.toml");
        std::fs::write(&path, "max_turns = 7\nturn_timeout_secs = 30\n").unwrap();

        let cfg = BatonConfig::load(&path).await.unwrap();
        assert_eq!(cfg.max_turns, 7);
        assert_eq!(cfg.turn_timeout_secs, Some(30));
        assert_eq!(cfg.tasks_root, PathBuf::from(".baton/tasks"));
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baton.toml");
        std::fs::write(&path, "max_turns = \"many\"").unwrap();
        assert!(matches!(
            BatonConfig::load(&path).await,
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let cfg = BatonConfig::default()
            .apply_env_from(env(&[
                (ENV_TASKS_ROOT, "/var/baton"),
                (ENV_MAX_TURNS, "5"),
                (ENV_TURN_TIMEOUT_SECS, "12"),
                (ENV_RESUME, "true"),
            ]))
            .unwrap();
        assert_eq!(cfg.tasks_root, PathBuf::from("/var/baton"));
        assert_eq!(cfg.max_turns, 5);
        assert_eq!(cfg.turn_timeout_secs, Some(12));
        assert!(cfg.resume);
    }

    #[test]
    fn bad_env_values_are_rejected() {
        assert!(BatonConfig::default()
            .apply_env_from(env(&[(ENV_MAX_TURNS, "lots")]))
            .is_err());
        assert!(BatonConfig::default()
            .apply_env_from(env(&[(ENV_RESUME, "maybe")]))
            .is_err());
    }

    #[test]
    fn validate_rejects_zero_turns_and_timeout() {
        let mut cfg = BatonConfig::default();
        cfg.max_turns = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = BatonConfig::default();
        cfg.turn_timeout_secs = Some(0);
        assert!(cfg.validate().is_err());

        assert!(BatonConfig::default().validate().is_ok());
    }

    #[test]
    fn execution_options_follow_config() {
        let cfg = BatonConfig {
            turn_timeout_secs: Some(3),
            resume: true,
            ..BatonConfig::default()
        };
        let opts = cfg.execution_options();
        assert_eq!(opts.turn_timeout, Some(Duration::from_secs(3)));
        assert!(opts.resume);
    }
}
