//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Daemon configuration
///
/// Loaded with the fallback chain: explicit `--config` path, then
/// project-local `.sd.yml`, then `~/.config/sd/sd.yml`, then defaults.
/// CLI flags override file values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum loops running at once
    #[serde(rename = "max-parallel")]
    pub max_parallel: usize,

    /// Findings store file
    #[serde(rename = "db-path")]
    pub db_path: Option<PathBuf>,

    /// Pin a specific LLM backend
    #[serde(rename = "preferred-backend")]
    pub preferred_backend: Option<String>,

    /// Root of the codebase to analyze
    #[serde(rename = "codebase-path")]
    pub codebase_path: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_parallel: 3,
            db_path: None,
            preferred_backend: None,
            codebase_path: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Load configuration with the fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".sd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("sd").join("sd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_parallel, 3);
        assert!(config.db_path.is_none());
        assert!(config.preferred_backend.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sd.yml");
        fs::write(&path, "max-parallel: 5\npreferred-backend: claude\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.max_parallel, 5);
        assert_eq!(config.preferred_backend.as_deref(), Some("claude"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = PathBuf::from("/nonexistent/sd.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("sd.yml");
        fs::write(&path, "log-level: DEBUG\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.max_parallel, 3);
        assert_eq!(config.log_level.as_deref(), Some("DEBUG"));
    }
}
