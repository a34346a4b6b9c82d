//! Configuration loading
//!
//! Settings come from a TOML file resolved in priority order:
//! 1. Explicit path (highest priority)
//! 2. `DSADMIN_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/dsadmin/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! All sections and fields are optional in the file; anything omitted
//! takes its compiled default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable pointing at the config file
pub const CONFIG_ENV_VAR: &str = "DSADMIN_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub browser: BrowserSettings,

    #[serde(default)]
    pub tasks: TaskSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Browser controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Maximum number of children materialized per node; exceeding it
    /// truncates the fetch and signals the size-limit condition
    #[serde(default = "default_max_children")]
    pub max_children: usize,

    /// Fixed number of fetch worker threads
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,

    /// Effective search filter applied to every fetch
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Object classes treated as containers in addition to entries that
    /// report subordinates
    #[serde(default = "default_container_classes")]
    pub container_classes: Vec<String>,

    /// Only materialize container children
    #[serde(default = "default_true")]
    pub show_container_only: bool,

    /// Automatically expand a fetched node's single container child
    #[serde(default)]
    pub automatic_expand: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        BrowserSettings {
            max_children: default_max_children(),
            fetch_workers: default_fetch_workers(),
            filter: default_filter(),
            container_classes: default_container_classes(),
            show_container_only: true,
            automatic_expand: false,
        }
    }
}

/// Task coordinator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Event bus capacity for task progress events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for TaskSettings {
    fn default() -> Self {
        TaskSettings {
            event_capacity: default_event_capacity(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// tracing filter directive, e.g. "info" or "dsadmin_browser=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_log_level(),
        }
    }
}

fn default_max_children() -> usize {
    5000
}

fn default_fetch_workers() -> usize {
    2
}

fn default_filter() -> String {
    crate::ldap::ALL_OBJECTS_FILTER.to_string()
}

fn default_container_classes() -> Vec<String> {
    vec![
        "organization".to_string(),
        "organizationalUnit".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolve the config file path without reading it.
///
/// Returns `None` when no file exists anywhere in the priority chain.
pub fn resolve_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return Some(PathBuf::from(path));
    }

    let platform = dirs::config_dir().map(|d| d.join("dsadmin").join("config.toml"))?;
    if platform.exists() {
        Some(platform)
    } else {
        None
    }
}

/// Load configuration, falling back to compiled defaults when no file is
/// found. An explicitly given path that cannot be read is an error;
/// a missing platform-default file is not.
pub fn load_config(explicit: Option<&Path>) -> Result<ConsoleConfig> {
    let path = match resolve_config_file(explicit) {
        Some(path) => path,
        None => {
            tracing::debug!("no config file found, using compiled defaults");
            return Ok(ConsoleConfig::default());
        }
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;

    tracing::info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Write a configuration file (used by setup flows and tests)
pub fn write_toml_config(config: &ConsoleConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.browser.max_children, 5000);
        assert_eq!(config.browser.fetch_workers, 2);
        assert!(config.browser.show_container_only);
        assert!(!config.browser.automatic_expand);
        assert_eq!(config.tasks.event_capacity, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[browser]\nmax_children = 42\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.browser.max_children, 42);
        // Everything omitted stays at its default
        assert_eq!(config.browser.fetch_workers, 2);
        assert_eq!(config.tasks.event_capacity, 1000);
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ConsoleConfig::default();
        config.browser.automatic_expand = true;
        config.browser.container_classes = vec!["domain".to_string()];
        write_toml_config(&config, &path).unwrap();

        let back = load_config(Some(&path)).unwrap();
        assert!(back.browser.automatic_expand);
        assert_eq!(back.browser.container_classes, vec!["domain".to_string()]);
    }

    #[test]
    fn test_env_var_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("from-env.toml");
        std::fs::write(&path, "[tasks]\nevent_capacity = 7\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &path);
        assert_eq!(resolve_config_file(None), Some(path.clone()));
        let config = load_config(None).unwrap();
        assert_eq!(config.tasks.event_capacity, 7);
        std::env::remove_var(CONFIG_ENV_VAR);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(load_config(Some(&path)).is_err());
    }
}
