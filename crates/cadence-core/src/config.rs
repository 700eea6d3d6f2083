//! Workspace configuration: `.cadence/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The workspace directory name, relative to the project root.
pub const WORKSPACE_DIR: &str = ".cadence";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database filename inside the workspace directory.
    #[serde(default = "default_db_file")]
    pub file: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file: default_db_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Log transition events through tracing.
    #[serde(default = "default_true")]
    pub log_transitions: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log_transitions: default_true(),
        }
    }
}

fn default_db_file() -> String {
    "cadence.db".to_string()
}

const fn default_true() -> bool {
    true
}

impl Config {
    /// Load the config from `<root>/.cadence/config.toml`, falling back to
    /// defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Write the config to `<root>/.cadence/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::config_path(root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create workspace dir {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("serialize config")?;
        std::fs::write(&path, raw).with_context(|| format!("write config {}", path.display()))
    }

    /// Path of the config file under `root`.
    #[must_use]
    pub fn config_path(root: &Path) -> PathBuf {
        root.join(WORKSPACE_DIR).join("config.toml")
    }

    /// Path of the database file under `root`.
    #[must_use]
    pub fn db_path(&self, root: &Path) -> PathBuf {
        root.join(WORKSPACE_DIR).join(&self.database.file)
    }
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.database.file, "cadence.db");
        assert!(config.notify.log_transitions);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.database.file = "custom.db".to_string();
        config.save(dir.path()).expect("save");

        let loaded = Config::load(dir.path()).expect("load");
        assert_eq!(loaded.database.file, "custom.db");
        assert!(
            loaded
                .db_path(dir.path())
                .to_string_lossy()
                .ends_with(".cadence/custom.db")
        );
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Config::config_path(dir.path());
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "[database]\nfile = \"x.db\"\n").expect("write");

        let loaded = Config::load(dir.path()).expect("load");
        assert_eq!(loaded.database.file, "x.db");
        assert!(loaded.notify.log_transitions);
    }
}
