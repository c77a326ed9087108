use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = "approvals.db";
pub const DEFAULT_LOGGING_LEVEL: &str = "info";

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub logging_level: Option<String>,
    /// Flush sled to disk after every committed write.
    pub flush_on_commit: Option<bool>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
    }

    pub fn logging_level(&self) -> &str {
        self.logging_level
            .as_deref()
            .unwrap_or(DEFAULT_LOGGING_LEVEL)
    }

    pub fn flush_on_commit(&self) -> bool {
        self.flush_on_commit.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.db_path(), PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.logging_level(), "info");
        assert!(!config.flush_on_commit());
    }

    #[test]
    fn values_override_defaults() {
        let config = Config::from_toml_str(
            r#"
            db_path = "/var/lib/approvals"
            logging_level = "debug"
            flush_on_commit = true
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path(), PathBuf::from("/var/lib/approvals"));
        assert_eq!(config.logging_level(), "debug");
        assert!(config.flush_on_commit());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::from_toml_str("flush_on_commit = \"sometimes\"").is_err());
    }
}
