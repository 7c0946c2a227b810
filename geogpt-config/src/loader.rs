//! Configuration loader.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::schema::{GeoGptConfig, LogFormat};

/// Environment variable overriding [`GeoGptConfig::working_dir`].
pub const WORKING_DIR_VAR: &str = "GEOGPT_WORKING_DIR";
/// Environment variable overriding the log filter.
pub const LOG_LEVEL_VAR: &str = "GEOGPT_LOG_LEVEL";
/// Environment variable overriding the log format.
pub const LOG_FORMAT_VAR: &str = "GEOGPT_LOG_FORMAT";
/// Environment variable overriding the log file.
pub const LOG_FILE_VAR: &str = "GEOGPT_LOG_FILE";

impl GeoGptConfig {
    /// Loads configuration from `path`, falling back to defaults when the file
    /// does not exist, then applies `GEOGPT_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "config file not found; using defaults");
            Self::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = lookup(WORKING_DIR_VAR) {
            self.working_dir = PathBuf::from(dir);
        }
        if let Some(level) = lookup(LOG_LEVEL_VAR) {
            self.logging.level = level;
        }
        if let Some(format) = lookup(LOG_FORMAT_VAR) {
            match LogFormat::parse(&format) {
                Some(format) => self.logging.format = format,
                None => warn!(value = %format, "ignoring unknown {LOG_FORMAT_VAR}"),
            }
        }
        if let Some(file) = lookup(LOG_FILE_VAR) {
            self.logging.file = Some(PathBuf::from(file));
        }
    }

    /// Writes the configuration as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or any filesystem operation fails.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let rendered = toml::to_string_pretty(self).context("failed to serialise config")?;
        fs::write(path, rendered)
            .with_context(|| format!("failed to write config file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use tempfile::TempDir;

    use crate::schema::LoggingConfig;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let mut expected = GeoGptConfig::default();
        expected.apply_overrides(|key| env::var(key).ok());
        let cfg = GeoGptConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, expected);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("geogpt.toml");

        let mut cfg = GeoGptConfig::default();
        cfg.working_dir = PathBuf::from("/srv/gis");
        cfg.logging = LoggingConfig {
            level: "debug".into(),
            file: Some(PathBuf::from("/var/log/geogpt.log")),
            ..LoggingConfig::default()
        };
        cfg.save_to(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let loaded: GeoGptConfig = toml::from_str(&raw).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "working_dir = [").unwrap();
        let err = GeoGptConfig::load_from(&path).expect_err("parse failure");
        assert!(err.to_string().contains("failed to parse config file"));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = GeoGptConfig::default();
        cfg.apply_overrides(lookup(&[
            (WORKING_DIR_VAR, "/tmp/work"),
            (LOG_LEVEL_VAR, "warn"),
            (LOG_FORMAT_VAR, "compact"),
            (LOG_FILE_VAR, "/tmp/geogpt.log"),
        ]));
        assert_eq!(cfg.working_dir, PathBuf::from("/tmp/work"));
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.logging.format, LogFormat::Compact);
        assert_eq!(cfg.logging.file, Some(PathBuf::from("/tmp/geogpt.log")));
    }

    #[test]
    fn blank_and_unknown_overrides_are_ignored() {
        let mut cfg = GeoGptConfig::default();
        cfg.apply_overrides(lookup(&[(LOG_LEVEL_VAR, "  "), (LOG_FORMAT_VAR, "yaml")]));
        assert_eq!(cfg.logging, LoggingConfig::default());
    }
}
