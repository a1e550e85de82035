use crate::core::model::DEFAULT_EXTENSIONS;
use crate::core::scanner::ScanOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Invalid config {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// Defaults read from `config.json`. Command-line values win over these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub extensions: Vec<String>,
    pub filters: Vec<String>,
}

impl FileConfig {
    /// `<config dir>/syno-dedupe/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("syno-dedupe").join("config.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an explicit file, or the default location when it exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::info!("Using config {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Merge with command-line values: CLI, then this file, then built-ins.
    pub fn scan_options(&self, extensions: &[String], filters: &[String]) -> ScanOptions {
        let extensions: Vec<&str> = if !extensions.is_empty() {
            extensions.iter().map(String::as_str).collect()
        } else if !self.extensions.is_empty() {
            self.extensions.iter().map(String::as_str).collect()
        } else {
            DEFAULT_EXTENSIONS.to_vec()
        };
        let filters: &[String] = if !filters.is_empty() { filters } else { &self.filters };

        ScanOptions::new(extensions, filters.iter().cloned())
    }
}
