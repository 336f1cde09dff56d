//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order, first existing file wins:
//! 1. `$BERTH_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/berth/berth.toml`
//! 3. `~/.config/berth/berth.toml`
//!
//! A missing file is not an error; defaults are used.
//!
//! # Example
//!
//! ```no_run
//! use berth::core::config::Config;
//! use berth::core::env::SystemEnv;
//!
//! let config = Config::load(&SystemEnv).unwrap();
//! println!("Runtime: {}", config.runtime());
//! ```

pub mod schema;

pub use schema::{BerthConfig, EngineConfig, ServiceDestination};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::env::Environment;

/// Default `TMPDIR` for image copies.
pub const DEFAULT_IMAGE_COPY_TMP_DIR: &str = "/var/tmp";

/// Default OCI runtime binary.
pub const DEFAULT_RUNTIME: &str = "crun";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}'")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("no active destination configured")]
    NoActiveDestination,

    #[error("\"{0}\" service destination not found")]
    UnknownDestination(String),
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents (defaults if no file was found)
    pub file: BerthConfig,
    /// Path the configuration was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated.
    pub fn load(env: &dyn Environment) -> Result<Self, ConfigError> {
        match Self::locate(env) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: BerthConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        file.validate()?;

        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Build a config from an in-memory schema value.
    pub fn from_file(file: BerthConfig) -> Self {
        Self { file, path: None }
    }

    /// Find the first existing config file.
    fn locate(env: &dyn Environment) -> Option<PathBuf> {
        // 1. $BERTH_CONFIG
        if let Some(path) = env.get("BERTH_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. $XDG_CONFIG_HOME/berth/berth.toml
        if let Some(xdg_home) = env.get("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("berth/berth.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. ~/.config/berth/berth.toml
        let home = env.get("HOME").map(PathBuf::from).or_else(dirs::home_dir)?;
        let path = home.join(".config/berth/berth.toml");
        path.exists().then_some(path)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Name of the active service, if any.
    pub fn active_service(&self) -> Option<&str> {
        self.file.engine.active_service.as_deref()
    }

    /// Override the active service (used by `--connection`).
    pub fn set_active_service(&mut self, name: &str) {
        self.file.engine.active_service = Some(name.to_string());
    }

    /// Resolve the active destination to `(uri, identity)`.
    ///
    /// An explicit active service must exist. Without one, a single
    /// configured destination is used implicitly.
    pub fn active_destination(&self) -> Result<(String, String), ConfigError> {
        let destinations = &self.file.engine.service_destinations;
        let dest = match self.active_service() {
            Some(name) => destinations
                .get(name)
                .ok_or_else(|| ConfigError::UnknownDestination(name.to_string()))?,
            None if destinations.len() == 1 => destinations
                .values()
                .next()
                .ok_or(ConfigError::NoActiveDestination)?,
            None => return Err(ConfigError::NoActiveDestination),
        };

        Ok((dest.uri.clone(), dest.identity.clone().unwrap_or_default()))
    }

    /// Engine environment entries as `(key, value)` pairs.
    pub fn engine_env(&self) -> Result<Vec<(String, String)>, ConfigError> {
        self.file
            .engine
            .env
            .iter()
            .map(|entry| {
                schema::split_env_entry(entry).map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect()
    }

    /// Default `TMPDIR` for image copies.
    pub fn image_copy_tmp_dir(&self) -> &str {
        self.file
            .engine
            .image_copy_tmp_dir
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_COPY_TMP_DIR)
    }

    /// OCI runtime binary.
    pub fn runtime(&self) -> &str {
        self.file.engine.runtime.as_deref().unwrap_or(DEFAULT_RUNTIME)
    }

    /// Configured state root, if any.
    pub fn state_root(&self) -> Option<&Path> {
        self.file.engine.state_root.as_deref()
    }

    /// Get the path the configuration was loaded from.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
