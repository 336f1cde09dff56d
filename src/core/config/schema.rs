//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Config values are validated after parsing: engine environment entries
//! must be `KEY=value` pairs and destination URIs must carry a supported
//! scheme.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// URI schemes a service destination may use.
pub const VALID_SCHEMES: &[&str] = &["unix", "tcp", "ssh", "http", "https"];

/// Top-level configuration file.
///
/// # Example
///
/// ```toml
/// [engine]
/// active_service = "prod"
/// env = ["HTTP_PROXY=http://proxy:3128"]
/// image_copy_tmp_dir = "/var/tmp"
/// runtime = "crun"
///
/// [engine.service_destinations.prod]
/// uri = "tcp://10.0.0.5:8080"
/// identity = "/home/me/.ssh/id_ed25519"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BerthConfig {
    /// Engine settings
    pub engine: EngineConfig,
}

/// `[engine]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Name of the destination used when no override is given
    pub active_service: Option<String>,

    /// Named remote destinations
    pub service_destinations: BTreeMap<String, ServiceDestination>,

    /// `KEY=value` pairs injected into the process environment
    pub env: Vec<String>,

    /// Default for `TMPDIR` when the caller did not set it
    pub image_copy_tmp_dir: Option<String>,

    /// OCI runtime binary used in local mode
    pub runtime: Option<String>,

    /// Directory holding local engine state
    pub state_root: Option<PathBuf>,
}

/// A named service destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceDestination {
    /// Service URI, e.g. `tcp://host:port` or `ssh://user@host/run/berth.sock`
    pub uri: String,

    /// Path to the SSH identity file
    #[serde(default)]
    pub identity: Option<String>,
}

impl BerthConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for entry in &self.engine.env {
            split_env_entry(entry)?;
        }

        for (name, dest) in &self.engine.service_destinations {
            let scheme = dest.uri.split_once("://").map(|(s, _)| s);
            match scheme {
                Some(s) if VALID_SCHEMES.contains(&s) => {}
                _ => {
                    return Err(ConfigError::InvalidValue(format!(
                        "destination '{}' has unsupported uri '{}', scheme must be one of: {}",
                        name,
                        dest.uri,
                        VALID_SCHEMES.join(", ")
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Split an engine `env` entry into key and value.
pub fn split_env_entry(entry: &str) -> Result<(&str, &str), ConfigError> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(ConfigError::InvalidValue(format!(
            "invalid environment variable for engine {}, valid configuration is KEY=value pair",
            entry
        ))),
    }
}
