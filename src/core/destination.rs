//! core::destination
//!
//! Resolve which service endpoint and credentials apply to this invocation.
//!
//! # Priority
//!
//! First match wins, sources are never mixed:
//! 1. `CONTAINER_HOST` (optionally paired with `CONTAINER_SSHKEY`)
//! 2. The configuration's active destination
//! 3. The built-in default local API address
//!
//! Resolution never fails. An unreadable configuration is logged as a
//! warning and the default address is used.

use super::config::{Config, ConfigError};
use super::env::Environment;

/// Environment variable overriding the service URI.
pub const HOST_ENV: &str = "CONTAINER_HOST";

/// Environment variable naming the SSH identity for [`HOST_ENV`].
pub const SSHKEY_ENV: &str = "CONTAINER_SSHKEY";

/// A resolved service destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destination {
    /// Service name (empty when not taken from a named config entry)
    pub service: String,
    /// Service URI
    pub uri: String,
    /// SSH identity path (empty when none)
    pub identity: String,
}

/// Default local API address.
///
/// Unprivileged callers with `XDG_RUNTIME_DIR` set get a per-user socket;
/// everyone else gets the system socket.
pub fn default_api_address(env: &dyn Environment, rootless: bool) -> String {
    match env.get("XDG_RUNTIME_DIR") {
        Some(dir) if rootless && !dir.is_empty() => format!("unix://{}/berth/berth.sock", dir),
        _ => "unix:///run/berth/berth.sock".to_string(),
    }
}

/// Resolve the destination for this invocation.
///
/// `load_config` is only called when `CONTAINER_HOST` is not set.
pub fn resolve_destination<F>(env: &dyn Environment, rootless: bool, load_config: F) -> Destination
where
    F: FnOnce() -> Result<Config, ConfigError>,
{
    if let Some(uri) = env.get(HOST_ENV) {
        return Destination {
            service: String::new(),
            uri,
            identity: env.get(SSHKEY_ENV).unwrap_or_default(),
        };
    }

    let fallback = || Destination {
        service: String::new(),
        uri: default_api_address(env, rootless),
        identity: String::new(),
    };

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                "unable to read local berth configuration: {:#}",
                anyhow::Error::new(e)
            );
            return fallback();
        }
    };

    match config.active_destination() {
        Ok((uri, identity)) => Destination {
            service: config.active_service().unwrap_or_default().to_string(),
            uri,
            identity,
        },
        Err(e) => {
            tracing::debug!("no usable active destination ({}), using default", e);
            fallback()
        }
    }
}
