//! core::env
//!
//! Process environment access.
//!
//! # Design
//!
//! Every stage that reads or writes environment variables goes through the
//! [`Environment`] trait. The CLI uses [`SystemEnv`]; tests use [`MapEnv`]
//! so they never mutate the real process environment.

use std::collections::HashMap;

/// Read/write access to environment variables.
pub trait Environment {
    /// Look up a variable. Returns `None` when unset.
    fn get(&self, key: &str) -> Option<String>;

    /// Set a variable.
    fn set(&mut self, key: &str, value: &str);

    /// Check whether a variable is set (even to the empty string).
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var_os(key).map(|v| v.to_string_lossy().into_owned())
    }

    /// Callers must not have other threads running; the CLI drives the
    /// lifecycle on a current-thread runtime.
    fn set(&mut self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}

/// In-memory environment for tests and dry runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }
}

impl Environment for MapEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.vars.insert(key.to_string(), value.to_string());
    }
}
