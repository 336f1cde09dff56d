//! core::context
//!
//! Per-invocation state shared by every stage of a command.
//!
//! # Lifetime
//!
//! One [`InvocationContext`] is built at process start from the parsed
//! global flags and the resolved destination. Pre-run may override the
//! destination (`--connection`); everything after reads it.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicI32, Ordering};

use super::config::Config;
use super::destination::Destination;
use crate::engine::{EngineMode, EngineOptions};

/// Log levels accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// All accepted names, most verbose first.
    pub const NAMES: &'static [&'static str] =
        &["trace", "debug", "info", "warn", "error", "fatal", "panic"];

    /// The default level.
    pub const DEFAULT: LogLevel = LogLevel::Warn;

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    ///
    /// `fatal` and `panic` have no tracing equivalent and map to `error`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }

    /// Whether errors should be rendered with their full cause chain.
    pub fn is_verbose(self) -> bool {
        self == LogLevel::Trace
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            "panic" => Ok(LogLevel::Panic),
            _ => Err(format!(
                "log level {:?} is not supported, choose from: {}",
                s,
                Self::NAMES.join(", ")
            )),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
            LogLevel::Panic => "panic",
        };
        write!(f, "{}", name)
    }
}

/// Global flags after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalFlags {
    /// Explicit `--connection` name
    pub connection: Option<String>,
    /// Explicit `--context` value
    pub context: Option<String>,
    /// Remote (tunnel) mode
    pub remote: bool,
    /// Effective log level
    pub log_level: LogLevel,
    /// Worker pool cap, validated in pre-run
    pub max_workers: i64,
    /// Where to write the CPU profile
    pub cpu_profile: Option<PathBuf>,
    /// Local state directory override
    pub runroot: Option<PathBuf>,
    /// OCI runtime override
    pub runtime: Option<String>,
    /// Mirror log output to syslog
    pub syslog: bool,
}

impl Default for GlobalFlags {
    fn default() -> Self {
        Self {
            connection: None,
            context: None,
            remote: false,
            log_level: LogLevel::DEFAULT,
            max_workers: super::parallel::default_max_workers(),
            cpu_profile: None,
            runroot: None,
            runtime: None,
            syslog: false,
        }
    }
}

/// The process exit-code register.
#[derive(Debug, Default)]
pub struct ExitState {
    code: AtomicI32,
}

impl ExitState {
    /// Current exit code.
    pub fn get(&self) -> i32 {
        self.code.load(Ordering::SeqCst)
    }

    /// Record an exit code.
    pub fn set(&self, code: i32) {
        self.code.store(code, Ordering::SeqCst);
    }
}

/// Everything one invocation knows about itself.
#[derive(Debug)]
pub struct InvocationContext {
    /// Effective destination (after `--url`/`--identity`/`--connection`)
    pub destination: Destination,
    /// Parsed global flags
    pub flags: GlobalFlags,
    /// Loaded configuration (defaults when unreadable)
    pub config: Config,
    /// Running as an unprivileged user
    pub rootless: bool,
    /// Exit-code register
    pub exit: ExitState,
    /// Descriptors open when the process started
    pub inherited_fds: BTreeSet<u32>,
}

impl InvocationContext {
    /// Build a context.
    pub fn new(destination: Destination, flags: GlobalFlags, config: Config, rootless: bool) -> Self {
        Self {
            destination,
            flags,
            config,
            rootless,
            exit: ExitState::default(),
            inherited_fds: BTreeSet::new(),
        }
    }

    /// Record the descriptors the caller passed in.
    pub fn with_inherited_fds(mut self, fds: BTreeSet<u32>) -> Self {
        self.inherited_fds = fds;
        self
    }

    /// Whether commands tunnel to a remote service.
    pub fn is_remote(&self) -> bool {
        self.flags.remote
    }

    /// Local state directory.
    ///
    /// `--runroot`, then the configured state root, then a per-user or
    /// system default.
    pub fn state_root(&self) -> PathBuf {
        if let Some(root) = &self.flags.runroot {
            return root.clone();
        }
        if let Some(root) = self.config.state_root() {
            return root.to_path_buf();
        }
        if self.rootless {
            if let Some(dir) = dirs::runtime_dir() {
                return dir.join("berth");
            }
        }
        PathBuf::from("/run/berth")
    }

    /// OCI runtime binary.
    pub fn runtime(&self) -> String {
        self.flags
            .runtime
            .clone()
            .unwrap_or_else(|| self.config.runtime().to_string())
    }

    /// Options for building engines for `command`.
    pub fn engine_options(&self, command: &str, args: &[String]) -> EngineOptions {
        EngineOptions {
            command: command.to_string(),
            args: args.to_vec(),
            mode: if self.is_remote() {
                EngineMode::Tunnel
            } else {
                EngineMode::Local
            },
            uri: self.destination.uri.clone(),
            identity: self.destination.identity.clone(),
            runtime: self.runtime(),
            state_root: self.state_root(),
            inherited_fds: self.inherited_fds.clone(),
        }
    }
}

/// Whether the current process is unprivileged.
#[cfg(unix)]
pub fn running_rootless() -> bool {
    !nix::unistd::geteuid().is_root()
}

/// Whether the current process is unprivileged.
#[cfg(not(unix))]
pub fn running_rootless() -> bool {
    false
}
