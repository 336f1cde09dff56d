//! engine
//!
//! Engine collaborators and the command lifecycle around them.
//!
//! # Architecture
//!
//! Two long-lived collaborators serve every command: the image engine and
//! the container engine. Both sit behind traits so that the lifecycle
//! never depends on a particular backend:
//!
//! - [`local`] drives an OCI runtime binary on this host
//! - [`tunnel`] talks to a remote service over HTTP
//! - [`mock`] records calls for tests
//!
//! [`registry::EngineRegistry`] creates each engine at most once per process
//! and shuts each down at most once. [`lifecycle::LifecycleController`]
//! decides when that happens:
//!
//! ```text
//! Idle --pre_run--> Armed --body--> post_run --> Idle
//!   \--pre_run--> Skipped ---------> post_run (no-op) --> Idle
//! ```
//!
//! # Invariants
//!
//! - Help and completion commands never construct engines
//! - Post-run always runs, including after pre-run failure and body panic
//! - The image engine shuts down before the container engine

pub mod command;
pub mod lifecycle;
pub mod local;
pub mod mock;
pub mod registry;
pub mod tunnel;

pub use command::{Annotations, CommandDescriptor};
pub use lifecycle::{LifecycleController, LifecycleError, LifecycleState};
pub use registry::EngineRegistry;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Exit code for a failure inside the CLI itself.
pub const EXEC_ERROR_GENERIC: i32 = 125;

/// Exit code when the runtime could not invoke the command.
pub const EXEC_ERROR_CANNOT_INVOKE: i32 = 126;

/// Exit code when the runtime binary was not found.
pub const EXEC_ERROR_NOT_FOUND: i32 = 127;

/// Sentinel marking a failure of the low-level OCI runtime.
///
/// Always found at the bottom of an error chain; the error formatter looks
/// for it to render runtime failures specially.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("OCI runtime error")]
pub struct OciRuntimeError;

/// Why the OCI runtime failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OciFailure {
    /// The runtime ran and reported a failure.
    Generic,
    /// The runtime binary does not exist.
    NotFound,
    /// The runtime binary could not be executed.
    PermissionDenied,
}

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The OCI runtime failed.
    #[error("{detail}")]
    OciRuntime {
        /// What went wrong, without the sentinel text
        detail: String,
        /// Failure class, used for the exit code
        kind: OciFailure,
        #[source]
        source: OciRuntimeError,
    },

    /// No container matched.
    #[error("no container with name or ID \"{0}\" found: no such container")]
    NoSuchContainer(String),

    /// `--latest` found nothing to act on.
    #[error("no running containers found")]
    NoLatestContainer,

    /// The service could not be reached.
    #[error("unable to connect to service at {uri}: {message}")]
    Connection {
        /// Service URI
        uri: String,
        /// Transport error
        message: String,
    },

    /// The URI scheme is not usable by this engine.
    #[error("unsupported connection uri \"{0}\"")]
    UnsupportedUri(String),

    /// The service answered with an error status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the service
        message: String,
    },

    /// `--preserve-fds` asked for descriptors that are not open.
    #[error("invalid --preserve-fds={0} specified. Not enough FDs available")]
    InvalidPreserveFds(u32),

    /// The operation is not available in this mode.
    #[error("{0} is not supported in remote mode")]
    RemoteUnsupported(&'static str),

    /// Local I/O failed.
    #[error("{context}")]
    Io {
        /// What was being done
        context: String,
        source: std::io::Error,
    },

    /// Engine construction failed.
    #[error("engine setup failed: {0}")]
    Setup(String),

    /// The engine was already shut down.
    #[error("{0} engine already shut down")]
    ShutDown(&'static str),
}

impl EngineError {
    /// Build an OCI runtime failure.
    pub fn oci(kind: OciFailure, detail: impl Into<String>) -> Self {
        EngineError::OciRuntime {
            detail: detail.into(),
            kind,
            source: OciRuntimeError,
        }
    }

    /// Exit code this failure should leave behind.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::OciRuntime {
                kind: OciFailure::NotFound,
                ..
            } => EXEC_ERROR_NOT_FOUND,
            EngineError::OciRuntime {
                kind: OciFailure::PermissionDenied,
                ..
            } => EXEC_ERROR_CANNOT_INVOKE,
            _ => EXEC_ERROR_GENERIC,
        }
    }

    /// Whether this is a connection failure.
    pub fn is_connection(&self) -> bool {
        matches!(self, EngineError::Connection { .. })
    }
}

/// Whether an engine runs locally or tunnels to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// In-process against the local runtime.
    Local,
    /// Over a connection to a remote service.
    Tunnel,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineMode::Local => write!(f, "local"),
            EngineMode::Tunnel => write!(f, "tunnel"),
        }
    }
}

/// Description of an engine, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    /// Local or tunnel
    pub mode: EngineMode,
    /// Runtime binary and state root, or service URI
    pub endpoint: String,
}

/// Everything a factory needs to build an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Name of the command being run
    pub command: String,
    /// Positional arguments of the command
    pub args: Vec<String>,
    /// Local or tunnel
    pub mode: EngineMode,
    /// Service URI (tunnel mode)
    pub uri: String,
    /// SSH identity (tunnel mode)
    pub identity: String,
    /// OCI runtime binary (local mode)
    pub runtime: String,
    /// Local state directory
    pub state_root: PathBuf,
    /// Descriptors the caller passed in (local mode, `--preserve-fds`)
    pub inherited_fds: BTreeSet<u32>,
}

/// Parameters for running a command in a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Command and arguments
    pub cmd: Vec<String>,
    /// `KEY=value` environment entries
    pub env: Vec<String>,
    /// Keep stdin open
    pub interactive: bool,
    /// Allocate a pseudo-TTY
    pub tty: bool,
    /// Grant all capabilities
    pub privileged: bool,
    /// Target the most recently created container
    pub latest: bool,
    /// User to run as
    pub user: Option<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Extra file descriptors to pass (starting at 3)
    pub preserve_fds: u32,
}

/// Result of an exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecReport {
    /// Exit status of the process inside the container
    pub exit_code: i32,
}

/// The container engine.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Describe this engine.
    fn info(&self) -> EngineInfo;

    /// Run a command inside a container.
    ///
    /// `name_or_id` is `None` when `options.latest` is set.
    async fn exec(
        &self,
        name_or_id: Option<&str>,
        options: &ExecOptions,
    ) -> Result<ExecReport, EngineError>;

    /// Prepare the environment for an unprivileged caller.
    async fn setup_rootless(&self, no_move_process: bool) -> Result<(), EngineError>;

    /// Release everything this engine holds.
    async fn shutdown(&self, force: bool) -> Result<(), EngineError>;
}

/// The image engine.
#[async_trait]
pub trait ImageEngine: Send + Sync {
    /// Describe this engine.
    fn info(&self) -> EngineInfo;

    /// Release everything this engine holds.
    async fn shutdown(&self, force: bool) -> Result<(), EngineError>;
}

/// Builds engines.
///
/// Creation is async so engines can wait on shared resources (the local
/// state lock) without blocking the runtime.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Create the image engine.
    async fn image_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<Arc<dyn ImageEngine>, EngineError>;

    /// Create the container engine.
    async fn container_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError>;
}

/// Picks local or tunnel engines from the options' mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEngineFactory;

#[async_trait]
impl EngineFactory for DefaultEngineFactory {
    async fn image_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<Arc<dyn ImageEngine>, EngineError> {
        Ok(match options.mode {
            EngineMode::Local => Arc::new(local::LocalImageEngine::new(options)?),
            EngineMode::Tunnel => Arc::new(tunnel::TunnelImageEngine::new(options)?),
        })
    }

    async fn container_engine(
        &self,
        options: &EngineOptions,
    ) -> Result<Arc<dyn ContainerEngine>, EngineError> {
        Ok(match options.mode {
            EngineMode::Local => Arc::new(local::LocalContainerEngine::new(options).await?),
            EngineMode::Tunnel => Arc::new(tunnel::TunnelContainerEngine::new(options)?),
        })
    }
}
