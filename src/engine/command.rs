//! engine::command
//!
//! Declarative command metadata consulted by the lifecycle.
//!
//! # Design
//!
//! The lifecycle never looks at parsed arguments to decide what to set up.
//! It only reads a [`CommandDescriptor`]: the command's name, whether it
//! has subcommands, and its annotations. Descriptors are static and
//! immutable.

/// Name of the help command.
pub const HELP: &str = "help";

/// Name of the completion-script command.
pub const COMPLETION: &str = "completion";

/// Name of the hidden command shells call to request completions.
pub const SHELL_COMPLETE_REQUEST: &str = "__complete";

/// Per-command lifecycle annotations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Annotations {
    /// The command must run in the caller's namespace; rootless setup is
    /// skipped.
    pub parent_ns_required: bool,
    /// Rootless setup must not move the process into a new scope.
    pub no_move_process: bool,
}

/// Static definition of one subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Command name as typed by the user
    pub name: &'static str,
    /// Whether the command only groups subcommands
    pub has_subcommands: bool,
    /// Lifecycle annotations
    pub annotations: Annotations,
}

impl CommandDescriptor {
    /// A plain leaf command with no flags or annotations.
    pub const fn leaf(name: &'static str) -> Self {
        Self {
            name,
            has_subcommands: false,
            annotations: Annotations {
                parent_ns_required: false,
                no_move_process: false,
            },
        }
    }

    /// Whether the lifecycle skips engine setup and cleanup for this command.
    ///
    /// Help, completion, shell completion requests and commands that only
    /// group subcommands never touch an engine.
    pub fn skips_lifecycle(&self) -> bool {
        matches!(self.name, HELP | COMPLETION | SHELL_COMPLETE_REQUEST) || self.has_subcommands
    }
}
