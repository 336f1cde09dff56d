//! cli::commands
//!
//! Command descriptors, dispatch and handlers.
//!
//! # Architecture
//!
//! Each command has a static [`CommandDescriptor`] that the lifecycle
//! consults before the handler runs. [`run`] checks positional arguments
//! before the lifecycle starts, so a malformed command never touches an
//! engine. Each handler then:
//! 1. Calls the engine through the registry
//! 2. Formats and displays output
//!
//! Handlers never create or shut down engines; the lifecycle does.

mod completion;
mod exec;
mod help;
mod system;
mod version;

pub use crate::engine::command::{Annotations, CommandDescriptor};
pub use completion::{complete_words, completion};
pub use exec::{exec, resolve_env, split_args, ExecError};
pub use help::help;
pub use system::info;
pub use version::version;

use crate::cli::args::{Command, SystemAction};
use crate::core::context::InvocationContext;
use crate::core::env::SystemEnv;
use crate::engine::command::{COMPLETION, HELP, SHELL_COMPLETE_REQUEST};
use crate::engine::{EngineRegistry, LifecycleController};
use anyhow::Result;

/// `exec`
pub const EXEC: CommandDescriptor = CommandDescriptor::leaf("exec");

/// `help`
pub const HELP_COMMAND: CommandDescriptor = CommandDescriptor::leaf(HELP);

/// `completion`
pub const COMPLETION_COMMAND: CommandDescriptor = CommandDescriptor::leaf(COMPLETION);

/// `__complete`
pub const SHELL_COMPLETE: CommandDescriptor = CommandDescriptor::leaf(SHELL_COMPLETE_REQUEST);

/// `system`
pub const SYSTEM: CommandDescriptor = CommandDescriptor {
    has_subcommands: true,
    ..CommandDescriptor::leaf("system")
};

/// `system info`
pub const SYSTEM_INFO: CommandDescriptor = CommandDescriptor::leaf("info");

/// `version`
pub const VERSION: CommandDescriptor = CommandDescriptor {
    annotations: Annotations {
        parent_ns_required: true,
        no_move_process: false,
    },
    ..CommandDescriptor::leaf("version")
};

/// Every descriptor, in help order.
pub const DESCRIPTORS: &[CommandDescriptor] = &[
    EXEC,
    HELP_COMMAND,
    COMPLETION_COMMAND,
    SHELL_COMPLETE,
    SYSTEM,
    SYSTEM_INFO,
    VERSION,
];

impl Command {
    /// The static descriptor for this command.
    pub fn descriptor(&self) -> &'static CommandDescriptor {
        match self {
            Command::Exec(_) => &EXEC,
            Command::Help { .. } => &HELP_COMMAND,
            Command::Completion { .. } => &COMPLETION_COMMAND,
            Command::ShellComplete { .. } => &SHELL_COMPLETE,
            Command::System { action: None } => &SYSTEM,
            Command::System {
                action: Some(SystemAction::Info),
            } => &SYSTEM_INFO,
            Command::Version => &VERSION,
        }
    }

    /// Check positional arguments.
    pub fn validate_args(&self) -> Result<(), ExecError> {
        match self {
            Command::Exec(args) => split_args(&args.args, args.latest).map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Positional arguments, as handed to engine construction.
    pub fn positional_args(&self) -> Vec<String> {
        match self {
            Command::Exec(args) => args.args.clone(),
            Command::Help { command } => command.clone(),
            Command::ShellComplete { words } => words.clone(),
            _ => Vec::new(),
        }
    }
}

/// Validate `command`, then run it inside the lifecycle.
pub async fn run(
    controller: &mut LifecycleController,
    ctx: &mut InvocationContext,
    command: Command,
) -> Result<()> {
    command.validate_args()?;

    let descriptor = command.descriptor();
    let args = command.positional_args();
    controller
        .run_command(ctx, descriptor, &args, move |ctx, registry| {
            Box::pin(dispatch(command, ctx, registry))
        })
        .await
}

/// Dispatch a command to its handler.
pub async fn dispatch(
    command: Command,
    ctx: &InvocationContext,
    registry: &EngineRegistry,
) -> Result<()> {
    match command {
        Command::Exec(args) => exec::exec(ctx, registry, args, &SystemEnv).await,
        Command::Help { command } => help::help(&command),
        Command::Completion { shell } => completion::completion(shell),
        Command::ShellComplete { words } => {
            for word in completion::complete_words(&words) {
                println!("{}", word);
            }
            Ok(())
        }
        Command::System { action: None } => help::help(&["system".to_string()]),
        Command::System {
            action: Some(SystemAction::Info),
        } => system::info(ctx, registry),
        Command::Version => version::version(ctx, registry),
    }
}
