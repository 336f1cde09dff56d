//! exec command - Run a process in a running container

use anyhow::Result;
use thiserror::Error;

use crate::cli::args::ExecArgs;
use crate::core::context::InvocationContext;
use crate::core::env::Environment;
use crate::engine::{EngineError, EngineRegistry, ExecOptions, EXEC_ERROR_GENERIC};

/// Argument errors caught before any engine is contacted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("must provide a command to exec")]
    MissingCommand,

    #[error("must provide one container name or id")]
    MissingContainer,
}

/// Split positional arguments into the target container and the command.
///
/// With `--latest` every argument belongs to the command.
pub fn split_args(args: &[String], latest: bool) -> Result<(Option<&str>, &[String]), ExecError> {
    if latest {
        if args.is_empty() {
            return Err(ExecError::MissingCommand);
        }
        return Ok((None, args));
    }

    match args {
        [] => Err(ExecError::MissingContainer),
        [_] => Err(ExecError::MissingCommand),
        [container, cmd @ ..] => Ok((Some(container.as_str()), cmd)),
    }
}

/// Expand `--env` entries.
///
/// `KEY=value` is passed through; a bare `KEY` copies the caller's value
/// and is dropped when the caller has none.
pub fn resolve_env(entries: &[String], env: &dyn Environment) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| {
            if entry.contains('=') {
                return Some(entry.clone());
            }
            match env.get(entry) {
                Some(value) => Some(format!("{}={}", entry, value)),
                None => {
                    tracing::debug!("--env {} is not set in the caller's environment", entry);
                    None
                }
            }
        })
        .collect()
}

/// Run `args` in a container and record its exit status.
pub async fn exec(
    ctx: &InvocationContext,
    registry: &EngineRegistry,
    args: ExecArgs,
    env: &dyn Environment,
) -> Result<()> {
    let (container, cmd) = split_args(&args.args, args.latest)?;

    if ctx.is_remote() && args.latest {
        return Err(EngineError::RemoteUnsupported("--latest").into());
    }

    let options = ExecOptions {
        cmd: cmd.to_vec(),
        env: resolve_env(&args.env, env),
        interactive: args.interactive,
        tty: args.tty,
        privileged: args.privileged,
        latest: args.latest,
        user: args.user.clone(),
        workdir: args.workdir.clone(),
        preserve_fds: args.preserve_fds,
    };

    let engine = registry
        .container_engine(&ctx.engine_options("exec", &args.args))
        .await?;
    match engine.exec(container, &options).await {
        Ok(report) => {
            ctx.exit.set(report.exit_code);
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "exec in container {} failed: {}",
                container.unwrap_or("(latest)"),
                e
            );
            if e.exit_code() != EXEC_ERROR_GENERIC {
                ctx.exit.set(e.exit_code());
            }
            Err(e.into())
        }
    }
}
