//! cli
//!
//! Command-line interface layer for berth.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Initialize logging
//! - Resolve the destination and build the invocation context
//! - Run the command inside the lifecycle and render any error
//!
//! # Architecture
//!
//! The CLI layer is thin. Engine setup and teardown belong to
//! [`crate::engine::LifecycleController`]; handlers in [`commands`] only
//! use the engines the lifecycle prepared.

pub mod args;
pub mod commands;

pub use args::{Cli, Command, ExecArgs, Shell, SystemAction};

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::config::Config;
use crate::core::context::{running_rootless, InvocationContext, LogLevel};
use crate::core::destination::resolve_destination;
use crate::core::env::SystemEnv;
use crate::engine::{
    DefaultEngineFactory, EngineRegistry, LifecycleController, EXEC_ERROR_GENERIC,
};
use crate::ui::errors::{connection_hint, format_error};

/// Install the stderr log subscriber, plus a syslog sink with `--syslog`.
///
/// `RUST_LOG` takes precedence over `level`.
fn init_logging(level: LogLevel, syslog: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.as_filter().into());

    let syslog_layer = if syslog {
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .without_time()
                .with_target(false)
                .with_level(false)
                .with_writer(syslog_writer()?),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(syslog_layer)
        .try_init();

    tracing::info!("filtering at log level {}", level);
    Ok(())
}

#[cfg(unix)]
type SyslogSink = crate::core::syslog::SyslogWriter;

#[cfg(unix)]
fn syslog_writer() -> Result<SyslogSink> {
    use crate::core::syslog::{SyslogWriter, SYSLOG_SOCKET};
    SyslogWriter::connect(SYSLOG_SOCKET, "berth").context("failed to initialize syslog hook")
}

#[cfg(not(unix))]
type SyslogSink = fn() -> std::io::Sink;

#[cfg(not(unix))]
fn syslog_writer() -> Result<SyslogSink> {
    anyhow::bail!("failed to initialize syslog hook: syslog is not supported on this platform")
}

/// The async runtime commands run on.
///
/// Pre-run writes the process environment, so no runtime worker threads
/// may exist alongside it.
fn build_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

fn report(err: &anyhow::Error, verbose: bool) {
    eprintln!("{}", format_error(err, verbose));
}

/// Run the CLI application and return the process exit code.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> i32 {
    // Taken before anything else opens a descriptor.
    let inherited_fds = crate::engine::local::open_fds();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() { EXEC_ERROR_GENERIC } else { 0 };
        }
    };

    let env = SystemEnv;
    let flags = match cli.global_flags(&env) {
        Ok(flags) => flags,
        Err(e) => {
            report(&e, false);
            return EXEC_ERROR_GENERIC;
        }
    };
    let verbose = flags.log_level.is_verbose();
    if let Err(e) = init_logging(flags.log_level, flags.syslog) {
        report(&e, verbose);
        return EXEC_ERROR_GENERIC;
    }
    let inherited_fds = inherited_fds.unwrap_or_else(|e| {
        tracing::debug!("unable to list inherited file descriptors: {}", e);
        Default::default()
    });

    let rootless = running_rootless();
    let (config, loaded) = match Config::load(&env) {
        Ok(config) => (config.clone(), Ok(config)),
        Err(e) => (Config::default(), Err(e)),
    };
    let destination = cli.destination(resolve_destination(&env, rootless, || loaded));
    tracing::debug!("destination {:?}", destination);

    let mut ctx = InvocationContext::new(destination, flags, config, rootless)
        .with_inherited_fds(inherited_fds);

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(e) => {
            report(&anyhow::Error::from(e).context("starting async runtime"), verbose);
            return EXEC_ERROR_GENERIC;
        }
    };

    let registry = Arc::new(EngineRegistry::new(Arc::new(DefaultEngineFactory)));
    let mut controller = LifecycleController::new(registry, Box::new(SystemEnv));

    let result = runtime.block_on(commands::run(&mut controller, &mut ctx, cli.command));

    if let Err(err) = &result {
        if ctx.exit.get() == 0 {
            ctx.exit.set(EXEC_ERROR_GENERIC);
        }
        report(err, verbose);
        if ctx.is_remote() {
            if let Some(hint) = connection_hint(err) {
                eprintln!("{}", hint);
            }
        }
    }

    ctx.exit.get()
}
