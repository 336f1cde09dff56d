//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--connection` / `-c`: Named destination from the configuration
//! - `--url`, `--identity`: Explicit service URI and SSH identity
//! - `--remote` / `-r`: Tunnel to a remote service
//! - `--log-level`: Log filter (`--debug` / `-D` is a hidden alias for debug)
//! - `--max-workers`: Cap on parallel work
//! - `--cpu-profile`: Write a CPU profile of the command
//! - `--runroot`, `--runtime`: Local state directory and OCI runtime
//! - `--syslog`: Mirror log output to the local syslog daemon

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::core::context::{GlobalFlags, LogLevel};
use crate::core::destination::{Destination, HOST_ENV};
use crate::core::env::Environment;
use crate::core::parallel::default_max_workers;

/// berth - run and manage OCI containers locally or on a remote service
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Connection to use for remote service
    #[arg(short = 'c', long, global = true, value_name = "NAME")]
    pub connection: Option<String>,

    /// URL to access the service (e.g. tcp://host:port)
    #[arg(long, global = true, value_name = "URL")]
    pub url: Option<String>,

    /// Path to SSH identity file
    #[arg(long, global = true, value_name = "PATH")]
    pub identity: Option<String>,

    /// Access a remote service
    #[arg(short = 'r', long, global = true)]
    pub remote: bool,

    /// Name of the context to use
    #[arg(long, global = true, hide = true)]
    pub context: Option<String>,

    /// Log messages at and above specified level
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Same as --log-level=debug
    #[arg(short = 'D', long, global = true, hide = true)]
    pub debug: bool,

    /// Maximum number of parallel workers
    #[arg(
        long,
        global = true,
        allow_negative_numbers = true,
        default_value_t = default_max_workers()
    )]
    pub max_workers: i64,

    /// Write a CPU profile to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub cpu_profile: Option<PathBuf>,

    /// Path to the runtime state directory
    #[arg(long, global = true, value_name = "PATH")]
    pub runroot: Option<PathBuf>,

    /// OCI runtime binary
    #[arg(long, global = true, value_name = "NAME")]
    pub runtime: Option<String>,

    /// Output logging information to syslog as well as the console
    #[arg(long, global = true)]
    pub syslog: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Effective log level from `--log-level` and `--debug`.
    pub fn log_level(&self) -> Result<LogLevel> {
        match (self.debug, self.log_level) {
            (true, Some(level)) if level != LogLevel::Debug && level != LogLevel::DEFAULT => {
                bail!("--log-level={} and --debug cannot be used together", level)
            }
            (true, _) => Ok(LogLevel::Debug),
            (false, level) => Ok(level.unwrap_or(LogLevel::DEFAULT)),
        }
    }

    /// Whether commands tunnel to a remote service.
    ///
    /// Remote mode is implied by an explicit `--url` or `--connection`, or
    /// by `CONTAINER_HOST` being set.
    pub fn is_remote(&self, env: &dyn Environment) -> bool {
        self.remote || self.url.is_some() || self.connection.is_some() || env.contains(HOST_ENV)
    }

    /// Apply `--url` and `--identity` on top of the resolved destination.
    pub fn destination(&self, resolved: Destination) -> Destination {
        Destination {
            service: resolved.service,
            uri: self.url.clone().unwrap_or(resolved.uri),
            identity: self.identity.clone().unwrap_or(resolved.identity),
        }
    }

    /// Global flags for the invocation context.
    pub fn global_flags(&self, env: &dyn Environment) -> Result<GlobalFlags> {
        Ok(GlobalFlags {
            connection: self.connection.clone(),
            context: self.context.clone(),
            remote: self.is_remote(env),
            log_level: self.log_level()?,
            max_workers: self.max_workers,
            cpu_profile: self.cpu_profile.clone(),
            runroot: self.runroot.clone(),
            runtime: self.runtime.clone(),
            syslog: self.syslog,
        })
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a process in a running container
    #[command(
        after_help = "\
EXAMPLES:
    berth exec -it web sh
    berth exec --user 1000 --workdir /srv web ls -l
    berth exec --latest cat /etc/os-release"
    )]
    Exec(ExecArgs),

    /// Show help for berth or one of its commands
    Help {
        /// Command path, e.g. `system info`
        command: Vec<String>,
    },

    /// Generate shell completion scripts
    #[command(
        long_about = "Generate shell completion scripts.\n\n\
            Writes a completion script for the given shell to stdout.",
        after_help = "\
EXAMPLES:
    # Bash
    berth completion bash > /etc/bash_completion.d/berth

    # Zsh
    berth completion zsh > \"${fpath[1]}/_berth\"

    # Fish
    berth completion fish > ~/.config/fish/completions/berth.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Answer a completion request from a shell
    #[command(name = "__complete", hide = true)]
    ShellComplete {
        /// Words typed so far
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// Manage berth
    System {
        #[command(subcommand)]
        action: Option<SystemAction>,
    },

    /// Display version information
    Version,
}

/// `system` subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum SystemAction {
    /// Display information about the engines and this invocation
    Info,
}

/// Flags and arguments of `exec`.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecArgs {
    /// Set environment variables (KEY=value, or KEY to copy from the caller)
    #[arg(short = 'e', long = "env", value_name = "ENV")]
    pub env: Vec<String>,

    /// Keep STDIN open even if not attached
    #[arg(short, long)]
    pub interactive: bool,

    /// Act on the latest container created
    #[arg(short, long)]
    pub latest: bool,

    /// Give extended privileges to the process
    #[arg(long)]
    pub privileged: bool,

    /// Allocate a pseudo-TTY
    #[arg(short, long)]
    pub tty: bool,

    /// User to run as inside the container
    #[arg(short, long, value_name = "USER")]
    pub user: Option<String>,

    /// Pass N additional file descriptors to the process
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub preserve_fds: u32,

    /// Working directory inside the container
    #[arg(short, long, value_name = "DIR")]
    pub workdir: Option<String>,

    /// CONTAINER followed by COMMAND [ARG...]
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
