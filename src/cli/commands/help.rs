//! help command - Show help for berth or one of its commands

use crate::cli::args::Cli;
use anyhow::{bail, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

/// Print help for the command at `path` (empty for the top level).
pub fn help(path: &[String]) -> Result<()> {
    let root = Cli::command();
    let mut target = &root;
    for name in path {
        match target.find_subcommand(name) {
            Some(sub) if !sub.is_hide_set() => target = sub,
            _ => bail!("unrecognized command `berth help {}`", path.join(" ")),
        }
    }

    let argv = std::iter::once("berth")
        .chain(path.iter().map(String::as_str))
        .chain(std::iter::once("--help"));
    match Cli::try_parse_from(argv) {
        Err(e) if e.kind() == ErrorKind::DisplayHelp => {
            e.print()?;
            Ok(())
        }
        Err(e) => Err(e.into()),
        Ok(_) => bail!("unable to render help for `{}`", path.join(" ")),
    }
}
