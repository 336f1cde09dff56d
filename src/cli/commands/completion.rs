//! completion command - Generate shell completion scripts

use crate::cli::args::{Cli, Shell};
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{generate, shells};

/// Generate shell completion scripts.
pub fn completion(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        Shell::Bash => {
            generate(shells::Bash, &mut cmd, &name, &mut std::io::stdout());
        }
        Shell::Zsh => {
            generate(shells::Zsh, &mut cmd, &name, &mut std::io::stdout());
        }
        Shell::Fish => {
            generate(shells::Fish, &mut cmd, &name, &mut std::io::stdout());
        }
        Shell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, &name, &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Candidates for the last of `words`, given the words before it.
///
/// Subcommand names are offered while the path names a parent command;
/// long flags are offered when the partial word starts with `-`.
pub fn complete_words(words: &[String]) -> Vec<String> {
    let cmd = Cli::command();
    let (partial, path) = match words.split_last() {
        Some((last, path)) => (last.as_str(), path),
        None => ("", words),
    };

    let mut target = &cmd;
    for word in path {
        if word.starts_with('-') {
            continue;
        }
        match target.find_subcommand(word) {
            Some(sub) => target = sub,
            None => break,
        }
    }

    if partial.starts_with('-') {
        return target
            .get_arguments()
            .filter(|arg| !arg.is_hide_set())
            .filter_map(|arg| arg.get_long())
            .map(|long| format!("--{}", long))
            .filter(|flag| flag.starts_with(partial))
            .collect();
    }

    target
        .get_subcommands()
        .filter(|sub| !sub.is_hide_set())
        .map(|sub| sub.get_name().to_string())
        .filter(|name| name.starts_with(partial))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn top_level_names() {
        let names = complete_words(&words(&[""]));
        assert!(names.contains(&"exec".to_string()));
        assert!(names.contains(&"system".to_string()));
        assert!(!names.iter().any(|n| n == "__complete"));
    }

    #[test]
    fn prefix_and_nested() {
        assert_eq!(complete_words(&words(&["ve"])), vec!["version"]);
        assert_eq!(complete_words(&words(&["system", ""])), vec!["info"]);
    }

    #[test]
    fn exec_flags() {
        let flags = complete_words(&words(&["exec", "--pr"]));
        assert!(flags.contains(&"--privileged".to_string()));
        assert!(flags.contains(&"--preserve-fds".to_string()));
    }
}
