//! Shell completion generation and installation.

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use console::style;
use directories::BaseDirs;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Cli;

fn render(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    render(shell, &mut io::stdout());
}

/// Detect the user's shell from `$SHELL` (or PowerShell on Windows).
fn detect_shell_type() -> Option<Shell> {
    if let Ok(shell_path) = env::var("SHELL") {
        return shell_from_path(&shell_path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

fn shell_from_path(shell_path: &str) -> Option<Shell> {
    match Path::new(shell_path).file_name()?.to_str()? {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Where the completion script for `shell` is installed.
fn install_path(dirs: &BaseDirs, shell: Shell) -> Result<PathBuf> {
    let path = match shell {
        Shell::Bash => dirs
            .data_dir()
            .join("bash-completion/completions/blexfer"),
        Shell::Zsh => dirs.home_dir().join(".zfunc/_blexfer"),
        Shell::Fish => dirs
            .config_dir()
            .join("fish/completions/blexfer.fish"),
        Shell::Elvish => dirs.config_dir().join("elvish/lib/blexfer.elv"),
        Shell::PowerShell => dirs
            .config_dir()
            .join("powershell/completions/blexfer.ps1"),
        _ => anyhow::bail!("Unsupported shell for auto-install"),
    };
    Ok(path)
}

fn activation_hint(shell: Shell, path: &Path) -> String {
    match shell {
        Shell::Bash => format!("source {}", path.display()),
        Shell::Zsh => "add `fpath=(~/.zfunc $fpath)` to ~/.zshrc, then `exec zsh`".to_string(),
        Shell::PowerShell => format!("Import-Module {}", path.display()),
        _ => "open a new shell".to_string(),
    }
}

/// Install shell completions for `shell_arg` or the detected shell.
pub(crate) fn cmd_completions_install(shell_arg: Option<Shell>) -> Result<()> {
    let shell = match shell_arg {
        Some(s) => s,
        None => detect_shell_type().context(
            "Could not detect your shell. Please specify it explicitly:\n  \
             blexfer completions --install bash",
        )?,
    };

    let dirs = BaseDirs::new().context("Could not determine home directory")?;
    let path = install_path(&dirs, shell)?;

    let mut buf = Vec::new();
    render(shell, &mut buf);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(&path, &buf)
        .with_context(|| format!("Failed to write completion file: {}", path.display()))?;

    eprintln!(
        "{} Installed {} completions to {}",
        style("✓").green().bold(),
        style(shell).cyan(),
        style(path.display()).yellow()
    );
    eprintln!("To activate: {}", style(activation_hint(shell, &path)).cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_from_path() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("/usr/bin/elvish"), Some(Shell::Elvish));
        assert_eq!(shell_from_path("/usr/bin/pwsh"), Some(Shell::PowerShell));
        assert_eq!(shell_from_path("zsh"), Some(Shell::Zsh));
    }

    #[test]
    fn test_shell_from_path_unknown() {
        assert_eq!(shell_from_path("/usr/bin/tcsh"), None);
        assert_eq!(shell_from_path(""), None);
    }

    #[test]
    fn test_install_paths_use_binary_name() {
        let Some(dirs) = BaseDirs::new() else {
            return;
        };
        let bash = install_path(&dirs, Shell::Bash).unwrap();
        assert!(bash.ends_with("bash-completion/completions/blexfer"));
        let zsh = install_path(&dirs, Shell::Zsh).unwrap();
        assert!(zsh.ends_with(".zfunc/_blexfer"));
        let fish = install_path(&dirs, Shell::Fish).unwrap();
        assert!(fish.ends_with("fish/completions/blexfer.fish"));
    }

    #[test]
    fn test_render_mentions_subcommands() {
        let mut buf = Vec::new();
        render(Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("blexfer"));
        assert!(script.contains("send"));
        assert!(script.contains("list-ports"));
    }
}
