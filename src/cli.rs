//! Command-line surface: parses the arguments a Pentecter session needs
//! and nothing else. There is no subcommand tree — one invocation runs
//! one session against one or more targets.

use std::path::PathBuf;

use clap::Parser;

/// Run an autonomous penetration-testing session against one or more targets.
#[derive(Debug, Parser)]
#[command(name = "pentecter", version, about)]
pub struct Cli {
    /// Target hosts to add before the session starts. Repeatable.
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// Path to a YAML config file, overriding the default
    /// `.pentecter/config.yaml` / `.pentecter/local.yaml` lookup.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Overrides the configured log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run with a scripted `MockBrain` instead of a real reasoning
    /// backend. The binary has no real `Brain` to fall back on, so this
    /// must be passed explicitly; omitting it is a startup error.
    #[arg(long)]
    pub dry_run: bool,

    /// Overrides `memory_dir` from config; `none` disables persistence.
    #[arg(long)]
    pub memory_dir: Option<PathBuf>,

    /// Approve every proposed command automatically instead of blocking
    /// on human approval.
    #[arg(long)]
    pub auto_approve: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_invocation() {
        let cli = Cli::parse_from(["pentecter", "10.0.0.1"]);
        assert_eq!(cli.targets, vec!["10.0.0.1".to_string()]);
        assert!(!cli.dry_run);
        assert!(!cli.auto_approve);
    }

    #[test]
    fn parses_multiple_targets_and_flags() {
        let cli = Cli::parse_from([
            "pentecter",
            "10.0.0.1",
            "10.0.0.2",
            "--dry-run",
            "--auto-approve",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.targets, vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()]);
        assert!(cli.dry_run);
        assert!(cli.auto_approve);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
