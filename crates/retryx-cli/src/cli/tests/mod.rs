//! CLI parse tests, one file per group of subcommands.

use super::{Cli, CliCommand};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}

mod simulate;

#[test]
fn cli_parse_timeouts() {
    match parse(&["retryx", "timeouts"]) {
        CliCommand::Timeouts => {}
        _ => panic!("expected Timeouts"),
    }
}

#[test]
fn cli_parse_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["retryx", "timeouts", "--config", "/tmp/r.toml", "-v"]).unwrap();
    assert_eq!(
        cli.config.as_deref(),
        Some(std::path::Path::new("/tmp/r.toml"))
    );
    assert!(cli.verbose);
}

#[test]
fn cli_parse_completions() {
    match parse(&["retryx", "completions", "bash"]) {
        CliCommand::Completions { shell } => assert_eq!(shell, clap_complete::Shell::Bash),
        _ => panic!("expected Completions"),
    }
}

#[test]
fn cli_rejects_unknown_subcommand() {
    assert!(Cli::try_parse_from(["retryx", "download"]).is_err());
}

#[test]
fn load_config_reports_missing_file() {
    let missing = std::path::Path::new("/nonexistent/retryx/config.toml");
    assert!(super::load_config(Some(missing)).is_err());
}
