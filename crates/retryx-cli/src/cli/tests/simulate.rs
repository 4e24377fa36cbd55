//! Tests for the simulate subcommand.

use super::parse;
use crate::cli::CliCommand;
use retryx_core::action::ActionKind;

#[test]
fn cli_parse_simulate_defaults() {
    match parse(&["retryx", "simulate"]) {
        CliCommand::Simulate {
            kind,
            failures,
            fatal,
            trace,
            caller,
            timeout_ms,
            json,
        } => {
            assert_eq!(kind, ActionKind::ChangeUpdate);
            assert_eq!(failures, 0);
            assert!(!fatal);
            assert!(!trace);
            assert!(caller.is_none());
            assert!(timeout_ms.is_none());
            assert!(!json);
        }
        _ => panic!("expected Simulate"),
    }
}

#[test]
fn cli_parse_simulate_all_flags() {
    match parse(&[
        "retryx",
        "simulate",
        "--kind",
        "INDEX_QUERY",
        "--failures",
        "3",
        "--fatal",
        "--trace",
        "--caller",
        "rest-api",
        "--timeout-ms",
        "250",
        "--json",
    ]) {
        CliCommand::Simulate {
            kind,
            failures,
            fatal,
            trace,
            caller,
            timeout_ms,
            json,
        } => {
            assert_eq!(kind, ActionKind::IndexQuery);
            assert_eq!(failures, 3);
            assert!(fatal);
            assert!(trace);
            assert_eq!(caller.as_deref(), Some("rest-api"));
            assert_eq!(timeout_ms, Some(250));
            assert!(json);
        }
        _ => panic!("expected Simulate with flags"),
    }
}

#[test]
fn cli_parse_simulate_rejects_unknown_kind() {
    use clap::Parser;
    assert!(crate::cli::Cli::try_parse_from(["retryx", "simulate", "--kind", "download"]).is_err());
}
