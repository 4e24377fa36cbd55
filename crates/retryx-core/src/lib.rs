//! Retry executor with layered failure classification, auto-trace retries
//! and per-action metrics.

pub mod action;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod trace;
pub mod update;
