//! `retryx simulate` – run one simulated action through the retry helper.

use anyhow::{Context, Result};
use retryx_core::action::ActionKind;
use retryx_core::config::RetryxConfig;
use retryx_core::metrics::{InMemoryMetrics, MetricSample};
use retryx_core::retry::{Attempt, AttemptOutcome, Options, RetryHelper};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::report::print_metrics;

/// Shape of the simulated action.
#[derive(Debug, Clone)]
pub struct Simulation {
    pub kind: ActionKind,
    /// Transient failures before the action succeeds (or fails fatally).
    pub failures: u32,
    pub fatal: bool,
    pub trace: bool,
    pub caller: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Retryable failure reported for the first `failures` attempts.
#[derive(Debug)]
struct SimulatedTransient {
    attempt: u32,
}

impl fmt::Display for SimulatedTransient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulated lock contention on attempt {}", self.attempt)
    }
}

impl std::error::Error for SimulatedTransient {}

/// Non-retryable failure reported once the transient ones are used up.
#[derive(Debug)]
struct SimulatedFatal {
    attempt: u32,
}

impl fmt::Display for SimulatedFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "simulated fatal failure on attempt {}", self.attempt)
    }
}

impl std::error::Error for SimulatedFatal {}

struct SimulationReport {
    kind: ActionKind,
    attempts: u32,
    outcome: Result<u32, String>,
    attempt_log: Vec<String>,
    trace_id: Option<String>,
    metrics: Vec<MetricSample>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn simulate(cfg: &RetryxConfig, sim: &Simulation) -> Result<SimulationReport> {
    let mut retry_cfg = cfg.retry.clone();
    if sim.trace {
        retry_cfg.retry_with_trace_on_failure = true;
    }
    let sink = InMemoryMetrics::new();
    let helper = RetryHelper::builder(&retry_cfg).metrics(&sink).build()?;

    let attempt_log = Arc::new(Mutex::new(Vec::new()));
    let trace_id = Arc::new(Mutex::new(None));

    let mut opts = Options::new().with_listener({
        let attempt_log = Arc::clone(&attempt_log);
        move |a: &Attempt<'_>| {
            let ms = a.delay_since_first.as_millis();
            let line = match &a.outcome {
                AttemptOutcome::Succeeded => format!("attempt {} succeeded at {}ms", a.number, ms),
                AttemptOutcome::Failed(e) => {
                    format!("attempt {} failed at {}ms: {:#}", a.number, ms, e)
                }
            };
            lock(&attempt_log).push(line);
        }
    });
    if let Some(caller) = &sim.caller {
        opts = opts.with_caller(caller.clone());
    }
    if let Some(ms) = sim.timeout_ms {
        opts = opts.with_timeout(Duration::from_millis(ms));
    }
    if sim.trace {
        let trace_id = Arc::clone(&trace_id);
        opts = opts
            .with_retry_with_trace(|e| e.is::<SimulatedFatal>())
            .with_on_auto_trace(move |id| *lock(&trace_id) = Some(id.to_string()));
    }

    let mut attempt = 0;
    let result = helper.execute(
        sim.kind,
        || {
            attempt += 1;
            if attempt <= sim.failures {
                Err(SimulatedTransient { attempt }.into())
            } else if sim.fatal {
                Err(SimulatedFatal { attempt }.into())
            } else {
                Ok(attempt)
            }
        },
        &opts,
        |e| e.is::<SimulatedTransient>(),
    );

    let attempt_log = lock(&attempt_log).clone();
    let trace_id = lock(&trace_id).clone();
    Ok(SimulationReport {
        kind: sim.kind,
        attempts: attempt,
        outcome: result.map_err(|e| format!("{:#}", e)),
        attempt_log,
        trace_id,
        metrics: sink.snapshot(),
    })
}

pub async fn run_simulate(cfg: &RetryxConfig, sim: Simulation, json: bool) -> Result<()> {
    let cfg = cfg.clone();
    let report = tokio::task::spawn_blocking(move || simulate(&cfg, &sim))
        .await
        .context("simulation task join")??;

    if json {
        let value = serde_json::json!({
            "action": report.kind.as_str(),
            "attempts": report.attempts,
            "succeeded": report.outcome.is_ok(),
            "error": report.outcome.as_ref().err(),
            "trace_id": report.trace_id,
            "attempt_log": report.attempt_log,
            "metrics": report.metrics,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match &report.outcome {
        Ok(_) => println!(
            "{}: succeeded after {} attempt(s)",
            report.kind, report.attempts
        ),
        Err(e) => println!(
            "{}: failed after {} attempt(s): {}",
            report.kind, report.attempts, e
        ),
    }
    for line in &report.attempt_log {
        println!("  {line}");
    }
    if let Some(id) = &report.trace_id {
        println!("auto-trace id: {id}");
    }
    print_metrics(&report.metrics);
    Ok(())
}
