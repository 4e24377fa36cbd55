//! `retryx contend` – concurrent writers racing to bump one ref.

use anyhow::{Context, Result};
use retryx_core::config::RetryxConfig;
use retryx_core::metrics::{InMemoryMetrics, TIMEOUT_COUNT};
use retryx_core::retry::RetryHelper;
use retryx_core::update::{MemoryRefStore, RefUpdate, UpdateError, UpdateFactory};
use std::sync::Arc;
use std::time::Instant;

use super::report::print_metrics;

const COUNTER_REF: &str = "refs/meta/counter";

/// Read the counter and compare-and-set it to the next value.
fn increment(factory: &dyn UpdateFactory) -> Result<u64, UpdateError> {
    let current = factory.read_ref(COUNTER_REF)?;
    let next = match &current {
        Some(v) => {
            v.parse::<u64>()
                .map_err(|e| UpdateError::failed(format!("{COUNTER_REF} is not a number: {e}")))?
                + 1
        }
        None => 1,
    };
    let mut batch = factory.create();
    batch.add(RefUpdate {
        name: COUNTER_REF.to_string(),
        expected: current,
        new_value: next.to_string(),
    });
    batch.execute()?;
    Ok(next)
}

pub async fn run_contend(
    cfg: &RetryxConfig,
    writers: usize,
    updates: usize,
    json: bool,
) -> Result<()> {
    let store = Arc::new(MemoryRefStore::new());
    let sink = InMemoryMetrics::new();
    let helper = Arc::new(
        RetryHelper::builder(&cfg.retry)
            .metrics(&sink)
            .update_factory(Arc::clone(&store) as Arc<dyn UpdateFactory>)
            .build()?,
    );

    let started = Instant::now();
    let mut handles = Vec::with_capacity(writers);
    for writer in 0..writers {
        let helper = Arc::clone(&helper);
        handles.push(tokio::task::spawn_blocking(move || -> Result<()> {
            for _ in 0..updates {
                helper
                    .execute_update_with_defaults(increment)
                    .with_context(|| format!("writer {writer}"))?;
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.await.context("writer task join")??;
    }
    let elapsed = started.elapsed();

    let value = store
        .read_ref(COUNTER_REF)?
        .unwrap_or_else(|| "0".to_string());
    let samples = sink.snapshot();
    tracing::info!(
        writers,
        updates,
        lock_failures = store.lock_failures(),
        "contention run finished in {:?}",
        elapsed
    );

    if json {
        let report = serde_json::json!({
            "writers": writers,
            "updates_per_writer": updates,
            "final_value": value,
            "lock_failures": store.lock_failures(),
            "timeouts": sink.total(TIMEOUT_COUNT.name),
            "elapsed_ms": elapsed.as_millis() as u64,
            "metrics": samples,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{COUNTER_REF} = {value} (expected {}) after {:.2}s",
        writers * updates,
        elapsed.as_secs_f64()
    );
    println!("Rejected batches: {}", store.lock_failures());
    print_metrics(&samples);
    Ok(())
}
