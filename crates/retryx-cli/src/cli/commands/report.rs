//! Shared output for commands that print metric snapshots.

use retryx_core::metrics::MetricSample;

pub(super) fn print_metrics(samples: &[MetricSample]) {
    if samples.is_empty() {
        println!("No metrics recorded.");
        return;
    }
    println!("{:<40} {:<16} {:<16} {:>6}", "METRIC", "ACTION", "OPERATION", "VALUE");
    for s in samples {
        println!(
            "{:<40} {:<16} {:<16} {:>6}",
            s.name,
            s.key.action,
            s.key.operation.as_deref().unwrap_or("-"),
            s.value
        );
    }
}
