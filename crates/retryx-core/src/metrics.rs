//! Counters recorded by the retry helper.
//!
//! The helper only ever increments counters; where they end up is decided
//! by the [`MetricMaker`] it is built with. [`InMemoryMetrics`] keeps
//! totals in process (tests, the CLI) and [`NoopMetrics`] drops them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::action::ActionKind;

/// Label used for auto-retry metrics when a call names no caller.
pub const UNKNOWN_CALLER: &str = "N/A";

/// Static description of a counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: &'static str,
    /// Names of the label dimensions, e.g. `["action_type"]`.
    pub fields: &'static [&'static str],
}

/// Label values of one counter cell.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MetricKey {
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl MetricKey {
    pub fn action(action: ActionKind) -> Self {
        Self {
            action,
            operation: None,
        }
    }

    pub fn operation(action: ActionKind, operation: impl Into<String>) -> Self {
        Self {
            action,
            operation: Some(operation.into()),
        }
    }
}

/// Monotonic counter. Must be safe to increment from many threads.
pub trait Counter: Send + Sync {
    fn increment_by(&self, key: &MetricKey, n: u64);

    fn increment(&self, key: &MetricKey) {
        self.increment_by(key, 1);
    }
}

/// Creates counters for a metrics backend.
pub trait MetricMaker: Send + Sync {
    fn new_counter(&self, descriptor: &Descriptor) -> Arc<dyn Counter>;
}

pub const ATTEMPT_COUNT: Descriptor = Descriptor {
    name: "action/retry_attempt_count",
    description: "Number of retry attempts made to execute an action (0 == single attempt, no retry)",
    unit: "attempts",
    fields: &["action_type"],
};

pub const TIMEOUT_COUNT: Descriptor = Descriptor {
    name: "action/retry_timeout_count",
    description: "Number of action executions that ultimately timed out",
    unit: "timeouts",
    fields: &["action_type"],
};

pub const AUTO_RETRY_COUNT: Descriptor = Descriptor {
    name: "action/auto_retry_count",
    description: "Number of automatic retries with tracing",
    unit: "retries",
    fields: &["action_type", "operation_name"],
};

pub const AUTO_RETRY_FAILURE_COUNT: Descriptor = Descriptor {
    name: "action/failures_on_auto_retry_count",
    description: "Number of failures on auto retry",
    unit: "failures",
    fields: &["action_type", "operation_name"],
};

/// The four counters the retry helper records.
#[derive(Clone)]
pub struct RetryMetrics {
    attempts: Arc<dyn Counter>,
    timeouts: Arc<dyn Counter>,
    auto_retries: Arc<dyn Counter>,
    auto_retry_failures: Arc<dyn Counter>,
}

impl RetryMetrics {
    pub fn new(maker: &dyn MetricMaker) -> Self {
        Self {
            attempts: maker.new_counter(&ATTEMPT_COUNT),
            timeouts: maker.new_counter(&TIMEOUT_COUNT),
            auto_retries: maker.new_counter(&AUTO_RETRY_COUNT),
            auto_retry_failures: maker.new_counter(&AUTO_RETRY_FAILURE_COUNT),
        }
    }

    /// Add `retries` (attempts beyond the first) for `action`.
    pub fn record_retries(&self, action: ActionKind, retries: u64) {
        if retries > 0 {
            self.attempts.increment_by(&MetricKey::action(action), retries);
        }
    }

    pub fn record_timeout(&self, action: ActionKind) {
        self.timeouts.increment(&MetricKey::action(action));
    }

    pub fn record_auto_retry(&self, action: ActionKind, caller: &str) {
        self.auto_retries
            .increment(&MetricKey::operation(action, caller));
    }

    pub fn record_auto_retry_failure(&self, action: ActionKind, caller: &str) {
        self.auto_retry_failures
            .increment(&MetricKey::operation(action, caller));
    }
}

impl Default for RetryMetrics {
    fn default() -> Self {
        Self::new(&NoopMetrics)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

struct NoopCounter;

impl Counter for NoopCounter {
    fn increment_by(&self, _key: &MetricKey, _n: u64) {}
}

impl MetricMaker for NoopMetrics {
    fn new_counter(&self, _descriptor: &Descriptor) -> Arc<dyn Counter> {
        Arc::new(NoopCounter)
    }
}

/// One counter cell in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSample {
    pub name: &'static str,
    #[serde(flatten)]
    pub key: MetricKey,
    pub value: u64,
}

type Cells = BTreeMap<(&'static str, MetricKey), u64>;

/// Keeps counter totals in memory. Clones share the same totals.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    cells: Arc<Mutex<Cells>>,
}

// A panic while holding the lock cannot leave a half-written u64 behind, so
// a poisoned map is still usable; recording stays best effort.
fn lock(cells: &Mutex<Cells>) -> MutexGuard<'_, Cells> {
    cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of one cell (0 if never incremented).
    pub fn get(&self, name: &str, key: &MetricKey) -> u64 {
        lock(&self.cells)
            .iter()
            .find(|((n, k), _)| *n == name && k == key)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Sum of all cells of one counter.
    pub fn total(&self, name: &str) -> u64 {
        lock(&self.cells)
            .iter()
            .filter(|((n, _), _)| *n == name)
            .map(|(_, v)| *v)
            .sum()
    }

    /// All non-zero cells, ordered by counter name then labels.
    pub fn snapshot(&self) -> Vec<MetricSample> {
        lock(&self.cells)
            .iter()
            .map(|((name, key), value)| MetricSample {
                name: *name,
                key: key.clone(),
                value: *value,
            })
            .collect()
    }
}

struct InMemoryCounter {
    name: &'static str,
    cells: Arc<Mutex<Cells>>,
}

impl Counter for InMemoryCounter {
    fn increment_by(&self, key: &MetricKey, n: u64) {
        let mut cells = lock(&self.cells);
        let cell = cells.entry((self.name, key.clone())).or_insert(0);
        *cell = cell.saturating_add(n);
    }
}

impl MetricMaker for InMemoryMetrics {
    fn new_counter(&self, descriptor: &Descriptor) -> Arc<dyn Counter> {
        Arc::new(InMemoryCounter {
            name: descriptor.name,
            cells: Arc::clone(&self.cells),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_counts_per_key() {
        let sink = InMemoryMetrics::new();
        let metrics = RetryMetrics::new(&sink);
        metrics.record_retries(ActionKind::ChangeUpdate, 3);
        metrics.record_retries(ActionKind::ChangeUpdate, 2);
        metrics.record_retries(ActionKind::IndexQuery, 0);
        metrics.record_timeout(ActionKind::GroupUpdate);
        metrics.record_auto_retry(ActionKind::RestRequest, "submit");

        assert_eq!(
            sink.get(ATTEMPT_COUNT.name, &MetricKey::action(ActionKind::ChangeUpdate)),
            5
        );
        assert_eq!(
            sink.get(ATTEMPT_COUNT.name, &MetricKey::action(ActionKind::IndexQuery)),
            0
        );
        assert_eq!(sink.total(TIMEOUT_COUNT.name), 1);
        assert_eq!(
            sink.get(
                AUTO_RETRY_COUNT.name,
                &MetricKey::operation(ActionKind::RestRequest, "submit")
            ),
            1
        );
        assert_eq!(sink.snapshot().len(), 3);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let sink = InMemoryMetrics::new();
        let metrics = RetryMetrics::new(&sink);
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        metrics.record_timeout(ActionKind::AccountUpdate);
                    }
                });
            }
        });
        assert_eq!(sink.total(TIMEOUT_COUNT.name), 4000);
    }

    #[test]
    fn snapshot_serializes_labels() {
        let sink = InMemoryMetrics::new();
        RetryMetrics::new(&sink).record_auto_retry_failure(ActionKind::ChangeUpdate, UNKNOWN_CALLER);
        let json = serde_json::to_value(sink.snapshot()).unwrap();
        assert_eq!(json[0]["name"], "action/failures_on_auto_retry_count");
        assert_eq!(json[0]["action"], "change_update");
        assert_eq!(json[0]["operation"], "N/A");
        assert_eq!(json[0]["value"], 1);
    }
}
