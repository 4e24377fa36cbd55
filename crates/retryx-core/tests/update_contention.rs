//! Integration test: concurrent writers contend for one ref.
//!
//! Every writer reads the counter ref and compare-and-sets it to the next
//! value. Losers see a lock failure and are retried by the helper, so in the
//! end no increment is lost.

use std::sync::Arc;

use retryx_core::action::ActionKind;
use retryx_core::config::RetryConfig;
use retryx_core::metrics::{InMemoryMetrics, MetricKey, ATTEMPT_COUNT, TIMEOUT_COUNT};
use retryx_core::retry::RetryHelper;
use retryx_core::update::{MemoryRefStore, RefUpdate, UpdateError, UpdateFactory};

const COUNTER: &str = "refs/meta/counter";

fn increment(factory: &dyn UpdateFactory) -> Result<u64, UpdateError> {
    let current = factory.read_ref(COUNTER)?;
    let next = match &current {
        Some(v) => v.parse::<u64>().map_err(UpdateError::failed)? + 1,
        None => 1,
    };
    let mut batch = factory.create();
    batch.add(RefUpdate {
        name: COUNTER.to_string(),
        expected: current,
        new_value: next.to_string(),
    });
    batch.execute()?;
    Ok(next)
}

#[test]
fn concurrent_writers_lose_no_updates() {
    let store = Arc::new(MemoryRefStore::new());
    let sink = InMemoryMetrics::new();
    let config = RetryConfig {
        max_wait_secs: 0.002,
        jitter_millis: 2,
        ..RetryConfig::default()
    };
    let helper = RetryHelper::builder(&config)
        .metrics(&sink)
        .update_factory(Arc::clone(&store) as Arc<dyn UpdateFactory>)
        .build()
        .unwrap();

    const WRITERS: usize = 8;
    const UPDATES: usize = 25;
    std::thread::scope(|s| {
        for _ in 0..WRITERS {
            let helper = &helper;
            s.spawn(move || {
                for _ in 0..UPDATES {
                    helper.execute_update_with_defaults(increment).unwrap();
                }
            });
        }
    });

    let total = (WRITERS * UPDATES) as u64;
    assert_eq!(
        store.read_ref(COUNTER).unwrap().as_deref(),
        Some(total.to_string().as_str())
    );
    // Every rejected batch cost exactly one retry.
    assert_eq!(
        sink.get(
            ATTEMPT_COUNT.name,
            &MetricKey::action(ActionKind::ChangeUpdate)
        ),
        store.lock_failures()
    );
    assert_eq!(sink.total(TIMEOUT_COUNT.name), 0);
}
