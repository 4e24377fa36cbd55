//! Transactional updates run through the retry helper.
//!
//! An update action receives an [`UpdateFactory`], reads the refs it needs,
//! and commits a [`BatchUpdate`] of compare-and-set changes. When another
//! writer got there first the batch fails with [`LockFailure`];
//! [`RetryHelper::execute_update`] treats that as transient and runs the
//! whole action again, so the action must be safe to repeat.

mod error;
mod memory;

use std::sync::Arc;

use crate::action::ActionKind;
use crate::retry::{Options, RetryHelper};

pub use error::{is_lock_failure, LockFailure, UpdateError};
pub use memory::MemoryRefStore;

/// One compare-and-set: `name` moves from `expected` (None = absent) to `new_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: String,
    pub expected: Option<String>,
    pub new_value: String,
}

impl RefUpdate {
    /// Create `name`, which must not exist yet.
    pub fn create(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: None,
            new_value: value.into(),
        }
    }

    pub fn compare_and_set(
        name: impl Into<String>,
        expected: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            expected: Some(expected.into()),
            new_value: new_value.into(),
        }
    }
}

/// A set of ref updates applied all-or-nothing.
pub trait BatchUpdate {
    fn add(&mut self, update: RefUpdate);

    fn execute(self: Box<Self>) -> Result<(), UpdateError>;
}

/// Storage an update action works against.
pub trait UpdateFactory: Send + Sync {
    fn read_ref(&self, name: &str) -> Result<Option<String>, UpdateError>;

    fn create(&self) -> Box<dyn BatchUpdate + '_>;
}

impl RetryHelper {
    /// [`execute_update`](Self::execute_update) with default options.
    pub fn execute_update_with_defaults<T, A>(&self, action: A) -> Result<T, UpdateError>
    where
        A: FnMut(&dyn UpdateFactory) -> Result<T, UpdateError>,
    {
        self.execute_update(action, &Options::default())
    }

    /// Run `action` as a [`ActionKind::ChangeUpdate`], retrying it while it
    /// fails with a [`LockFailure`] and time remains.
    pub fn execute_update<T, A>(&self, mut action: A, opts: &Options) -> Result<T, UpdateError>
    where
        A: FnMut(&dyn UpdateFactory) -> Result<T, UpdateError>,
    {
        let factory: Arc<dyn UpdateFactory> = match &self.update_factory {
            Some(factory) => Arc::clone(factory),
            None => return Err(UpdateError::failed("no update factory configured")),
        };
        self.execute(
            ActionKind::ChangeUpdate,
            || action(factory.as_ref()).map_err(anyhow::Error::from),
            opts,
            is_lock_failure,
        )
        .map_err(error::into_update_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::metrics::{InMemoryMetrics, MetricKey, ATTEMPT_COUNT};

    fn helper(store: &Arc<MemoryRefStore>, sink: &InMemoryMetrics) -> RetryHelper {
        let config = RetryConfig {
            max_wait_secs: 0.001,
            jitter_millis: 0,
            ..RetryConfig::default()
        };
        RetryHelper::builder(&config)
            .metrics(sink)
            .update_factory(Arc::clone(store) as Arc<dyn UpdateFactory>)
            .build()
            .unwrap()
    }

    #[test]
    fn lock_failures_are_retried() {
        let store = Arc::new(MemoryRefStore::new());
        let sink = InMemoryMetrics::new();
        let helper = helper(&store, &sink);
        let mut calls = 0;
        let value = helper
            .execute_update_with_defaults(|factory| {
                calls += 1;
                if calls < 3 {
                    return Err(LockFailure {
                        ref_name: "refs/meta".to_string(),
                        message: "busy".to_string(),
                    }
                    .into());
                }
                let mut batch = factory.create();
                batch.add(RefUpdate::create("refs/meta", "v1"));
                batch.execute()?;
                Ok(calls)
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(store.read_ref("refs/meta").unwrap().as_deref(), Some("v1"));
        assert_eq!(
            sink.get(
                ATTEMPT_COUNT.name,
                &MetricKey::action(ActionKind::ChangeUpdate)
            ),
            2
        );
    }

    #[test]
    fn other_failures_are_not_retried() {
        let store = Arc::new(MemoryRefStore::new());
        let sink = InMemoryMetrics::new();
        let helper = helper(&store, &sink);
        let mut calls = 0;
        let err = helper
            .execute_update_with_defaults(|_| -> Result<(), UpdateError> {
                calls += 1;
                Err(UpdateError::failed("invalid change"))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        match err {
            UpdateError::Failed(inner) => assert_eq!(inner.to_string(), "invalid change"),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(sink.snapshot().is_empty());
    }

    #[test]
    fn lock_failure_until_timeout_surfaces_lock_failure() {
        let store = Arc::new(MemoryRefStore::new());
        let sink = InMemoryMetrics::new();
        let helper = helper(&store, &sink);
        let opts = Options::new().with_timeout(std::time::Duration::from_millis(20));
        let err = helper
            .execute_update(
                |factory| -> Result<(), UpdateError> {
                    let mut batch = factory.create();
                    batch.add(RefUpdate::compare_and_set("refs/x", "never", "1"));
                    batch.execute()
                },
                &opts,
            )
            .unwrap_err();
        assert!(matches!(err, UpdateError::LockFailure(ref l) if l.ref_name == "refs/x"));
        assert!(store.lock_failures() > 1);
    }

    #[test]
    fn missing_factory_fails_without_running_action() {
        let helper = RetryHelper::new(&RetryConfig::default()).unwrap();
        let mut calls = 0;
        let err = helper
            .execute_update_with_defaults(|_| -> Result<(), UpdateError> {
                calls += 1;
                Ok(())
            })
            .unwrap_err();
        assert_eq!(calls, 0);
        assert!(matches!(err, UpdateError::Failed(_)));
    }
}
