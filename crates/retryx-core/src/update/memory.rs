//! In-memory ref store with compare-and-set batches.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::error::{LockFailure, UpdateError};
use super::{BatchUpdate, RefUpdate, UpdateFactory};

/// Thread-safe map of ref name to value. A batch applies only if every
/// expected value still matches; otherwise it fails with [`LockFailure`]
/// and changes nothing.
#[derive(Debug, Default)]
pub struct MemoryRefStore {
    refs: Mutex<BTreeMap<String, String>>,
    lock_failures: AtomicU64,
}

impl MemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches rejected so far.
    pub fn lock_failures(&self) -> u64 {
        self.lock_failures.load(Ordering::Relaxed)
    }

    fn refs(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.refs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UpdateFactory for MemoryRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<String>, UpdateError> {
        Ok(self.refs().get(name).cloned())
    }

    fn create(&self) -> Box<dyn BatchUpdate + '_> {
        Box::new(MemoryBatch {
            store: self,
            updates: Vec::new(),
        })
    }
}

struct MemoryBatch<'a> {
    store: &'a MemoryRefStore,
    updates: Vec<RefUpdate>,
}

impl BatchUpdate for MemoryBatch<'_> {
    fn add(&mut self, update: RefUpdate) {
        self.updates.push(update);
    }

    fn execute(self: Box<Self>) -> Result<(), UpdateError> {
        let MemoryBatch { store, updates } = *self;
        let mut refs = store.refs();
        for u in &updates {
            let current = refs.get(&u.name);
            if current != u.expected.as_ref() {
                store.lock_failures.fetch_add(1, Ordering::Relaxed);
                return Err(LockFailure {
                    ref_name: u.name.clone(),
                    message: format!("expected {:?}, found {:?}", u.expected, current),
                }
                .into());
            }
        }
        for u in updates {
            refs.insert(u.name, u.new_value);
        }
        Ok(())
    }
}
