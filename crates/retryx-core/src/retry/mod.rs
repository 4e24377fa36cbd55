//! Retry executor.
//!
//! This module runs caller-supplied work and decides after each failure
//! whether to try again: the failure is classified (caller predicate,
//! registered hooks, auto-trace rule), the time budget is checked, and the
//! thread sleeps for an exponential backoff with jitter before the next
//! attempt. Attempts, timeouts and auto-trace retries are counted in
//! [`crate::metrics`].

mod classify;
mod helper;
mod options;
mod policy;
mod run;

pub use classify::{RetryHook, AUTO_TRACE_PREFIX};
pub use helper::{RetryHelper, RetryHelperBuilder};
pub use options::{
    Attempt, AttemptOutcome, ErrorPredicate, Options, RetryListener, TraceIdConsumer,
};
pub use policy::{BackoffPolicy, DefaultTimeouts, StopPolicy};
