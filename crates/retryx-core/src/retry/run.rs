//! Retry loop: run a closure until success, a non-retryable failure, or the deadline.

use std::thread;
use std::time::Instant;

use crate::action::ActionKind;
use crate::metrics::RetryMetrics;
use crate::trace::TraceScope;

use super::classify::Classifier;
use super::options::{Attempt, AttemptOutcome, RetryListener};
use super::policy::{BackoffPolicy, StopPolicy};

/// Why the loop gave up. Both variants carry the last error unchanged.
#[derive(Debug)]
pub(crate) enum Failure {
    /// The classifier declined to retry.
    NotRetryable(anyhow::Error),
    /// Retryable, but the time budget is spent.
    TimedOut(anyhow::Error),
}

/// State owned by one call. Dropping it records how many retries the call
/// made and then closes the trace scope, whichever way the call ended.
pub(crate) struct CallState<'a> {
    kind: ActionKind,
    metrics: &'a RetryMetrics,
    pub(crate) scope: TraceScope,
    pub(crate) attempts: u32,
}

impl<'a> CallState<'a> {
    pub(crate) fn open(kind: ActionKind, metrics: &'a RetryMetrics) -> Self {
        Self {
            kind,
            metrics,
            scope: TraceScope::open(kind.as_str()),
            attempts: 1,
        }
    }
}

impl Drop for CallState<'_> {
    fn drop(&mut self) {
        if self.attempts > 1 {
            tracing::debug!("{} was attempted {} times", self.kind, self.attempts);
            self.metrics
                .record_retries(self.kind, u64::from(self.attempts - 1));
        }
    }
}

/// Runs `work` until it succeeds or must stop.
///
/// After each failure the classifier is asked first, then the stop policy;
/// only if both allow it does the thread sleep for the backoff and try again.
/// A result produced after the deadline is still returned.
pub(crate) fn run_with_retry<T, W, P>(
    state: &mut CallState<'_>,
    classifier: &Classifier<'_, P>,
    stop: StopPolicy,
    backoff: &BackoffPolicy,
    listener: Option<&dyn RetryListener>,
    mut work: W,
) -> Result<T, Failure>
where
    W: FnMut() -> anyhow::Result<T>,
    P: Fn(&anyhow::Error) -> bool,
{
    let span = state.scope.span().clone();
    let start = Instant::now();
    loop {
        // Entered per attempt so a filter sees tracing forced mid-call.
        let _entered = span.enter();
        let result = work();
        let elapsed = start.elapsed();

        if let Some(listener) = listener {
            let outcome = match &result {
                Ok(_) => AttemptOutcome::Succeeded,
                Err(e) => AttemptOutcome::Failed(e),
            };
            listener.on_attempt(&Attempt {
                number: state.attempts,
                delay_since_first: elapsed,
                outcome,
            });
        }

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !classifier.should_retry(&err, &mut state.scope) {
            return Err(Failure::NotRetryable(err));
        }
        if stop.should_stop(elapsed) {
            return Err(Failure::TimedOut(err));
        }

        let wait = backoff.wait(state.attempts);
        tracing::debug!(
            attempt = state.attempts,
            wait_ms = wait.as_millis() as u64,
            "attempt failed with retryable error: {:#}",
            err
        );
        thread::sleep(wait);
        state.attempts += 1;
    }
}
