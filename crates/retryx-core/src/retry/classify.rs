//! Decide whether a failed attempt should be retried.
//!
//! Three layers are consulted in order, each only if the previous one said
//! no: the caller's transient predicate, the registered [`RetryHook`]s, and
//! the auto-trace rule that retries a non-recoverable failure once with
//! tracing forced on.

use std::sync::Arc;

use crate::action::ActionKind;
use crate::metrics::{RetryMetrics, UNKNOWN_CALLER};
use crate::trace::{RequestId, TagKind, TraceScope};

use super::options::Options;

/// Extension point that may declare additional errors retryable.
///
/// Hooks are queried read-only, in registration order, and should be cheap.
pub trait RetryHook: Send + Sync {
    fn should_retry(&self, err: &anyhow::Error) -> bool;
}

impl<F> RetryHook for F
where
    F: Fn(&anyhow::Error) -> bool + Send + Sync,
{
    fn should_retry(&self, err: &anyhow::Error) -> bool {
        self(err)
    }
}

/// Prefix of trace ids generated for auto-trace retries.
pub const AUTO_TRACE_PREFIX: &str = "retry-on-failure-";

/// Classification inputs for one call.
pub(crate) struct Classifier<'a, P> {
    pub(crate) kind: ActionKind,
    pub(crate) is_transient: &'a P,
    pub(crate) hooks: &'a [Arc<dyn RetryHook>],
    pub(crate) retry_with_trace_on_failure: bool,
    pub(crate) opts: &'a Options,
    pub(crate) metrics: &'a RetryMetrics,
}

impl<P> Classifier<'_, P>
where
    P: Fn(&anyhow::Error) -> bool,
{
    /// `true` if `err` should be retried. May force tracing on `scope`.
    pub(crate) fn should_retry(&self, err: &anyhow::Error, scope: &mut TraceScope) -> bool {
        // Known temporary conditions (e.g. lock failures); a retry is likely to succeed.
        if (self.is_transient)(err) {
            return true;
        }

        if self.hooks.iter().any(|h| h.should_retry(err)) {
            return true;
        }

        self.auto_trace(err, scope)
    }

    fn auto_trace(&self, err: &anyhow::Error, scope: &mut TraceScope) -> bool {
        if !self.retry_with_trace_on_failure {
            return false;
        }
        let matches = self
            .opts
            .retry_with_trace
            .as_ref()
            .is_some_and(|predicate| predicate(err));
        if !matches {
            return false;
        }

        let caller = self.opts.caller().unwrap_or(UNKNOWN_CALLER);
        if !scope.is_tracing() {
            let trace_id = format!("{}{}", AUTO_TRACE_PREFIX, RequestId::generate());
            scope.add_tag(TagKind::TraceId, trace_id.as_str()).force_logging();
            if let Some(on_auto_trace) = &self.opts.on_auto_trace {
                on_auto_trace(&trace_id);
            }
            let error = format!("{:#}", err);
            tracing::debug!(
                action = %self.kind,
                %trace_id,
                %error,
                "auto-retry: {} failed, retry with tracing enabled",
                caller
            );
            self.metrics.record_auto_retry(self.kind, caller);
            return true;
        }

        // Already retried with tracing and it failed again; log so the two
        // failures can be compared.
        let error = format!("{:#}", err);
        tracing::debug!(
            action = %self.kind,
            %error,
            "auto-retry: auto-retry of {} has failed",
            caller
        );
        self.metrics.record_auto_retry_failure(self.kind, caller);
        false
    }
}
