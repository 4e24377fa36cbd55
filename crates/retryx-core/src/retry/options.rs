//! Per-call overrides for the retry helper.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one attempt, as seen by a [`RetryListener`].
#[derive(Debug)]
pub enum AttemptOutcome<'a> {
    Succeeded,
    Failed(&'a anyhow::Error),
}

/// One finished attempt.
#[derive(Debug)]
pub struct Attempt<'a> {
    /// 1-based attempt number.
    pub number: u32,
    /// Time since the first attempt started.
    pub delay_since_first: Duration,
    pub outcome: AttemptOutcome<'a>,
}

/// Notified after every attempt, successful or not.
pub trait RetryListener: Send + Sync {
    fn on_attempt(&self, attempt: &Attempt<'_>);
}

impl<F> RetryListener for F
where
    F: Fn(&Attempt<'_>) + Send + Sync,
{
    fn on_attempt(&self, attempt: &Attempt<'_>) {
        self(attempt)
    }
}

pub type ErrorPredicate = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;
pub type TraceIdConsumer = Arc<dyn Fn(&str) + Send + Sync>;

/// Overrides for a single call. Every field defaults to "use the helper's
/// default"; the helper never mutates an `Options`, so one value can be
/// shared by concurrent calls.
#[derive(Clone, Default)]
pub struct Options {
    pub(crate) listener: Option<Arc<dyn RetryListener>>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) caller: Option<String>,
    pub(crate) retry_with_trace: Option<ErrorPredicate>,
    pub(crate) on_auto_trace: Option<TraceIdConsumer>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listener(mut self, listener: impl RetryListener + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Time budget for this call instead of the action kind's default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Operation name used in auto-retry metrics and log lines.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Errors matching `predicate` are retried once with tracing forced on,
    /// when the helper has auto-trace retries enabled.
    pub fn with_retry_with_trace<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.retry_with_trace = Some(Arc::new(predicate));
        self
    }

    /// Called with the generated trace id when an auto-trace retry starts.
    pub fn with_on_auto_trace<C>(mut self, consumer: C) -> Self
    where
        C: Fn(&str) + Send + Sync + 'static,
    {
        self.on_auto_trace = Some(Arc::new(consumer));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("listener", &self.listener.is_some())
            .field("timeout", &self.timeout)
            .field("caller", &self.caller)
            .field("retry_with_trace", &self.retry_with_trace.is_some())
            .field("on_auto_trace", &self.on_auto_trace.is_some())
            .finish()
    }
}
