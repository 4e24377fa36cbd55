//! The retry helper: runs actions with classification, backoff and metrics.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::action::ActionKind;
use crate::config::{ConfigError, RetryConfig};
use crate::metrics::{MetricMaker, RetryMetrics};
use crate::update::UpdateFactory;

use super::classify::{Classifier, RetryHook};
use super::options::Options;
use super::policy::{BackoffPolicy, DefaultTimeouts, StopPolicy};
use super::run::{run_with_retry, CallState, Failure};

/// Executes actions, retrying transient failures until their time budget
/// runs out.
///
/// One helper is built at startup and shared (it is `Send + Sync`); every
/// call keeps its own attempt count and trace scope, so concurrent calls
/// never see each other's state.
pub struct RetryHelper {
    metrics: RetryMetrics,
    hooks: Vec<Arc<dyn RetryHook>>,
    default_timeouts: DefaultTimeouts,
    backoff: BackoffPolicy,
    retry_with_trace_on_failure: bool,
    pub(crate) update_factory: Option<Arc<dyn UpdateFactory>>,
}

/// Collects the collaborators of a [`RetryHelper`].
pub struct RetryHelperBuilder {
    config: RetryConfig,
    metrics: RetryMetrics,
    hooks: Vec<Arc<dyn RetryHook>>,
    update_factory: Option<Arc<dyn UpdateFactory>>,
}

impl RetryHelperBuilder {
    /// Record counters through `maker` (default: discard them).
    pub fn metrics(mut self, maker: &dyn MetricMaker) -> Self {
        self.metrics = RetryMetrics::new(maker);
        self
    }

    /// Register a hook; hooks are consulted in registration order.
    pub fn hook(mut self, hook: impl RetryHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Applier used by [`RetryHelper::execute_update`].
    pub fn update_factory(mut self, factory: Arc<dyn UpdateFactory>) -> Self {
        self.update_factory = Some(factory);
        self
    }

    /// Resolve timeouts and backoff from the configuration.
    pub fn build(self) -> Result<RetryHelper, ConfigError> {
        let default_timeouts = self.config.default_timeouts()?;
        let backoff = self.config.backoff()?;
        tracing::debug!(
            hooks = self.hooks.len(),
            retry_with_trace_on_failure = self.config.retry_with_trace_on_failure,
            "retry helper configured"
        );
        Ok(RetryHelper {
            metrics: self.metrics,
            hooks: self.hooks,
            default_timeouts,
            backoff,
            retry_with_trace_on_failure: self.config.retry_with_trace_on_failure,
            update_factory: self.update_factory,
        })
    }
}

impl RetryHelper {
    pub fn builder(config: &RetryConfig) -> RetryHelperBuilder {
        RetryHelperBuilder {
            config: config.clone(),
            metrics: RetryMetrics::default(),
            hooks: Vec::new(),
            update_factory: None,
        }
    }

    /// Helper without hooks, metrics or update factory.
    pub fn new(config: &RetryConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    pub fn default_timeout(&self, kind: ActionKind) -> Duration {
        self.default_timeouts.get(kind)
    }

    pub fn default_timeouts(&self) -> &DefaultTimeouts {
        &self.default_timeouts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// [`execute`](Self::execute) with default options.
    pub fn execute_with_defaults<T, W, P>(
        &self,
        kind: ActionKind,
        work: W,
        is_transient: P,
    ) -> anyhow::Result<T>
    where
        W: FnMut() -> anyhow::Result<T>,
        P: Fn(&anyhow::Error) -> bool,
    {
        self.execute(kind, work, &Options::default(), is_transient)
    }

    /// Run `work`, retrying failures that `is_transient`, a registered hook or
    /// the auto-trace rule accept, until the call's timeout elapses.
    ///
    /// The returned error is exactly the one the last attempt produced, whether
    /// it was rejected at once or kept failing until the deadline.
    pub fn execute<T, W, P>(
        &self,
        kind: ActionKind,
        work: W,
        opts: &Options,
        is_transient: P,
    ) -> anyhow::Result<T>
    where
        W: FnMut() -> anyhow::Result<T>,
        P: Fn(&anyhow::Error) -> bool,
    {
        let mut state = CallState::open(kind, &self.metrics);
        let classifier = Classifier {
            kind,
            is_transient: &is_transient,
            hooks: &self.hooks,
            retry_with_trace_on_failure: self.retry_with_trace_on_failure,
            opts,
            metrics: &self.metrics,
        };
        let timeout = opts.timeout.unwrap_or_else(|| self.default_timeout(kind));

        let result = run_with_retry(
            &mut state,
            &classifier,
            StopPolicy::after(timeout),
            &self.backoff,
            opts.listener.as_deref(),
            work,
        );
        match result {
            Ok(value) => Ok(value),
            Err(Failure::NotRetryable(err)) => Err(err),
            Err(Failure::TimedOut(err)) => {
                tracing::debug!(
                    attempts = state.attempts,
                    timeout_ms = timeout.as_millis() as u64,
                    "{} timed out",
                    kind
                );
                self.metrics.record_timeout(kind);
                Err(err)
            }
        }
    }
}

impl fmt::Debug for RetryHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryHelper")
            .field("hooks", &self.hooks.len())
            .field("default_timeouts", &self.default_timeouts)
            .field("backoff", &self.backoff)
            .field(
                "retry_with_trace_on_failure",
                &self.retry_with_trace_on_failure,
            )
            .field("update_factory", &self.update_factory.is_some())
            .finish()
    }
}
