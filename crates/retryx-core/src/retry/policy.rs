use rand::Rng;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::action::ActionKind;

/// Exponential backoff with a cap, plus uniform random jitter.
///
/// The exponential part is `2^attempt` milliseconds (attempt is 1-based),
/// capped at `max_wait`. Jitter in `[0, jitter]` is added to every wait so
/// that concurrent callers contending for the same resource spread out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_wait: Duration,
    jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_secs(5),
            jitter: Duration::from_millis(50),
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_wait: Duration, jitter: Duration) -> Self {
        Self { max_wait, jitter }
    }

    /// Cap on the exponential part.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Ceiling of the random jitter.
    pub fn jitter(&self) -> Duration {
        self.jitter
    }

    /// Deterministic exponential part of the wait after `attempt` failed.
    pub fn exponential(&self, attempt: u32) -> Duration {
        let millis = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(millis).min(self.max_wait)
    }

    /// Full wait after `attempt` failed: exponential part plus jitter.
    pub fn wait(&self, attempt: u32) -> Duration {
        let ceiling = u64::try_from(self.jitter.as_micros()).unwrap_or(u64::MAX);
        let jitter = Duration::from_micros(rand::thread_rng().gen_range(0..=ceiling));
        self.exponential(attempt) + jitter
    }
}

/// Gives up once the time spent since the first attempt reaches the deadline.
///
/// There is no attempt limit: any number of fast failures may fit in the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    deadline: Duration,
}

impl StopPolicy {
    pub fn after(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn should_stop(&self, elapsed: Duration) -> bool {
        elapsed >= self.deadline
    }
}

/// Timeout per action kind, resolved once from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultTimeouts {
    by_kind: BTreeMap<ActionKind, Duration>,
}

impl DefaultTimeouts {
    /// Every kind missing from `overrides` gets `fallback`.
    pub fn new(fallback: Duration, overrides: BTreeMap<ActionKind, Duration>) -> Self {
        let by_kind = ActionKind::ALL
            .into_iter()
            .map(|kind| (kind, overrides.get(&kind).copied().unwrap_or(fallback)))
            .collect();
        Self { by_kind }
    }

    pub fn get(&self, kind: ActionKind) -> Duration {
        self.by_kind.get(&kind).copied().unwrap_or_default()
    }

    /// All kinds with their timeouts, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, Duration)> + '_ {
        self.by_kind.iter().map(|(k, d)| (*k, *d))
    }
}

impl Default for DefaultTimeouts {
    fn default() -> Self {
        Self::new(Duration::from_secs(20), BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = BackoffPolicy::new(Duration::from_millis(100), Duration::ZERO);
        assert_eq!(p.exponential(1), Duration::from_millis(2));
        assert_eq!(p.exponential(2), Duration::from_millis(4));
        assert_eq!(p.exponential(6), Duration::from_millis(64));
        assert_eq!(p.exponential(7), Duration::from_millis(100));
        assert_eq!(p.exponential(200), Duration::from_millis(100));

        let mut last = Duration::ZERO;
        for attempt in 1..40 {
            let d = p.exponential(attempt);
            assert!(d >= last);
            last = d;
        }
    }

    #[test]
    fn wait_stays_within_cap_plus_jitter() {
        let p = BackoffPolicy::new(Duration::from_millis(8), Duration::from_millis(50));
        for attempt in 1..20 {
            let d = p.wait(attempt);
            assert!(d >= p.exponential(attempt));
            assert!(d <= p.max_wait() + p.jitter());
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let p = BackoffPolicy::new(Duration::from_secs(5), Duration::ZERO);
        assert_eq!(p.wait(3), Duration::from_millis(8));
    }

    #[test]
    fn stop_is_time_based() {
        let s = StopPolicy::after(Duration::from_millis(10));
        assert!(!s.should_stop(Duration::from_millis(9)));
        assert!(s.should_stop(Duration::from_millis(10)));
        assert!(s.should_stop(Duration::from_secs(1)));
    }

    #[test]
    fn default_timeouts_fall_back() {
        let mut overrides = BTreeMap::new();
        overrides.insert(ActionKind::IndexQuery, Duration::from_secs(2));
        let t = DefaultTimeouts::new(Duration::from_secs(20), overrides);
        assert_eq!(t.get(ActionKind::IndexQuery), Duration::from_secs(2));
        assert_eq!(t.get(ActionKind::ChangeUpdate), Duration::from_secs(20));
        assert_eq!(t.iter().count(), ActionKind::ALL.len());
    }
}
