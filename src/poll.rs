//! Bounded polling for eventually-consistent Atlas operations.
//!
//! Many Atlas mutations are accepted before they are observable: a custom role
//! create can fail with a transient 500 while inherited roles propagate, a
//! deleted role keeps appearing for a few reads, a private endpoint takes
//! minutes to become `AVAILABLE`. [`StateConf`] turns such an operation into a
//! single awaitable call that returns once a caller-supplied probe reports a
//! terminal state, or fails once the time budget is spent.
//!
//! The loop is an explicit state machine. [`StateConf::transition`] is a pure
//! function from `(observed state, elapsed time)` to the next [`PollPhase`];
//! [`StateConf::wait`] drives it with an injected [`Clock`], so tests run with
//! a manual clock and never sleep.
//!
//! # Example
//!
//! ```ignore
//! use mongodbatlas_provider::poll::{Observation, StateConf, TokioClock};
//!
//! let conf = StateConf::new(&["deleting"], &["deleted"]).with_failure(&["failed"]);
//! conf.wait(&TokioClock, || async {
//!     match client.get_role(project_id, role_name).await {
//!         Err(e) if e.is_not_found() => Ok(Observation::new((), "deleted")),
//!         Err(e) => Err(e),
//!         Ok(_) => {
//!             client.delete_role(project_id, role_name).await?;
//!             Ok(Observation::new((), "deleting"))
//!         }
//!     }
//! })
//! .await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Default total budget for one poll operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default wait before the first probe.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(3);

/// Default minimum spacing between two probes.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(3);

/// Source of time for the poller.
///
/// Production code uses [`TokioClock`]; tests use
/// [`ManualClock`](crate::testing::ManualClock), whose `sleep` advances
/// virtual time instantly.
#[async_trait::async_trait]
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Suspend the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Timing of one poll operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total budget. Once exceeded while pending, the poll times out.
    pub timeout: Duration,
    /// Wait before the first probe.
    pub delay: Duration,
    /// Minimum spacing between two probes.
    pub min_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_DELAY,
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Create a config with default delays and the given timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Set the initial delay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the minimum spacing between probes.
    pub fn min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }
}

/// What one probe saw: a value and the state label it classified it as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation<T> {
    /// The probe's result. Only the value of the terminal observation is
    /// returned to the caller.
    pub value: T,
    /// The state label, matched against the pending/target/failure sets.
    pub state: String,
    /// Why the backend reports a failure state, when it says.
    pub detail: Option<String>,
}

impl<T> Observation<T> {
    /// Create an observation.
    pub fn new(value: T, state: impl Into<String>) -> Self {
        Self {
            value,
            state: state.into(),
            detail: None,
        }
    }

    /// Attach the backend's explanation, reported if the state is a failure.
    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }
}

/// Where the poll stands after an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPhase {
    /// Not converged yet; probe again after `retry_in`.
    Pending {
        /// How long to wait before the next probe.
        retry_in: Duration,
    },
    /// Reached a target state.
    Success,
    /// Reached a failure state.
    Failure,
    /// Still pending but the budget is spent.
    TimedOut,
    /// The state belongs to none of the configured sets.
    Unexpected,
}

/// Errors returned by [`StateConf::wait`].
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The probe returned an error. It is passed through untouched.
    #[error(transparent)]
    Probe(E),

    /// The probe reported a failure state without an error of its own.
    #[error(
        "reached failure state '{state}'{}",
        .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
    )]
    FailureState {
        /// The failure state that was observed.
        state: String,
        /// The backend's explanation, if the observation carried one.
        detail: Option<String>,
    },

    /// The probe reported a state outside every configured set.
    #[error("unexpected state '{state}', wanted target '{}'", .target.join(", "))]
    UnexpectedState {
        /// The state that was observed.
        state: String,
        /// The configured target states.
        target: Vec<String>,
    },

    /// The budget ran out while the operation was still pending, or while a
    /// probe was still running. In the latter case `last_state` is the state
    /// seen before that probe, or empty if none was seen.
    #[error(
        "timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?})",
        .target.join(", ")
    )]
    TimedOut {
        /// The last pending state observed.
        last_state: String,
        /// The configured target states.
        target: Vec<String>,
        /// The configured budget.
        timeout: Duration,
    },
}

impl<E> PollError<E> {
    /// Whether the poll gave up while still pending.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// The probe's own error, if that is what ended the poll.
    pub fn probe_error(&self) -> Option<&E> {
        match self {
            Self::Probe(e) => Some(e),
            _ => None,
        }
    }
}

/// Pending, target and failure state sets plus timing for one poll operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateConf {
    pending: Vec<String>,
    target: Vec<String>,
    failure: Vec<String>,
    config: PollConfig,
}

impl StateConf {
    /// Create a state configuration with default timing and no failure states.
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: to_owned(pending),
            target: to_owned(target),
            failure: Vec::new(),
            config: PollConfig::default(),
        }
    }

    /// Set the failure-terminal states.
    pub fn with_failure(mut self, failure: &[&str]) -> Self {
        self.failure = to_owned(failure);
        self
    }

    /// Replace the timing.
    pub fn with_config(mut self, config: PollConfig) -> Self {
        self.config = config;
        self
    }

    /// The timing in use.
    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Compute the next phase from an observed state and the time spent so far.
    ///
    /// Terminal classifications take precedence over the deadline: a probe
    /// that lands on a target state after the budget still succeeds. While
    /// pending, the next wait is the minimum spacing clamped to the remaining
    /// budget, so the last probe happens at the deadline.
    pub fn transition(&self, observed: &str, elapsed: Duration) -> PollPhase {
        if self.target.iter().any(|s| s == observed) {
            return PollPhase::Success;
        }
        if self.failure.iter().any(|s| s == observed) {
            return PollPhase::Failure;
        }
        if !self.pending.iter().any(|s| s == observed) {
            return PollPhase::Unexpected;
        }

        match self.config.timeout.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => PollPhase::Pending {
                retry_in: self.config.min_interval.min(remaining),
            },
            _ => PollPhase::TimedOut,
        }
    }

    /// Probe until a terminal state is reached or the budget is spent.
    ///
    /// Returns the value of the terminal observation. A probe error ends the
    /// poll immediately as [`PollError::Probe`]; the probe decides which
    /// backend errors are transient by reporting them as a pending state
    /// instead. Each probe runs against the remaining budget and is dropped
    /// when the budget runs out.
    #[instrument(skip_all, fields(target = ?self.target, timeout = ?self.config.timeout))]
    pub async fn wait<T, E, F, Fut>(&self, clock: &dyn Clock, mut probe: F) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Observation<T>, E>> + Send,
        T: Send,
        E: Send,
    {
        let started = clock.now();
        if !self.config.delay.is_zero() {
            clock.sleep(self.config.delay).await;
        }

        let mut attempt: u32 = 0;
        let mut last_state = String::new();
        loop {
            attempt += 1;
            let remaining = self
                .config
                .timeout
                .saturating_sub(clock.now().saturating_duration_since(started));
            let outcome = tokio::select! {
                biased;
                outcome = probe() => Some(outcome),
                _ = clock.sleep(remaining) => None,
            };
            let observation = match outcome {
                Some(Ok(observation)) => observation,
                Some(Err(e)) => {
                    debug!(attempt, "Probe returned an error, giving up");
                    return Err(PollError::Probe(e));
                }
                None => {
                    warn!(attempt, %last_state, "Probe still running at the deadline");
                    return Err(PollError::TimedOut {
                        last_state,
                        target: self.target.clone(),
                        timeout: self.config.timeout,
                    });
                }
            };

            let elapsed = clock.now().saturating_duration_since(started);
            let phase = self.transition(&observation.state, elapsed);
            debug!(attempt, state = %observation.state, ?elapsed, ?phase, "Probe observed state");

            match phase {
                PollPhase::Success => return Ok(observation.value),
                PollPhase::Pending { retry_in } => {
                    last_state = observation.state;
                    clock.sleep(retry_in).await;
                }
                PollPhase::Failure => {
                    return Err(PollError::FailureState {
                        state: observation.state,
                        detail: observation.detail,
                    })
                }
                PollPhase::Unexpected => {
                    return Err(PollError::UnexpectedState {
                        state: observation.state,
                        target: self.target.clone(),
                    })
                }
                PollPhase::TimedOut => {
                    warn!(attempt, last_state = %observation.state, "Poll timed out");
                    return Err(PollError::TimedOut {
                        last_state: observation.state,
                        target: self.target.clone(),
                        timeout: self.config.timeout,
                    });
                }
            }
        }
    }
}

fn to_owned(states: &[&str]) -> Vec<String> {
    states.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct ProbeFailure(&'static str);

    impl fmt::Display for ProbeFailure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "probe failed: {}", self.0)
        }
    }

    impl std::error::Error for ProbeFailure {}

    fn conf() -> StateConf {
        StateConf::new(&["pending"], &["created"])
            .with_failure(&["failed"])
            .with_config(PollConfig {
                timeout: Duration::from_secs(30),
                delay: Duration::from_secs(3),
                min_interval: Duration::from_secs(3),
            })
    }

    #[tokio::test]
    async fn test_immediate_success_probes_once() {
        let clock = ManualClock::new();
        let calls = &AtomicU32::new(0);

        let value = conf()
            .wait(&clock, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProbeFailure>(Observation::new("role", "created"))
            })
            .await;

        assert_eq!(assert_ok!(value), "role");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_pending_twice_then_created() {
        let clock = ManualClock::new();
        let calls = &AtomicU32::new(0);
        let states = &Mutex::new(VecDeque::from(vec!["pending", "pending", "created"]));

        let value = conf()
            .wait(&clock, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let state = states.lock().unwrap().pop_front().unwrap();
                Ok::<_, ProbeFailure>(Observation::new(state.to_string(), state))
            })
            .await;

        assert_eq!(assert_ok!(value), "created");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(9));
    }

    #[tokio::test]
    async fn test_n_pending_then_success_probes_n_plus_one_times() {
        for n in [0u32, 1, 4, 7] {
            let clock = ManualClock::new();
            let calls = &AtomicU32::new(0);

            let result = conf()
                .wait(&clock, move || async move {
                    let seen = calls.fetch_add(1, Ordering::SeqCst);
                    let state = if seen < n { "pending" } else { "created" };
                    Ok::<_, ProbeFailure>(Observation::new(seen, state))
                })
                .await;

            assert_eq!(assert_ok!(result), n);
            assert_eq!(calls.load(Ordering::SeqCst), n + 1);
        }
    }

    #[tokio::test]
    async fn test_always_pending_times_out() {
        let clock = ManualClock::new();
        let calls = &AtomicU32::new(0);
        let conf = conf();

        let err = conf
            .wait(&clock, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProbeFailure>(Observation::new((), "pending"))
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        match err {
            PollError::TimedOut {
                last_state,
                target,
                timeout,
            } => {
                assert_eq!(last_state, "pending");
                assert_eq!(target, vec!["created".to_string()]);
                assert_eq!(timeout, Duration::from_secs(30));
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        let budget = conf.config().timeout.as_secs() / conf.config().min_interval.as_secs();
        let expected = budget as u32;
        let actual = calls.load(Ordering::SeqCst);
        assert!(
            actual + 1 >= expected && actual <= expected + 1,
            "{} probes, expected about {}",
            actual,
            expected
        );
        assert!(clock.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_timeout_with_uneven_spacing_clamps_last_wait() {
        let clock = ManualClock::new();
        let conf = StateConf::new(&["pending"], &["created"]).with_config(PollConfig {
            timeout: Duration::from_secs(10),
            delay: Duration::ZERO,
            min_interval: Duration::from_secs(4),
        });

        let err = conf
            .wait(&clock, || async {
                Ok::<_, ProbeFailure>(Observation::new((), "pending"))
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(2)
            ]
        );
    }

    #[tokio::test]
    async fn test_probe_error_is_returned_unmodified() {
        let clock = ManualClock::new();
        let calls = &AtomicU32::new(0);

        let result = conf()
            .wait(&clock, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<Observation<()>, _>(ProbeFailure("INVALID_ROLE"))
            })
            .await;

        let err = assert_err!(result);
        assert_eq!(err.probe_error(), Some(&ProbeFailure("INVALID_ROLE")));
        assert_eq!(err.to_string(), "probe failed: INVALID_ROLE");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_state_without_error_is_synthesized() {
        let clock = ManualClock::new();

        let err = conf()
            .wait(&clock, || async {
                Ok::<_, ProbeFailure>(Observation::new((), "failed"))
            })
            .await
            .unwrap_err();

        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "reached failure state 'failed'");
    }

    #[tokio::test]
    async fn test_failure_state_carries_detail() {
        let clock = ManualClock::new();

        let err = conf()
            .wait(&clock, || async {
                Ok::<_, ProbeFailure>(
                    Observation::new((), "failed").with_detail(Some("quota exceeded".to_string())),
                )
            })
            .await
            .unwrap_err();

        match &err {
            PollError::FailureState { state, detail } => {
                assert_eq!(state, "failed");
                assert_eq!(detail.as_deref(), Some("quota exceeded"));
            }
            other => panic!("expected failure state, got {:?}", other),
        }
        assert_eq!(err.to_string(), "reached failure state 'failed': quota exceeded");
    }

    #[tokio::test]
    async fn test_hung_check_is_abandoned_at_deadline() {
        let clock = ManualClock::new();

        let err = conf()
            .wait(&clock, || {
                std::future::pending::<Result<Observation<()>, ProbeFailure>>()
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        match err {
            PollError::TimedOut { last_state, .. } => assert_eq!(last_state, ""),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_hanging_after_pending_reports_last_state() {
        let clock = ManualClock::new();
        let calls = &AtomicU32::new(0);

        let err = conf()
            .wait(&clock, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok::<_, ProbeFailure>(Observation::new((), "pending"))
                } else {
                    std::future::pending().await
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
        match err {
            PollError::TimedOut { last_state, .. } => assert_eq!(last_state, "pending"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_check_under_tokio_clock() {
        let conf = conf().with_config(PollConfig {
            timeout: Duration::from_millis(50),
            delay: Duration::ZERO,
            min_interval: Duration::from_millis(10),
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            conf.wait(&TokioClock, || {
                std::future::pending::<Result<Observation<()>, ProbeFailure>>()
            }),
        )
        .await;

        let err = assert_ok!(result).unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unknown_state_is_unexpected() {
        let clock = ManualClock::new();

        let err = conf()
            .wait(&clock, || async {
                Ok::<_, ProbeFailure>(Observation::new((), "exploded"))
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "unexpected state 'exploded', wanted target 'created'"
        );
    }

    #[tokio::test]
    async fn test_independent_polls_do_not_interfere() {
        let first = ManualClock::new();
        let second = ManualClock::new();
        let a_calls = &AtomicU32::new(0);
        let b_calls = &AtomicU32::new(0);
        let conf = conf();

        let (a, b) = tokio::join!(
            conf.wait(&first, move || async move {
                let n = a_calls.fetch_add(1, Ordering::SeqCst);
                let state = if n < 2 { "pending" } else { "created" };
                Ok::<_, ProbeFailure>(Observation::new("a", state))
            }),
            conf.wait(&second, move || async move {
                b_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ProbeFailure>(Observation::new("b", "created"))
            }),
        );

        assert_eq!(a.unwrap(), "a");
        assert_eq!(b.unwrap(), "b");
        assert_eq!(a_calls.load(Ordering::SeqCst), 3);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.elapsed(), Duration::from_secs(9));
        assert_eq!(second.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_transition_table() {
        let conf = conf();

        assert_eq!(
            conf.transition("pending", Duration::from_secs(3)),
            PollPhase::Pending {
                retry_in: Duration::from_secs(3)
            }
        );
        assert_eq!(
            conf.transition("pending", Duration::from_secs(29)),
            PollPhase::Pending {
                retry_in: Duration::from_secs(1)
            }
        );
        assert_eq!(
            conf.transition("pending", Duration::from_secs(30)),
            PollPhase::TimedOut
        );
        assert_eq!(
            conf.transition("created", Duration::from_secs(99)),
            PollPhase::Success
        );
        assert_eq!(conf.transition("failed", Duration::ZERO), PollPhase::Failure);
        assert_eq!(conf.transition("", Duration::ZERO), PollPhase::Unexpected);
    }

    #[test]
    fn test_default_config() {
        let config = PollConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.delay, Duration::from_secs(3));
        assert_eq!(config.min_interval, Duration::from_secs(3));

        let custom = PollConfig::with_timeout(Duration::from_secs(5))
            .delay(Duration::ZERO)
            .min_interval(Duration::from_millis(500));
        assert_eq!(custom.timeout, Duration::from_secs(5));
        assert!(custom.delay.is_zero());
    }
}
