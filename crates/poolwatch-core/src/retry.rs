//! Bounded retry scheduling.
//!
//! Every wait in the engine goes through [`wait_until`]: probe, check,
//! sleep, repeat, until the validator accepts or the budget runs out.
//! Exhaustion is an ordinary outcome, never an error.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{error, info};

/// Default attempt budget when neither attempts nor duration is given.
pub const DEFAULT_ATTEMPTS: u32 = 100;

/// Default sleep between probes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Termination budget for one retry loop.
///
/// Exactly one of `attempts`/`duration` governs termination: when
/// `duration` is set it overrides attempt counting entirely; otherwise the
/// loop runs `attempts` times (default [`DEFAULT_ATTEMPTS`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of probes. Ignored when `duration` is set.
    pub attempts: Option<u32>,

    /// Wall-clock budget for the whole loop.
    pub duration: Option<Duration>,

    /// Sleep between probes.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: Some(DEFAULT_ATTEMPTS),
            duration: None,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl RetryPolicy {
    /// Attempt-bounded policy with the default interval.
    pub fn attempts(attempts: u32) -> Self {
        Self {
            attempts: Some(attempts),
            duration: None,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Duration-bounded policy with the default interval.
    pub fn duration(duration: Duration) -> Self {
        Self {
            attempts: None,
            duration: Some(duration),
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Attempt-bounded policy derived from a wall-clock budget: the budget
    /// divided by the interval, rounded up. Unlike [`RetryPolicy::duration`]
    /// this keeps attempt-counting semantics, so a slow probe does not eat
    /// into the number of tries.
    pub fn attempts_within(budget: Duration, interval: Duration) -> Self {
        let interval_ms = interval.as_millis().max(1);
        let attempts = budget.as_millis().div_ceil(interval_ms) as u32;
        Self {
            attempts: Some(attempts.max(1)),
            duration: None,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Outcome of a [`wait_until`] loop.
#[derive(Debug, Clone)]
pub struct Waited<V> {
    /// Last observed probe value (`None` only if no probe ran).
    pub last: Option<V>,

    /// Number of probes issued.
    pub attempts: u32,

    /// Whether the validator accepted before the budget ran out.
    pub success: bool,
}

/// Probe until `accept` approves the result or the policy's budget is
/// exhausted. On exhaustion the last observed value is returned with
/// `success = false`.
///
/// `silent` suppresses per-iteration logging of negative results; use it
/// when many short-lived failures are expected (e.g. while waiting for a
/// config key to initialize).
pub async fn wait_until<F, Fut, V, A>(
    mut probe: F,
    accept: A,
    policy: &RetryPolicy,
    silent: bool,
) -> Waited<V>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = V>,
    V: std::fmt::Debug,
    A: Fn(&V) -> bool,
{
    let start = Instant::now();
    let deadline = policy.duration.map(|d| start + d);
    let max_attempts = match policy.duration {
        Some(_) => None,
        None => Some(policy.attempts.unwrap_or(DEFAULT_ATTEMPTS)),
    };

    let mut attempts = 0u32;
    let mut last = None;
    loop {
        if let Some(max) = max_attempts {
            if attempts >= max {
                break;
            }
        }
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                break;
            }
        }
        attempts += 1;

        let value = probe().await;
        let accepted = accept(&value);
        if !silent && !accepted {
            info!(
                attempt = attempts,
                elapsed_s = start.elapsed().as_secs(),
                response = ?value,
                "response not accepted yet"
            );
        }
        last = Some(value);
        if accepted {
            info!(
                attempt = attempts,
                elapsed_s = start.elapsed().as_secs(),
                "got the desired response"
            );
            return Waited {
                last,
                attempts,
                success: true,
            };
        }
        sleep(policy.interval).await;
    }
    error!(
        attempts,
        elapsed_s = start.elapsed().as_secs(),
        "no acceptable response within the retry budget"
    );
    Waited {
        last,
        attempts,
        success: false,
    }
}
