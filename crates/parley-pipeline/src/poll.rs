//! Poll-until-done with an explicit policy.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay every time
    Flat,
    /// `interval * factor^attempt`, capped at `max`
    Exponential { factor: u32, max: Duration },
}

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::flat(Duration::from_secs(5), 60)
    }
}

impl PollPolicy {
    pub fn flat(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Flat,
        }
    }

    pub fn exponential(interval: Duration, max_attempts: u32, factor: u32, max: Duration) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Exponential { factor, max },
        }
    }

    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let interval_secs: u64 = std::env::var("VIDEO_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);
        let max_attempts = std::env::var("VIDEO_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(60);
        Self::flat(Duration::from_secs(interval_secs), max_attempts)
    }

    /// Delay before the attempt numbered `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Flat => self.interval,
            Backoff::Exponential { factor, max } => {
                let multiplier = factor.max(1).saturating_pow(attempt);
                self.interval.saturating_mul(multiplier).min(max)
            }
        }
    }

    /// Upper bound on the time spent sleeping across all attempts.
    pub fn budget(&self) -> Duration {
        (0..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T, E> {
    Ready(T),
    Pending,
    Failed(E),
}

/// Result of a whole poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T, E> {
    Ready(T),
    Failed(E),
    TimedOut { attempts: u32 },
}

/// Call `probe` until it is no longer pending or the attempt budget runs out.
///
/// Each attempt waits for the policy delay first, so a flat policy finishes
/// within `max_attempts * interval` plus probe time. `probe` receives the
/// one-based attempt number.
pub async fn poll_until<T, E, F, Fut>(policy: &PollPolicy, mut probe: F) -> PollOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Probe<T, E>>,
{
    for attempt in 0..policy.max_attempts {
        sleep(policy.delay_for(attempt)).await;

        match probe(attempt + 1).await {
            Probe::Ready(value) => return PollOutcome::Ready(value),
            Probe::Failed(error) => return PollOutcome::Failed(error),
            Probe::Pending => {
                debug!(attempt = attempt + 1, max = policy.max_attempts, "still pending");
            }
        }
    }

    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
    }
}
