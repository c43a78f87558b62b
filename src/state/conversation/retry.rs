use std::time::Duration;

use crate::api::RetryClass;

/// Exponential backoff for one class of retryable backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub const RATE_LIMIT: Self = Self {
        base: Duration::from_secs(5),
        cap: Duration::from_secs(60),
        max_attempts: 10,
    };

    pub const OVERLOAD: Self = Self {
        base: Duration::from_secs(10),
        cap: Duration::from_secs(90),
        max_attempts: 10,
    };

    /// `min(base * 2^attempt, cap)`, where `attempt` counts failures so far
    /// starting from 0.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Backoff bookkeeping for one outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub next_backoff: Option<Duration>,
}

impl RetryState {
    /// Records a failure and returns the delay before the next attempt, or
    /// `None` once `policy.max_attempts` attempts have been made.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        let delay = policy.delay_for(self.attempt_count);
        self.attempt_count += 1;
        self.next_backoff = (self.attempt_count < policy.max_attempts).then_some(delay);
        self.next_backoff
    }
}

pub(super) fn retry_notice(class: RetryClass, delay: Duration, attempt: u32, max: u32) -> String {
    let what = match class {
        RetryClass::RateLimit => "Rate limited",
        RetryClass::Overload => "API overloaded",
    };
    format!(
        "{what}, retrying in {}s (attempt {attempt}/{max})...",
        delay.as_secs_f32().ceil() as u64
    )
}
