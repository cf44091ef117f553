//! Exponential reconnect backoff.

use std::time::Duration;

/// Doubling delay with an upper cap.
///
/// The delay grows across consecutive failures and only returns to the
/// initial value on [`Backoff::reset`]. There is no attempt limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
    attempts: u32,
}

impl Backoff {
    /// Create a backoff starting at `initial` and capped at `max`.
    ///
    /// A cap below the initial delay is raised to the initial delay.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self { initial, max, next: initial, attempts: 0 }
    }

    /// Delay for the next reconnect, advancing the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.max);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Delay the next call to [`Self::next_delay`] will return.
    pub fn peek(&self) -> Duration {
        self.next
    }

    /// Consecutive delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Upper bound of any delay.
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Return to the initial delay.
    pub fn reset(&mut self) {
        self.next = self.initial;
        self.attempts = 0;
    }
}
