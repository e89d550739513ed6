//! Retry policy for transient change source failures.

use std::time::Duration;

/// How the poll loop responds to a retriable source failure.
///
/// The default is fail-stop: any source failure terminates the pipeline.
/// `Backoff` retries with capped exponential delays, escalating to fatal
/// after `max_retries` consecutive failures. Retried cycles re-poll the
/// same watermark range, so delivery is at-least-once while a retry is in
/// flight. Non-retriable errors are always fatal regardless of policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Terminate on the first source failure
    FailFast,
    /// Retry with exponential backoff
    Backoff {
        /// Delay before the first retry
        base: Duration,
        /// Cap on the backoff delay
        max: Duration,
        /// Consecutive failures tolerated before escalating to fatal
        max_retries: u32,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::FailFast
    }
}

impl RetryPolicy {
    /// Convenience constructor for a backoff policy.
    pub fn backoff(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self::Backoff {
            base,
            max,
            max_retries,
        }
    }

    pub(crate) fn state(&self) -> RetryState {
        RetryState {
            policy: self.clone(),
            attempt: 0,
        }
    }
}

/// Tracks consecutive failures across poll cycles.
#[derive(Debug)]
pub(crate) struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Delay before the next retry, or `None` if the failure is fatal.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        match self.policy {
            RetryPolicy::FailFast => None,
            RetryPolicy::Backoff {
                base,
                max,
                max_retries,
            } => {
                if self.attempt >= max_retries {
                    return None;
                }
                let delay = base.saturating_mul(2u32.saturating_pow(self.attempt)).min(max);
                self.attempt += 1;
                Some(delay)
            }
        }
    }

    /// Reset after a successful cycle.
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    pub(crate) fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_fast_never_retries() {
        let mut state = RetryPolicy::FailFast.state();
        assert_eq!(state.next_delay(), None);
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let mut state =
            RetryPolicy::backoff(Duration::from_millis(100), Duration::from_millis(500), 5).state();
        assert_eq!(state.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(state.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(state.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(state.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(state.next_delay(), Some(Duration::from_millis(500)));
        assert_eq!(state.next_delay(), None);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut state =
            RetryPolicy::backoff(Duration::from_millis(100), Duration::from_secs(1), 2).state();
        state.next_delay();
        state.next_delay();
        assert_eq!(state.next_delay(), None);

        state.reset();
        assert_eq!(state.attempt(), 0);
        assert_eq!(state.next_delay(), Some(Duration::from_millis(100)));
    }
}
