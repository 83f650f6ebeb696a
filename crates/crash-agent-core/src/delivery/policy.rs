/// Fixed-delay retry policy with a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RetryPolicy {
    max_attempts: u32,
    retry_delay_secs: f64,
}

impl RetryPolicy {
    pub(crate) fn new(max_attempts: u32, retry_delay_secs: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay_secs: retry_delay_secs.max(0.0),
        }
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `attempts` counts sends already made, including the one that just failed.
    pub(crate) fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    pub(crate) fn next_attempt_at(&self, now: f64) -> f64 {
        now + self.retry_delay_secs
    }
}
