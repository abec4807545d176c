use std::time::Duration;

/// Reconnect delay schedule
///
/// Doubles from `initial` up to `max` on every consecutive failure and never
/// gives up. With `initial == max` the delay is fixed.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    max: Duration,
    current_attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current_attempt: 0,
        }
    }

    /// Fixed delay between attempts
    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay)
    }

    /// Delay before the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2_u32.saturating_pow(self.current_attempt);
        let delay = self.initial.saturating_mul(factor).min(self.max);
        self.current_attempt = self.current_attempt.saturating_add(1);
        delay
    }

    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(60))
    }
}
