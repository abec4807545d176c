//! Trailing-minute scan rate estimate
//!
//! Sixty per-second slots indexed by the UTC second-of-minute. A sample in a
//! new second overwrites its slot, a sample in the same second as the
//! previous one accumulates into it. The rate is the plain average of all
//! slots.

use chrono::{DateTime, Timelike, Utc};

pub const SLOT_COUNT: usize = 60;

/// What happens to slots that were not written during the current lap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleSlotPolicy {
    /// Keep contributing their previous-lap value until overwritten
    #[default]
    Retain,
    /// Drop out of the average once older than one minute, measured against
    /// the time passed to `current_rate_at`
    Expire,
}

impl StaleSlotPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "retain" => Some(StaleSlotPolicy::Retain),
            "expire" => Some(StaleSlotPolicy::Expire),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateEstimator {
    slots: [u64; SLOT_COUNT],
    /// Unix second each slot was last written, used by `Expire`
    written_at: [i64; SLOT_COUNT],
    last_slot: Option<usize>,
    latest_second: i64,
    policy: StaleSlotPolicy,
}

impl RateEstimator {
    pub fn new(policy: StaleSlotPolicy) -> Self {
        Self {
            slots: [0; SLOT_COUNT],
            written_at: [i64::MIN; SLOT_COUNT],
            last_slot: None,
            latest_second: i64::MIN,
            policy,
        }
    }

    pub fn policy(&self) -> StaleSlotPolicy {
        self.policy
    }

    /// Attribute `scanned` to the second containing `at`
    pub fn sample(&mut self, scanned: u64, at: DateTime<Utc>) {
        let slot = at.second() as usize % SLOT_COUNT;
        let second = at.timestamp();

        let same_lap = match self.policy {
            StaleSlotPolicy::Retain => true,
            StaleSlotPolicy::Expire => self.written_at[slot] == second,
        };

        if self.last_slot == Some(slot) && same_lap {
            self.slots[slot] += scanned;
        } else {
            self.slots[slot] = scanned;
            self.last_slot = Some(slot);
        }

        self.written_at[slot] = second;
        self.latest_second = self.latest_second.max(second);
    }

    /// Average scanned-per-second over the minute before the newest sample
    pub fn current_rate(&self) -> f64 {
        self.rate_as_of(self.latest_second)
    }

    /// Average scanned-per-second over the minute before `now`
    ///
    /// Under `Expire` the estimate decays to zero once no sample has arrived
    /// for a minute. A wall clock behind the newest sample counts as that
    /// sample's second.
    pub fn current_rate_at(&self, now: DateTime<Utc>) -> f64 {
        self.rate_as_of(now.timestamp().max(self.latest_second))
    }

    fn rate_as_of(&self, second: i64) -> f64 {
        let sum: u64 = match self.policy {
            StaleSlotPolicy::Retain => self.slots.iter().sum(),
            StaleSlotPolicy::Expire => {
                let horizon = second.saturating_sub(SLOT_COUNT as i64);
                self.slots
                    .iter()
                    .zip(self.written_at.iter())
                    .filter(|(_, written)| **written > horizon)
                    .map(|(value, _)| *value)
                    .sum()
            }
        };

        sum as f64 / SLOT_COUNT as f64
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.policy);
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(StaleSlotPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_no_samples_is_zero() {
        let estimator = RateEstimator::default();
        assert_eq!(estimator.current_rate(), 0.0);
    }

    #[test]
    fn test_one_sample_per_second_for_a_minute() {
        let mut estimator = RateEstimator::default();
        let start = 1_700_000_000;

        for i in 0..60 {
            estimator.sample(10, at(start + i));
        }

        assert_eq!(estimator.current_rate(), 10.0);
    }

    #[test]
    fn test_same_second_accumulates() {
        let mut estimator = RateEstimator::default();
        let t = at(1_700_000_000);

        estimator.sample(5, t);
        estimator.sample(5, t + Duration::milliseconds(400));

        assert_eq!(estimator.slots[t.second() as usize], 10);
        assert_eq!(estimator.current_rate(), 10.0 / 60.0);
    }

    #[test]
    fn test_new_second_overwrites_previous_lap() {
        let mut estimator = RateEstimator::default();
        let t = at(1_700_000_000);

        estimator.sample(30, t);
        estimator.sample(1, t + Duration::seconds(1));
        // Same slot one minute later, not the last slot written: overwritten
        estimator.sample(7, t + Duration::seconds(60));

        assert_eq!(estimator.slots[t.second() as usize], 7);
    }

    #[test]
    fn test_retain_keeps_stale_slots() {
        let mut estimator = RateEstimator::new(StaleSlotPolicy::Retain);
        let t = at(1_700_000_000);

        estimator.sample(60, t);
        estimator.sample(0, t + Duration::seconds(300));

        assert_eq!(estimator.current_rate(), 1.0);
    }

    #[test]
    fn test_expire_drops_stale_slots() {
        let mut estimator = RateEstimator::new(StaleSlotPolicy::Expire);
        let t = at(1_700_000_000);

        estimator.sample(60, t);
        assert_eq!(estimator.current_rate(), 1.0);

        estimator.sample(0, t + Duration::seconds(300));
        assert_eq!(estimator.current_rate(), 0.0);
    }

    #[test]
    fn test_expire_decays_when_stream_goes_quiet() {
        let mut estimator = RateEstimator::new(StaleSlotPolicy::Expire);
        let t = at(1_700_000_000);

        estimator.sample(60, t);

        assert_eq!(estimator.current_rate_at(t + Duration::seconds(30)), 1.0);
        assert_eq!(estimator.current_rate_at(t + Duration::seconds(61)), 0.0);
        // A clock behind the newest sample does not hide it
        assert_eq!(estimator.current_rate_at(t - Duration::seconds(3_600)), 1.0);
    }

    #[test]
    fn test_retain_ignores_quiet_period() {
        let mut estimator = RateEstimator::new(StaleSlotPolicy::Retain);
        let t = at(1_700_000_000);

        estimator.sample(60, t);

        assert_eq!(estimator.current_rate_at(t + Duration::seconds(600)), 1.0);
    }

    #[test]
    fn test_expire_overwrites_slot_from_previous_lap() {
        let mut estimator = RateEstimator::new(StaleSlotPolicy::Expire);
        let t = at(1_700_000_000);

        estimator.sample(60, t);
        // Exactly one lap later with nothing in between: last_slot matches
        estimator.sample(6, t + Duration::seconds(60));

        assert_eq!(estimator.slots[t.second() as usize], 6);
        assert_eq!(estimator.current_rate(), 0.1);
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut estimator = RateEstimator::default();
        estimator.sample(100, at(1_700_000_000));

        estimator.reset();

        assert_eq!(estimator.current_rate(), 0.0);
        assert_eq!(estimator.policy(), StaleSlotPolicy::Retain);
    }
}
