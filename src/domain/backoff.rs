//! Backoff Controller - Retry Delays for Failing Topics
//!
//! Pure function of the consecutive failure count:
//! `delay = min(base * 2^(failures-1), base * max_multiplier)`, with
//! bounded random jitter on top so that topics (and browser tabs, and
//! daemons) that failed together do not retry together.
//!
//! There is no terminal "give up" state. A topic keeps retrying at the
//! capped delay for as long as someone is subscribed to it.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

/// Default ceiling, as a multiple of the configured interval.
pub const DEFAULT_MAX_MULTIPLIER: u32 = 5;

/// Default jitter window (±20%).
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

/// Backoff policy shared by every topic.
///
/// The base delay is not part of the policy; it is each topic's own
/// refresh interval, passed in at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BackoffPolicy {
    /// Ceiling as a multiple of the base interval.
    #[serde(default = "default_max_multiplier")]
    pub max_multiplier: u32,
    /// Jitter window as a fraction of the delay, in `[0, 1)`.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_multiplier: DEFAULT_MAX_MULTIPLIER,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl BackoffPolicy {
    /// A policy without jitter, for deterministic scheduling.
    pub fn without_jitter() -> Self {
        Self {
            jitter_ratio: 0.0,
            ..Self::default()
        }
    }

    /// Delay before the next tick, before jitter.
    ///
    /// `failures == 0` means the last fetch succeeded: poll at `base`.
    pub fn nominal_delay(&self, base: Duration, failures: u32) -> Duration {
        if failures == 0 {
            return base;
        }

        let ceiling = base.saturating_mul(self.max_multiplier.max(1));
        // 2^31 already exceeds any sane ceiling; clamp the shift.
        let factor = 1u32 << (failures - 1).min(31);
        base.saturating_mul(factor).min(ceiling)
    }

    /// Delay before the next tick, with jitter drawn from `rng`.
    pub fn delay_with<R: Rng + ?Sized>(
        &self,
        base: Duration,
        failures: u32,
        rng: &mut R,
    ) -> Duration {
        let nominal = self.nominal_delay(base, failures);
        let ratio = self.jitter_ratio.clamp(0.0, 0.99);
        if ratio == 0.0 || nominal.is_zero() {
            return nominal;
        }

        let offset = rng.random_range(-ratio..=ratio);
        // Intervals near Duration::MAX saturate instead of overflowing.
        Duration::try_from_secs_f64(nominal.as_secs_f64() * (1.0 + offset))
            .unwrap_or(Duration::MAX)
    }

    /// Delay before the next tick, jittered with the thread-local RNG.
    pub fn delay(&self, base: Duration, failures: u32) -> Duration {
        self.delay_with(base, failures, &mut rand::rng())
    }
}

fn default_max_multiplier() -> u32 {
    DEFAULT_MAX_MULTIPLIER
}

fn default_jitter_ratio() -> f64 {
    DEFAULT_JITTER_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const BASE: Duration = Duration::from_millis(1000);

    #[test]
    fn test_success_polls_at_base_interval() {
        let policy = BackoffPolicy::without_jitter();
        assert_eq!(policy.nominal_delay(BASE, 0), BASE);
    }

    #[test]
    fn test_delay_doubles_per_failure() {
        let policy = BackoffPolicy::without_jitter();
        assert_eq!(policy.nominal_delay(BASE, 1), Duration::from_millis(1000));
        assert_eq!(policy.nominal_delay(BASE, 2), Duration::from_millis(2000));
        assert_eq!(policy.nominal_delay(BASE, 3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_capped_at_multiplier() {
        let policy = BackoffPolicy::without_jitter();
        assert_eq!(policy.nominal_delay(BASE, 4), Duration::from_millis(5000));
        assert_eq!(policy.nominal_delay(BASE, 40), Duration::from_millis(5000));
    }

    #[test]
    fn test_jitter_stays_within_window() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for failures in 0..8 {
            let nominal = policy.nominal_delay(BASE, failures).as_secs_f64();
            let jittered = policy.delay_with(BASE, failures, &mut rng).as_secs_f64();
            assert!(jittered >= nominal * 0.8 - 1e-9, "{jittered} < 80% of {nominal}");
            assert!(jittered <= nominal * 1.2 + 1e-9, "{jittered} > 120% of {nominal}");
        }
    }

    #[test]
    fn test_zero_multiplier_treated_as_one() {
        let policy = BackoffPolicy {
            max_multiplier: 0,
            jitter_ratio: 0.0,
        };
        assert_eq!(policy.nominal_delay(BASE, 3), BASE);
    }

    #[test]
    fn test_jitter_saturates_on_huge_intervals() {
        let policy = BackoffPolicy {
            max_multiplier: 5,
            jitter_ratio: 0.5,
        };
        let mut rng = StdRng::seed_from_u64(11);
        for failures in 0..16 {
            let delay = policy.delay_with(Duration::MAX, failures, &mut rng);
            assert!(delay >= Duration::MAX.mul_f64(0.49));
        }
    }
}
