//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Source of uniform samples in `[0, 1)` for jitter.
pub trait Jitter {
    fn sample(&mut self) -> f64;
}

/// Jitter from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn sample(&mut self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Deterministic jitter from a seeded generator.
#[derive(Debug, Clone)]
pub struct SeededJitter {
    rng: fastrand::Rng,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl Jitter for SeededJitter {
    fn sample(&mut self) -> f64 {
        self.rng.f64()
    }
}

/// A constant sample, mostly for tests. 0.5 yields the un-jittered delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn sample(&mut self) -> f64 {
        self.0
    }
}

/// Delay before retrying after failed attempt `attempt` (1-based).
///
/// `min(max_delay, base_delay * 2^(attempt-1))`, scaled by a factor drawn
/// uniformly from `[1 - jitter_ratio, 1 + jitter_ratio]`, never negative.
pub fn calculate_backoff(attempt: u32, config: &RetryConfig, jitter: &mut impl Jitter) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = config.base_delay_ms.saturating_mul(exponential_base);
    let capped_delay = delay_ms.min(config.max_delay_ms);

    let ratio = config.jitter_ratio.clamp(0.0, 1.0);
    if ratio == 0.0 {
        return Duration::from_millis(capped_delay);
    }

    let sample = jitter.sample().clamp(0.0, 1.0);
    let factor = 1.0 - ratio + 2.0 * ratio * sample;
    let jittered = (capped_delay as f64 * factor).max(0.0);
    Duration::from_millis(jittered.round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base: u64, max: u64, jitter_ratio: f64) -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: base,
            max_delay_ms: max,
            jitter_ratio,
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let cfg = config(100, 2000, 0.0);
        let mut jitter = FixedJitter(0.9);
        assert_eq!(calculate_backoff(1, &cfg, &mut jitter), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, &cfg, &mut jitter), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, &cfg, &mut jitter), Duration::from_millis(400));
        assert_eq!(calculate_backoff(10, &cfg, &mut jitter), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(0, &cfg, &mut jitter), Duration::ZERO);
    }

    #[test]
    fn test_jitter_bounds() {
        let cfg = config(1000, 10_000, 0.25);
        assert_eq!(calculate_backoff(1, &cfg, &mut FixedJitter(0.0)), Duration::from_millis(750));
        assert_eq!(calculate_backoff(1, &cfg, &mut FixedJitter(0.5)), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(1, &cfg, &mut FixedJitter(1.0)), Duration::from_millis(1250));
    }

    #[test]
    fn test_full_jitter_floors_at_zero() {
        let cfg = config(400, 400, 1.0);
        assert_eq!(calculate_backoff(1, &cfg, &mut FixedJitter(0.0)), Duration::ZERO);
        assert_eq!(calculate_backoff(1, &cfg, &mut FixedJitter(1.0)), Duration::from_millis(800));
    }

    #[test]
    fn test_seeded_jitter_is_reproducible() {
        let cfg = config(100, 5000, 0.5);
        let mut a = SeededJitter::new(7);
        let mut b = SeededJitter::new(7);
        for attempt in 1..6 {
            let delay = calculate_backoff(attempt, &cfg, &mut a);
            assert_eq!(delay, calculate_backoff(attempt, &cfg, &mut b));

            let nominal = (100u64 << (attempt - 1)).min(5000);
            assert!(delay.as_millis() as u64 >= nominal / 2);
            assert!(delay.as_millis() as u64 <= nominal * 3 / 2);
        }
    }

    #[test]
    fn test_random_jitter_in_range() {
        let mut jitter = RandomJitter;
        for _ in 0..100 {
            let sample = jitter.sample();
            assert!((0.0..1.0).contains(&sample));
        }
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let cfg = config(1000, 60_000, 0.0);
        assert_eq!(calculate_backoff(200, &cfg, &mut RandomJitter), Duration::from_millis(60_000));
    }
}
