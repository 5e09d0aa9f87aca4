//! Exponential backoff with full jitter.

use modindex_core::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Backoff controller.
///
/// Each [`Backoff::pause`] returns a uniformly random wait in `(0, current]`
/// and then grows `current` by the multiplier, capped at `max`. There is no
/// reset: a caller that wants one constructs a fresh controller.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            current: initial.min(max),
            max,
            multiplier,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial(), config.max(), config.multiplier)
    }

    /// Upper bound of the next pause.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Draw the next pause and advance the controller.
    pub fn pause(&mut self) -> Duration {
        self.pause_with(&mut rand::rng())
    }

    /// [`Backoff::pause`] with a caller-supplied random source.
    pub fn pause_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let ceiling = u64::try_from(self.current.as_nanos()).unwrap_or(u64::MAX);
        let wait = if ceiling == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(rng.random_range(1..=ceiling))
        };

        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);

        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_stays_within_current_ceiling() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
        let mut ceilings = Vec::new();
        for _ in 0..8 {
            let ceiling = backoff.current();
            let wait = backoff.pause();
            assert!(wait > Duration::ZERO);
            assert!(wait <= ceiling, "{wait:?} exceeds {ceiling:?}");
            ceilings.push(ceiling.as_millis());
        }
        assert_eq!(ceilings, vec![100, 200, 400, 800, 1000, 1000, 1000, 1000]);
    }

    #[test]
    fn test_fractional_multiplier_grows_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(30), Duration::from_secs(300), 1.5);
        backoff.pause();
        assert_eq!(backoff.current(), Duration::from_secs(45));
        for _ in 0..20 {
            backoff.pause();
        }
        assert_eq!(backoff.current(), Duration::from_secs(300));
    }

    #[test]
    fn test_initial_above_max_is_capped() {
        let backoff = Backoff::new(Duration::from_secs(10), Duration::from_secs(5), 2.0);
        assert_eq!(backoff.current(), Duration::from_secs(5));
    }

    #[test]
    fn test_fresh_controller_resets() {
        let config = BackoffConfig::default();
        let mut backoff = Backoff::from_config(&config);
        backoff.pause();
        backoff.pause();
        assert!(backoff.current() > config.initial());

        backoff = Backoff::from_config(&config);
        assert_eq!(backoff.current(), config.initial());
    }
}
