use std::time::Duration;

use rand::Rng;

use crate::config::SyncConfig;

/// Delay before retry number `attempt` (1-based): base, 2×base, 4×base, … capped at `max_delay`.
#[must_use]
pub fn backoff_delay(config: &SyncConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    config
        .base_delay
        .checked_mul(1_u32 << exponent)
        .map_or(config.max_delay, |delay| delay.min(config.max_delay))
}

/// Stretch `delay` by a random fraction of itself, up to `ratio`.
#[must_use]
pub fn with_jitter(delay: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return delay;
    }
    let extra = rand::rng().random_range(0.0..=ratio.min(1.0));
    delay.mul_f64(1.0 + extra)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let config = SyncConfig::default();
        let delays: Vec<u64> = (1..=7)
            .map(|attempt| backoff_delay(&config, attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn huge_attempt_counts_stay_capped() {
        let config = SyncConfig::default();
        assert_eq!(backoff_delay(&config, u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let base = Duration::from_secs(4);
        assert_eq!(with_jitter(base, 0.0), base);
        for _ in 0..100 {
            let jittered = with_jitter(base, 0.5);
            assert!(jittered >= base && jittered <= Duration::from_secs(6));
        }
    }
}
