//! Environment-driven configuration for sync and the remote store.

use std::env;
use std::time::Duration;

/// Retry policy for the sync queue.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay that may be randomly added, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        }
    }
}

impl SyncConfig {
    /// Reads `FITNESS_SYNC_BASE_DELAY_MS`, `FITNESS_SYNC_MAX_DELAY_MS` and
    /// `FITNESS_SYNC_JITTER`, falling back to defaults for missing or bad values.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
        };
        let base_delay = millis("FITNESS_SYNC_BASE_DELAY_MS").unwrap_or(defaults.base_delay);
        let max_delay = millis("FITNESS_SYNC_MAX_DELAY_MS")
            .unwrap_or(defaults.max_delay)
            .max(base_delay);
        let jitter = lookup("FITNESS_SYNC_JITTER")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|j| j.is_finite())
            .map_or(defaults.jitter, |j| j.clamp(0.0, 1.0));

        Self {
            base_delay,
            max_delay,
            jitter,
        }
    }
}

/// Connection settings for the HTTP remote store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Returns `None` unless `FITNESS_REMOTE_URL` is set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let base_url = lookup("FITNESS_REMOTE_URL")?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return None;
        }
        let token = lookup("FITNESS_REMOTE_TOKEN").filter(|t| !t.trim().is_empty());
        let timeout = lookup("FITNESS_REMOTE_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map_or(Duration::from_secs(10), Duration::from_secs);

        Some(Self {
            base_url,
            token,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn sync_defaults_when_unset() {
        assert_eq!(SyncConfig::from_lookup(lookup(&[])), SyncConfig::default());
    }

    #[test]
    fn sync_reads_overrides_and_clamps() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("FITNESS_SYNC_BASE_DELAY_MS", "250"),
            ("FITNESS_SYNC_MAX_DELAY_MS", "100"),
            ("FITNESS_SYNC_JITTER", "3.5"),
        ]));
        assert_eq!(config.base_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_millis(250));
        assert!((config.jitter - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn remote_requires_url() {
        assert_eq!(RemoteConfig::from_lookup(lookup(&[])), None);
        assert_eq!(
            RemoteConfig::from_lookup(lookup(&[("FITNESS_REMOTE_URL", "  ")])),
            None
        );
    }

    #[test]
    fn remote_normalizes_url_and_reads_token() {
        let config = RemoteConfig::from_lookup(lookup(&[
            ("FITNESS_REMOTE_URL", "https://api.example.test/v1/"),
            ("FITNESS_REMOTE_TOKEN", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://api.example.test/v1");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
