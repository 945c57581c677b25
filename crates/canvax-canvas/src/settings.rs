use std::time::Duration;

use canvax_core::config::SessionConfig;

/// Resolved session tunables shared by the registry and every session it creates.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub history_limit: usize,
    pub feed_capacity: usize,
    pub idle_timeout: Duration,
    pub reap_interval: Duration,
    pub code_length: usize,
    pub client_id_length: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            history_limit: config.history_limit.max(2),
            feed_capacity: config.feed_capacity.max(1),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            reap_interval: Duration::from_secs(config.reap_interval_secs.max(1)),
            code_length: config.code_length.max(1),
            client_id_length: config.client_id_length.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SessionSettings::default();
        assert_eq!(settings.history_limit, 1000);
        assert_eq!(settings.feed_capacity, 100);
        assert_eq!(settings.idle_timeout, Duration::from_secs(600));
        assert_eq!(settings.reap_interval, Duration::from_secs(60));
        assert_eq!(settings.code_length, 6);
        assert_eq!(settings.client_id_length, 8);
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = SessionConfig {
            feed_capacity: 0,
            reap_interval_secs: 0,
            ..SessionConfig::default()
        };
        let settings = SessionSettings::from(&config);
        assert_eq!(settings.feed_capacity, 1);
        assert_eq!(settings.reap_interval, Duration::from_secs(1));
    }
}
