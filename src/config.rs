use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{sync, tick, viewport};
use crate::sync::channel::{ResendPolicy, SyncChannelConfig};
use crate::util::vec2::Vec2;

/// Room configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port of the metrics HTTP endpoint
    pub metrics_port: u16,
    /// Ticks per second
    pub tick_rate: u32,
    /// Room identity announced to the sync service (region-room)
    pub server_id: String,
    /// Public websocket endpoint announced to the sync service
    pub server_endpoint: String,
    /// Shared secret for the sync handshake. Sync connections are refused
    /// while it is empty.
    pub sync_secret: String,
    pub sync_ack_timeout: Duration,
    pub sync_resend: ResendPolicy,
    /// Object types replicated to the sync service
    pub sync_tracked_types: HashSet<String>,
    pub viewport_half_width: f32,
    pub viewport_half_height: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            tick_rate: tick::TICK_RATE,
            server_id: "local-room1".to_string(),
            server_endpoint: "ws://127.0.0.1:3501".to_string(),
            sync_secret: String::new(),
            sync_ack_timeout: Duration::from_millis(sync::DEFAULT_ACK_TIMEOUT_MS),
            sync_resend: ResendPolicy::default(),
            sync_tracked_types: ["user".to_string()].into_iter().collect(),
            viewport_half_width: viewport::DEFAULT_HALF_WIDTH,
            viewport_half_height: viewport::DEFAULT_HALF_HEIGHT,
        }
    }
}

fn parse_in_range<T>(key: &str, raw: &str, valid: impl Fn(&T) -> bool) -> Option<T>
where
    T: FromStr,
{
    match raw.trim().parse::<T>() {
        Ok(parsed) if valid(&parsed) => Some(parsed),
        Ok(_) => {
            tracing::warn!("{} '{}' out of range, using default", key, raw);
            None
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup("METRICS_PORT") {
            if let Some(port) = parse_in_range::<u16>("METRICS_PORT", &raw, |p| *p > 0) {
                config.metrics_port = port;
            }
        }

        if let Some(raw) = lookup("TICK_RATE") {
            if let Some(rate) = parse_in_range::<u32>("TICK_RATE", &raw, |r| (1..=240).contains(r)) {
                config.tick_rate = rate;
            }
        }

        if let Some(id) = lookup("SERVER_ID") {
            config.server_id = id;
        }

        if let Some(endpoint) = lookup("SERVER_ENDPOINT") {
            config.server_endpoint = endpoint;
        }

        if let Some(secret) = lookup("SYNC_SECRET") {
            config.sync_secret = secret;
        }

        if let Some(raw) = lookup("SYNC_ACK_TIMEOUT_MS") {
            if let Some(ms) = parse_in_range::<u64>("SYNC_ACK_TIMEOUT_MS", &raw, |ms| *ms >= 100) {
                config.sync_ack_timeout = Duration::from_millis(ms);
            }
        }

        let resend_interval = lookup("SYNC_RESEND_INTERVAL_MS")
            .and_then(|raw| parse_in_range::<u64>("SYNC_RESEND_INTERVAL_MS", &raw, |ms| *ms >= 10))
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(sync::DEFAULT_RESEND_INTERVAL_MS));
        let resend_max = lookup("SYNC_RESEND_MAX_MS")
            .and_then(|raw| parse_in_range::<u64>("SYNC_RESEND_MAX_MS", &raw, |ms| *ms >= 100))
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(sync::DEFAULT_RESEND_MAX_MS));

        config.sync_resend = ResendPolicy::Fixed {
            interval: resend_interval,
        };
        if let Some(policy) = lookup("SYNC_RESEND_POLICY") {
            match policy.trim().to_ascii_lowercase().as_str() {
                "fixed" => {}
                "exponential" => {
                    config.sync_resend = ResendPolicy::Exponential {
                        base: resend_interval,
                        max: resend_max,
                    }
                }
                _ => tracing::warn!("Invalid SYNC_RESEND_POLICY '{}', using fixed", policy),
            }
        }

        if let Some(raw) = lookup("SYNC_TRACKED_TYPES") {
            config.sync_tracked_types = raw
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        let extent_ok = |v: &f32| (viewport::MIN_HALF_EXTENT..=viewport::MAX_HALF_EXTENT).contains(v);
        if let Some(raw) = lookup("VIEWPORT_HALF_WIDTH") {
            if let Some(w) = parse_in_range::<f32>("VIEWPORT_HALF_WIDTH", &raw, extent_ok) {
                config.viewport_half_width = w;
            }
        }
        if let Some(raw) = lookup("VIEWPORT_HALF_HEIGHT") {
            if let Some(h) = parse_in_range::<f32>("VIEWPORT_HALF_HEIGHT", &raw, extent_ok) {
                config.viewport_half_height = h;
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.metrics_port == 0 {
            return Err("metrics_port cannot be 0".to_string());
        }
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.server_id.is_empty() {
            return Err("server_id cannot be empty".to_string());
        }
        if self.server_endpoint.is_empty() {
            return Err("server_endpoint cannot be empty".to_string());
        }
        if self.sync_ack_timeout.is_zero() {
            return Err("sync_ack_timeout cannot be 0".to_string());
        }
        if let ResendPolicy::Exponential { base, max } = self.sync_resend {
            if max < base {
                return Err("resend max delay cannot be below the base delay".to_string());
            }
        }
        Ok(())
    }

    pub fn viewport_half_extents(&self) -> Vec2 {
        Vec2::new(self.viewport_half_width, self.viewport_half_height)
    }

    pub fn sync_channel_config(&self) -> SyncChannelConfig {
        SyncChannelConfig {
            ack_timeout: self.sync_ack_timeout,
            resend: self.sync_resend,
            tracked_types: self.sync_tracked_types.clone(),
            ..SyncChannelConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.sync_ack_timeout, Duration::from_secs(5));
        assert_eq!(
            config.sync_resend,
            ResendPolicy::Fixed {
                interval: Duration::from_secs(1)
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("METRICS_PORT", "9100"),
            ("SERVER_ID", "eu-ffa1"),
            ("SYNC_RESEND_POLICY", "exponential"),
            ("SYNC_RESEND_MAX_MS", "8000"),
            ("SYNC_TRACKED_TYPES", "user, team ,"),
            ("VIEWPORT_HALF_WIDTH", "800"),
        ]));
        assert_eq!(config.metrics_port, 9100);
        assert_eq!(config.server_id, "eu-ffa1");
        assert_eq!(
            config.sync_resend,
            ResendPolicy::Exponential {
                base: Duration::from_secs(1),
                max: Duration::from_secs(8)
            }
        );
        assert!(config.sync_tracked_types.contains("team"));
        assert_eq!(config.sync_tracked_types.len(), 2);
        assert_eq!(config.viewport_half_width, 800.0);
    }

    #[test]
    fn test_resend_interval() {
        let fixed = ServerConfig::from_lookup(lookup(&[("SYNC_RESEND_INTERVAL_MS", "250")]));
        assert_eq!(
            fixed.sync_resend,
            ResendPolicy::Fixed {
                interval: Duration::from_millis(250)
            }
        );

        let exponential = ServerConfig::from_lookup(lookup(&[
            ("SYNC_RESEND_POLICY", "exponential"),
            ("SYNC_RESEND_INTERVAL_MS", "500"),
            ("SYNC_RESEND_MAX_MS", "4000"),
        ]));
        assert_eq!(
            exponential.sync_resend,
            ResendPolicy::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(4)
            }
        );
        assert_eq!(exponential.sync_resend.retry_delay(3), Duration::from_secs(2));
        assert!(exponential.validate().is_ok());

        let bad = ServerConfig::from_lookup(lookup(&[("SYNC_RESEND_INTERVAL_MS", "0")]));
        assert_eq!(bad.sync_resend, ResendPolicy::default());
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("METRICS_PORT", "0"),
            ("TICK_RATE", "fast"),
            ("SYNC_RESEND_POLICY", "sometimes"),
            ("VIEWPORT_HALF_HEIGHT", "1"),
        ]));
        let defaults = ServerConfig::default();
        assert_eq!(config.metrics_port, defaults.metrics_port);
        assert_eq!(config.tick_rate, defaults.tick_rate);
        assert_eq!(config.sync_resend, defaults.sync_resend);
        assert_eq!(config.viewport_half_height, defaults.viewport_half_height);
    }

    #[test]
    fn test_validate_rejects_empty_identity() {
        let config = ServerConfig {
            server_id: String::new(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }
}
