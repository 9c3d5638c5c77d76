//! Channel and ping configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ChannelConfig
// ---------------------------------------------------------------------------

/// Settings for a single [`Channel`](crate::Channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Initial capacity of the receive buffer, in bytes.
    pub read_buffer_capacity: usize,

    /// Largest number of bytes a single inbound frame may occupy. A frame
    /// still incomplete past this size closes the channel.
    pub max_frame_size: usize,

    /// Ping behaviour for this channel.
    pub ping: PingConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            read_buffer_capacity: 8 * 1024,
            max_frame_size: 4 * 1024 * 1024,
            ping: PingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// PingConfig
// ---------------------------------------------------------------------------

/// Settings for the round-trip measurement that rides on every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Keep pinging after the first response.
    pub periodic: bool,

    /// Delay between a response and the next request.
    pub interval: Duration,

    /// Weight of the newest sample in the smoothed round-trip time
    /// (0.0–1.0). 1.0 disables smoothing.
    pub smoothing: f64,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            periodic: true,
            interval: Duration::from_secs(1),
            smoothing: 0.125,
        }
    }
}

impl PingConfig {
    /// Clamps `smoothing` into `0.0..=1.0`; a non-finite value falls back
    /// to the default.
    pub fn validated(mut self) -> Self {
        if !self.smoothing.is_finite() {
            self.smoothing = Self::default().smoothing;
        }
        self.smoothing = self.smoothing.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.read_buffer_capacity, 8192);
        assert_eq!(config.max_frame_size, 4 * 1024 * 1024);
        assert!(config.ping.periodic);
    }

    #[test]
    fn test_ping_config_validated_clamps_smoothing() {
        let config = PingConfig {
            smoothing: 3.0,
            ..PingConfig::default()
        }
        .validated();
        assert_eq!(config.smoothing, 1.0);

        let config = PingConfig {
            smoothing: f64::NAN,
            ..PingConfig::default()
        }
        .validated();
        assert_eq!(config.smoothing, 0.125);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{ "max_frame_size": 1024 }"#).unwrap();
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.read_buffer_capacity, 8192);
        assert_eq!(config.ping, PingConfig::default());
    }
}
