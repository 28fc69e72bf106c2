//! Configuration types for the session core

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a call session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Relay endpoint URL (ws:// or wss://)
    pub relay_url: String,

    /// Local peer ID (auto-generated if None)
    pub peer_id: Option<String>,

    /// Presence announce period while searching for the remote peer
    #[serde(with = "duration_millis")]
    pub discovery_interval: Duration,

    /// How long a Disconnected session may linger before escalating
    #[serde(with = "duration_millis")]
    pub disconnect_grace: Duration,

    /// Bounded time an automatic connectivity restart may take before
    /// the session surfaces a failure to the user
    #[serde(with = "duration_millis")]
    pub restart_window: Duration,

    /// Transport statistics sampling period while connected
    #[serde(with = "duration_millis")]
    pub quality_interval: Duration,

    /// Ascending round-trip-time boundaries in milliseconds mapping to
    /// quality scores 4..=1; an RTT above the last boundary scores 0
    pub rtt_thresholds_ms: [u32; 4],

    /// Outgoing video bitrate cap in kbps per quality score 0..=4
    pub bitrate_caps_kbps: [u32; 5],

    /// STUN server URLs handed to the media engine
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8080".to_string(),
            peer_id: None,
            discovery_interval: Duration::from_secs(3),
            disconnect_grace: Duration::from_secs(10),
            restart_window: Duration::from_secs(15),
            quality_interval: Duration::from_secs(2),
            rtt_thresholds_ms: [100, 250, 500, 1000],
            bitrate_caps_kbps: [100, 250, 600, 1200, 2500],
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
        }
    }
}

impl SessionConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must be ws:// or wss://: {}",
                self.relay_url
            )));
        }

        if self.discovery_interval < Duration::from_millis(10) {
            return Err(Error::InvalidConfig(
                "discovery_interval must be at least 10ms".to_string(),
            ));
        }

        if self.quality_interval < Duration::from_millis(10) {
            return Err(Error::InvalidConfig(
                "quality_interval must be at least 10ms".to_string(),
            ));
        }

        if self.restart_window < self.quality_interval {
            return Err(Error::InvalidConfig(
                "restart_window must be at least one quality_interval".to_string(),
            ));
        }

        if !self.rtt_thresholds_ms.windows(2).all(|w| w[0] < w[1]) {
            return Err(Error::InvalidConfig(
                "rtt_thresholds_ms must be strictly ascending".to_string(),
            ));
        }

        if !self.bitrate_caps_kbps.windows(2).all(|w| w[0] <= w[1]) {
            return Err(Error::InvalidConfig(
                "bitrate_caps_kbps must be non-decreasing in score".to_string(),
            ));
        }

        if let Some(id) = &self.peer_id {
            if id.is_empty() {
                return Err(Error::InvalidConfig("peer_id cannot be empty".to_string()));
            }
        }

        for turn in &self.turn_servers {
            if !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:") {
                return Err(Error::InvalidConfig(format!(
                    "TURN server URL must start with turn:// or turns://: {}",
                    turn.url
                )));
            }
        }

        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unordered_thresholds() {
        let config = SessionConfig {
            rtt_thresholds_ms: [100, 100, 500, 1000],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_decreasing_caps() {
        let config = SessionConfig {
            bitrate_caps_kbps: [100, 250, 200, 1200, 2500],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_websocket_relay_url() {
        let config = SessionConfig {
            relay_url: "http://relay.example".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_empty_peer_id() {
        let config = SessionConfig {
            peer_id: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_turn_url() {
        let config = SessionConfig {
            turn_servers: vec![TurnServerConfig {
                url: "stun:example.com".to_string(),
                username: "u".to_string(),
                credential: "c".to_string(),
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SessionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.discovery_interval, config.discovery_interval);
        assert_eq!(parsed.bitrate_caps_kbps, config.bitrate_caps_kbps);
    }
}
