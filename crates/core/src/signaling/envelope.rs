//! Control message envelopes carried by the relay transport
//!
//! Every control message is a small JSON envelope broadcast within the room.
//! The relay guarantees neither ordering nor single delivery, so every
//! payload is designed to be idempotent or self-correcting on resend.

use crate::media::TrackKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A control message exchanged over the relay transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    /// Room the message belongs to
    pub room_id: String,

    /// Identifier of the sending participant
    pub sender_id: String,

    /// Typed payload, tagged by envelope kind on the wire
    #[serde(flatten)]
    pub payload: SignalPayload,
}

/// Typed payload per envelope kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalPayload {
    /// Presence announcement, re-sent periodically until connected
    #[serde(rename_all = "camelCase")]
    Join {
        /// Human-readable name shown to the remote participant
        display_name: String,
    },

    /// Session description offer targeted at one participant
    #[serde(rename_all = "camelCase")]
    Offer {
        /// Intended recipient
        target: String,
        /// Opaque session-description blob
        description: String,
    },

    /// Session description answer targeted at one participant
    #[serde(rename_all = "camelCase")]
    Answer {
        /// Intended recipient
        target: String,
        /// Opaque session-description blob
        description: String,
    },

    /// Connectivity hint, targeted or broadcast
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        /// Intended recipient, or None for broadcast
        target: Option<String>,
        /// Connectivity-hint blob
        candidate: CandidateInit,
    },

    /// Restart offer re-running connectivity checks on the existing session
    #[serde(rename_all = "camelCase")]
    IceRestart {
        /// Intended recipient
        target: String,
        /// Opaque session-description blob with fresh connectivity credentials
        description: String,
    },

    /// Departure notification
    Leave,

    /// Local track mute/unmute mirrored to the remote side
    #[serde(rename_all = "camelCase")]
    MediaStatus {
        /// Which track the flag applies to
        kind: TrackKind,
        /// Whether the track is enabled
        enabled: bool,
    },

    /// Screen-share start/stop mirrored to the remote side
    #[serde(rename_all = "camelCase")]
    ScreenShareStatus {
        /// Whether the sender is currently sharing a screen
        active: bool,
    },
}

/// Opaque connectivity-hint blob tied to a media line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInit {
    /// Candidate string
    pub candidate: String,

    /// Media line identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,

    /// Media line index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
}

impl SignalEnvelope {
    /// Convert envelope to a JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::SerializationError(format!("Failed to serialize envelope: {}", e)))
    }

    /// Parse an envelope from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::SerializationError(format!("Failed to deserialize envelope: {}", e)))
    }

    /// Get the wire name of the payload kind
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            SignalPayload::Join { .. } => "join",
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::IceCandidate { .. } => "ice-candidate",
            SignalPayload::IceRestart { .. } => "ice-restart",
            SignalPayload::Leave => "leave",
            SignalPayload::MediaStatus { .. } => "media-status",
            SignalPayload::ScreenShareStatus { .. } => "screen-share-status",
        }
    }

    /// Recipient this envelope is addressed to, if targeted
    pub fn target(&self) -> Option<&str> {
        match &self.payload {
            SignalPayload::Offer { target, .. }
            | SignalPayload::Answer { target, .. }
            | SignalPayload::IceRestart { target, .. } => Some(target.as_str()),
            SignalPayload::IceCandidate { target, .. } => target.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(payload: SignalPayload) -> SignalEnvelope {
        SignalEnvelope {
            room_id: "room-1".to_string(),
            sender_id: "alice".to_string(),
            payload,
        }
    }

    #[test]
    fn test_join_serialization() {
        let env = envelope(SignalPayload::Join {
            display_name: "Alice".to_string(),
        });

        let json = env.to_json().unwrap();
        assert!(json.contains("\"type\":\"join\""));
        assert!(json.contains("\"roomId\":\"room-1\""));
        assert!(json.contains("\"senderId\":\"alice\""));

        let parsed = SignalEnvelope::from_json(&json).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn test_offer_round_trip() {
        let env = envelope(SignalPayload::Offer {
            target: "bob".to_string(),
            description: "v=0\r\no=- ...".to_string(),
        });

        let parsed = SignalEnvelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(env, parsed);
        assert_eq!(parsed.kind(), "offer");
        assert_eq!(parsed.target(), Some("bob"));
    }

    #[test]
    fn test_candidate_broadcast_has_no_target() {
        let env = envelope(SignalPayload::IceCandidate {
            target: None,
            candidate: CandidateInit {
                candidate: "candidate:...".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
            },
        });

        assert_eq!(env.target(), None);
        let parsed = SignalEnvelope::from_json(&env.to_json().unwrap()).unwrap();
        assert_eq!(env, parsed);
    }

    #[test]
    fn test_media_status_wire_shape() {
        let env = envelope(SignalPayload::MediaStatus {
            kind: TrackKind::Audio,
            enabled: false,
        });

        let json = env.to_json().unwrap();
        assert!(json.contains("\"type\":\"media-status\""));
        assert!(json.contains("\"kind\":\"audio\""));
        assert!(json.contains("\"enabled\":false"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"roomId":"r","senderId":"s","type":"bulk-media","payload":{}}"#;
        assert!(SignalEnvelope::from_json(json).is_err());
    }
}
