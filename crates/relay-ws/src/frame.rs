//! Wire frames exchanged with the relay service

use pairlink_core::SignalEnvelope;
use serde::{Deserialize, Serialize};

/// One JSON text frame on the relay socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RelayFrame {
    /// Client → relay: subscribe to a room's broadcasts
    #[serde(rename_all = "camelCase")]
    Subscribe {
        /// Room to subscribe to
        room_id: String,
        /// Identifier announced to the relay
        peer_id: String,
    },

    /// Both directions: a broadcast control envelope
    Signal {
        /// The carried envelope
        envelope: SignalEnvelope,
    },

    /// Relay → client: a participant subscribed to the room
    #[serde(rename_all = "camelCase")]
    PeerJoined {
        /// Identifier of the participant
        peer_id: String,
    },

    /// Relay → client: a participant's connection went away
    #[serde(rename_all = "camelCase")]
    PeerLeft {
        /// Identifier of the participant
        peer_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::SignalPayload;

    #[test]
    fn test_subscribe_wire_shape() {
        let frame = RelayFrame::Subscribe {
            room_id: "room-1".to_string(),
            peer_id: "alice".to_string(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"kind\":\"subscribe\""));
        assert!(json.contains("\"roomId\":\"room-1\""));
    }

    #[test]
    fn test_signal_round_trip() {
        let frame = RelayFrame::Signal {
            envelope: SignalEnvelope {
                room_id: "room-1".to_string(),
                sender_id: "alice".to_string(),
                payload: SignalPayload::Join {
                    display_name: "Alice".to_string(),
                },
            },
        };

        let json = serde_json::to_string(&frame).unwrap();
        let parsed: RelayFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, parsed);
    }

    #[test]
    fn test_presence_frames() {
        let json = r#"{"kind":"peer-left","peerId":"bob"}"#;
        let parsed: RelayFrame = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            RelayFrame::PeerLeft {
                peer_id: "bob".to_string()
            }
        );
    }
}
