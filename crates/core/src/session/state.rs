//! Session state types observable by the embedding application

use crate::engine::ConnectivityState;
use crate::media::MediaState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the description exchange this participant drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    /// No remote peer discovered yet
    #[default]
    Unassigned,
    /// Produces the offer for the current epoch
    Caller,
    /// Answers the Caller's offer
    Listener,
}

/// Offer/answer sub-state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalingState {
    /// No outstanding description exchange
    #[default]
    Stable,
    /// A local offer is outstanding, waiting for an answer
    HaveLocalOffer,
    /// A remote offer is being answered
    HaveRemoteOffer,
}

/// Identity of a participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Opaque identifier, unique within the room
    pub peer_id: String,
    /// Human-readable name
    pub display_name: String,
}

/// Human-readable session condition for the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Announcing presence, no remote peer yet
    Searching,
    /// Remote peer discovered, negotiation or connectivity checks running
    Connecting,
    /// Media is flowing directly between the peers
    Connected,
    /// Connectivity was lost and automatic recovery is running
    Reconnecting,
    /// Automatic recovery did not resolve within the bounded window
    Failed,
    /// The session was closed
    Closed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionStatus::Searching => "Searching for peer…",
            SessionStatus::Connecting => "Connecting…",
            SessionStatus::Connected => "Connected",
            SessionStatus::Reconnecting => "Reconnecting…",
            SessionStatus::Failed => "Connection failed",
            SessionStatus::Closed => "Call ended",
        };
        f.write_str(text)
    }
}

/// Point-in-time observable state of the session
///
/// Published through a watch channel; the UI layer renders from this and
/// never reaches into the driver's internal state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Local participant identity
    pub local_peer: PeerInfo,
    /// Remote participant identity, once discovered
    pub remote_peer: Option<PeerInfo>,
    /// Current role for this epoch
    pub role: Role,
    /// Offer/answer sub-state
    pub signaling: SignalingState,
    /// Transport connectivity sub-state
    pub connectivity: ConnectivityState,
    /// Local track flags, authoritative
    pub local_media: MediaState,
    /// Remote track flags, mirrored from status envelopes
    pub remote_media: MediaState,
    /// Quality score 0–4, 4 best
    pub quality_score: u8,
    /// Human-readable condition
    pub status: SessionStatus,
}

impl SessionSnapshot {
    /// Initial snapshot for a freshly joined room
    pub fn initial(local_peer: PeerInfo) -> Self {
        Self {
            local_peer,
            remote_peer: None,
            role: Role::Unassigned,
            signaling: SignalingState::Stable,
            connectivity: ConnectivityState::New,
            local_media: MediaState::default(),
            remote_media: MediaState::default(),
            quality_score: 0,
            status: SessionStatus::Searching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(SessionStatus::Searching.to_string(), "Searching for peer…");
        assert_eq!(SessionStatus::Reconnecting.to_string(), "Reconnecting…");
        assert_eq!(SessionStatus::Failed.to_string(), "Connection failed");
    }

    #[test]
    fn test_initial_snapshot() {
        let snapshot = SessionSnapshot::initial(PeerInfo {
            peer_id: "alice".to_string(),
            display_name: "Alice".to_string(),
        });

        assert_eq!(snapshot.role, Role::Unassigned);
        assert_eq!(snapshot.signaling, SignalingState::Stable);
        assert_eq!(snapshot.connectivity, ConnectivityState::New);
        assert!(snapshot.remote_peer.is_none());
        assert_eq!(snapshot.status, SessionStatus::Searching);
    }
}
