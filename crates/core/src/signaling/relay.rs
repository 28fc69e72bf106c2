//! Relay transport contract
//!
//! The relay is an untrusted, best-effort, room-broadcast channel used only
//! to carry small control envelopes before (and alongside) a direct session.
//! Delivery is at-least-once at best and unordered across senders; the core
//! compensates with loopback suppression, idempotent payloads, and periodic
//! resend from the discovery loop.

use crate::signaling::SignalEnvelope;
use crate::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Events surfaced by a relay transport
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A control envelope was received (possibly duplicated, possibly our own)
    Message(SignalEnvelope),

    /// The relay reports a participant joined the room
    PeerJoined(String),

    /// The relay reports a participant left the room
    PeerLeft(String),
}

/// Room-broadcast publish/subscribe channel for control envelopes
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Publish an envelope to every participant in the room
    ///
    /// The send has no delivery guarantee; callers must rely on resend or
    /// idempotence rather than on this returning `Ok`.
    async fn send(&self, envelope: SignalEnvelope) -> Result<()>;

    /// Subscribe to relay events
    ///
    /// Every subscriber observes the same event stream, including echoes of
    /// the local participant's own broadcasts.
    fn subscribe(&self) -> broadcast::Receiver<RelayEvent>;
}
