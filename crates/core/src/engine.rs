//! Media engine contract
//!
//! The media engine owns capture, encoding, packetized transport, and
//! encryption; the session core drives it through this narrow contract and
//! never touches media bytes itself. Descriptions and candidates are opaque
//! blobs produced and consumed by the engine; the core only routes them.

use crate::media::{TrackKind, VideoSourceKind};
use crate::signaling::CandidateInit;
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// Which half of a description exchange to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    /// The initiating half
    Offer,
    /// The responding half
    Answer,
}

/// An opaque session-description blob plus its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Offer or answer
    pub kind: DescriptionKind,
    /// Engine-defined description payload
    pub blob: String,
}

/// Transport-level connectivity of the session
///
/// Mapped 1:1 from the engine's connectivity callback into the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
    /// No connectivity checks have run yet
    #[default]
    New,
    /// Connectivity checks in progress
    Checking,
    /// A working path between the peers exists
    Connected,
    /// The working path was lost, possibly transiently
    Disconnected,
    /// Connectivity checks gave up
    Failed,
    /// The engine connection was closed
    Closed,
}

/// Point-in-time transport statistics sampled by the quality monitor
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    /// Current round-trip time on the active path, if measurable
    pub round_trip_time: Option<Duration>,
    /// Total packets sent on the active path
    pub packets_sent: u64,
    /// Total packets received on the active path
    pub packets_received: u64,
}

/// An event emitted by the media engine
///
/// Events are stamped with the engine generation current when they were
/// produced; the driver discards events from generations older than the one
/// it observed at its last reset, which is how results of abandoned
/// operations are prevented from leaking into a fresh epoch.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    /// Engine generation the event belongs to
    pub generation: u64,
    /// What happened
    pub kind: EngineEventKind,
}

/// Engine event payloads
#[derive(Debug, Clone)]
pub enum EngineEventKind {
    /// The transport-level connectivity changed
    ConnectivityChanged(ConnectivityState),

    /// The engine discovered a local connectivity candidate to publish
    LocalCandidate(CandidateInit),

    /// A remote media track started arriving
    RemoteTrackReceived(TrackKind),

    /// The active video source ended out-of-band (e.g. OS-level screen
    /// sharing stopped by the user outside the application)
    VideoSourceEnded(VideoSourceKind),
}

/// Capability contract the session core drives
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Produce a local description of the given kind without applying it
    async fn create_local_description(&self, kind: DescriptionKind) -> Result<SessionDescription>;

    /// Produce an offer that re-runs connectivity checks on the existing
    /// description pair with fresh credentials
    async fn create_restart_description(&self) -> Result<SessionDescription>;

    /// Apply a locally produced description
    async fn apply_local_description(&self, description: &SessionDescription) -> Result<()>;

    /// Apply a description received from the remote peer
    async fn apply_remote_description(&self, description: &SessionDescription) -> Result<()>;

    /// Discard the outstanding local offer, returning to a stable state
    async fn rollback_local_description(&self) -> Result<()>;

    /// Feed a remote connectivity candidate into the engine
    async fn add_connectivity_candidate(&self, candidate: &CandidateInit) -> Result<()>;

    /// Enable or disable an outgoing track in place, without renegotiation
    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<()>;

    /// Substitute the outgoing video track's capture source in place
    ///
    /// # Errors
    ///
    /// Returns `Error::CaptureDenied` when the user or OS refuses access to
    /// the requested source.
    async fn switch_video_source(&self, source: VideoSourceKind) -> Result<()>;

    /// Request an outgoing video encoder ceiling in kbps
    ///
    /// Advisory rate control: the engine never blocks or drops application
    /// data because of this, it only lowers the encoder target.
    async fn set_outgoing_bitrate_cap(&self, kbps: u32) -> Result<()>;

    /// Sample current transport statistics
    async fn statistics(&self) -> Result<TransportStats>;

    /// Tear down the underlying connection and prepare a fresh one
    ///
    /// Returns the new engine generation; events stamped with older
    /// generations are stale.
    async fn reset(&self) -> Result<u64>;

    /// Close the engine permanently
    async fn close(&self) -> Result<()>;

    /// Current engine generation
    fn generation(&self) -> u64;

    /// Subscribe to engine events
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}
