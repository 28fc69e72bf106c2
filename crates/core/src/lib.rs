//! Serverless one-to-one media session core
//!
//! This crate establishes and maintains a single direct media session
//! between exactly two participants without a central session server.
//! Participants discover each other through an untrusted, best-effort relay
//! and negotiate a transport-layer session whose media flows directly
//! between them. The crate owns the negotiation and lifecycle state machine;
//! media primitives and the relay channel are supplied through the
//! [`MediaEngine`] and [`RelayTransport`] contracts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  UI layer                                                │
//! │  ↓ commands / watch<SessionSnapshot>                     │
//! │  CallSession (handle)                                    │
//! │  └─ SessionDriver (single-actor event loop)              │
//! │     ├─ Role arbitration (deterministic, id ordering)     │
//! │     ├─ Offer/answer state machine + glare resolution     │
//! │     ├─ Candidate buffer (FIFO until remote description)  │
//! │     ├─ Discovery loop (periodic announce until connected)│
//! │     ├─ Quality monitor (RTT → score → bitrate cap)       │
//! │     └─ Media track control (mute, screen substitution)   │
//! │        ↓                         ↓                       │
//! │  RelayTransport (envelopes)   MediaEngine (media)        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pairlink_core::{CallSession, SessionConfig};
//! # use std::sync::Arc;
//! # async fn example(
//! #     relay: Arc<dyn pairlink_core::RelayTransport>,
//! #     engine: Arc<dyn pairlink_core::MediaEngine>,
//! # ) -> pairlink_core::Result<()> {
//! let session = CallSession::join(
//!     SessionConfig::default(),
//!     "room-42",
//!     "Alice",
//!     relay,
//!     engine,
//! )?;
//!
//! let mut state = session.watch();
//! state.changed().await.ok();
//! println!("{}", state.borrow().status);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod media;
pub mod session;
pub mod signaling;

pub use config::{SessionConfig, TurnServerConfig};
pub use engine::{
    ConnectivityState, DescriptionKind, EngineEvent, EngineEventKind, MediaEngine,
    SessionDescription, TransportStats,
};
pub use error::{Error, Result};
pub use media::{MediaState, TrackKind, VideoSourceKind};
pub use session::{
    CallSession, PeerInfo, Role, SessionSnapshot, SessionStatus, SignalingState,
};
pub use signaling::{CandidateInit, RelayEvent, RelayTransport, SignalEnvelope, SignalPayload};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
