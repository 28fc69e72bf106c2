//! WebSocket relay transport for pairlink
//!
//! Connects to a room relay service over WebSocket and implements the
//! [`RelayTransport`] contract: envelopes published here are broadcast to
//! every participant subscribed to the same room (including an echo back to
//! the sender), and relay-side presence changes surface as peer join/leave
//! events. The relay is trusted for availability only; it sees and may drop,
//! duplicate, or reorder every frame.

#![warn(clippy::all)]

mod client;
mod frame;

pub use client::WsRelay;
pub use frame::RelayFrame;
