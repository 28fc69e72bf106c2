//! WebRTC-backed media engine for pairlink
//!
//! Implements the [`MediaEngine`] contract over webrtc-rs: one
//! `RTCPeerConnection` per session epoch, outgoing Opus/VP8 sample tracks,
//! candidate and connectivity forwarding as generation-stamped events, and
//! in-place track substitution for screen sharing.
//!
//! The engine does not capture or render media itself. The embedding
//! application writes encoded samples into [`WebRtcEngine::audio_track`] and
//! [`WebRtcEngine::active_video_track`], consulting
//! [`WebRtcEngine::track_enabled`] (mute gate) and
//! [`WebRtcEngine::bitrate_cap_watch`] (encoder ceiling) while doing so, and
//! renders the streams surfaced by [`WebRtcEngine::remote_tracks`].

#![warn(clippy::all)]

mod engine;
mod tracks;

pub use engine::{map_connection_state, WebRtcEngine};
pub use tracks::{audio_track, camera_track, screen_track};
