//! Local media track control
//!
//! Muting flips a track's enabled flag in place and screen share substitutes
//! the outgoing video source on the live session; neither path renegotiates
//! the session description. Every transition is mirrored to the remote side
//! with a status envelope so its displayed state follows the local truth.

use crate::engine::MediaEngine;
use crate::media::{MediaState, TrackKind, VideoSourceKind};
use crate::signaling::SignalPayload;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Controller for the local participant's outgoing tracks
pub(crate) struct MediaController {
    engine: Arc<dyn MediaEngine>,
    state: MediaState,
}

impl MediaController {
    pub(crate) fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            state: MediaState::default(),
        }
    }

    /// Current local media flags
    pub(crate) fn state(&self) -> MediaState {
        self.state
    }

    /// Flip a track's enabled flag in place
    ///
    /// Returns the new flag plus the status envelope payload to publish.
    pub(crate) async fn toggle_track(&mut self, kind: TrackKind) -> Result<(bool, SignalPayload)> {
        let enabled = !self.state.enabled(kind);
        self.engine.set_track_enabled(kind, enabled).await?;
        self.state.set_enabled(kind, enabled);

        debug!(?kind, enabled, "toggled local track");
        Ok((enabled, SignalPayload::MediaStatus { kind, enabled }))
    }

    /// Start or stop substituting the screen for the outgoing video track
    ///
    /// Returns the new sharing flag plus the status envelope payload. A
    /// refused capture leaves the state untouched; the toggle just reverts.
    pub(crate) async fn toggle_screen_share(&mut self) -> Result<(bool, SignalPayload)> {
        let source = if self.state.screen_sharing {
            VideoSourceKind::Camera
        } else {
            VideoSourceKind::Screen
        };

        self.engine.switch_video_source(source).await?;
        self.state.screen_sharing = source == VideoSourceKind::Screen;

        debug!(active = self.state.screen_sharing, "screen share toggled");
        Ok((
            self.state.screen_sharing,
            SignalPayload::ScreenShareStatus {
                active: self.state.screen_sharing,
            },
        ))
    }

    /// React to the screen source ending out-of-band
    ///
    /// Reverts to the camera symmetrically and returns the status payload to
    /// publish, or None when no share was active (a stale end notice).
    pub(crate) async fn screen_source_ended(&mut self) -> Option<SignalPayload> {
        if !self.state.screen_sharing {
            return None;
        }

        self.state.screen_sharing = false;
        if let Err(e) = self.engine.switch_video_source(VideoSourceKind::Camera).await {
            warn!("failed to restore camera after screen share ended: {}", e);
        }

        Some(SignalPayload::ScreenShareStatus { active: false })
    }

    /// Forget the screen substitution without touching the engine
    ///
    /// Used when the engine connection was rebuilt and came back with the
    /// default camera source.
    pub(crate) fn reset_screen_share(&mut self) {
        self.state.screen_sharing = false;
    }
}
