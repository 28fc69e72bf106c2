//! Local and remote media state

use serde::{Deserialize, Serialize};

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// Microphone audio
    Audio,
    /// Camera (or substituted screen) video
    Video,
}

/// Outgoing video source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSourceKind {
    /// The default camera capture source
    Camera,
    /// An alternate display capture source
    Screen,
}

/// Enabled/sharing flags for one side of the session
///
/// Local flags are authoritative locally and mirrored to the remote peer via
/// explicit status envelopes; muting disables a track in place rather than
/// removing it, so the remote side cannot infer these from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    /// Microphone track enabled
    pub audio_enabled: bool,
    /// Camera track enabled
    pub video_enabled: bool,
    /// Outgoing video substituted with a display capture
    pub screen_sharing: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            screen_sharing: false,
        }
    }
}

impl MediaState {
    /// Get the enabled flag for a track kind
    pub fn enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio_enabled,
            TrackKind::Video => self.video_enabled,
        }
    }

    /// Set the enabled flag for a track kind
    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.audio_enabled = enabled,
            TrackKind::Video => self.video_enabled = enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_media_state() {
        let state = MediaState::default();
        assert!(state.audio_enabled);
        assert!(state.video_enabled);
        assert!(!state.screen_sharing);
    }

    #[test]
    fn test_set_enabled_by_kind() {
        let mut state = MediaState::default();
        state.set_enabled(TrackKind::Audio, false);
        assert!(!state.enabled(TrackKind::Audio));
        assert!(state.enabled(TrackKind::Video));
    }

    #[test]
    fn test_track_kind_serde() {
        assert_eq!(serde_json::to_string(&TrackKind::Audio).unwrap(), "\"audio\"");
        assert_eq!(serde_json::to_string(&TrackKind::Video).unwrap(), "\"video\"");
    }
}
