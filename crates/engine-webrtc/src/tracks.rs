//! Outgoing sample track construction

use std::sync::Arc;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const STREAM_ID: &str = "pairlink";

/// Create the outgoing Opus audio track
pub fn audio_track() -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48_000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        "audio".to_string(),
        STREAM_ID.to_string(),
    ))
}

/// Create the outgoing VP8 camera track
pub fn camera_track() -> Arc<TrackLocalStaticSample> {
    video_track("video-camera")
}

/// Create the VP8 track that substitutes for the camera while sharing
pub fn screen_track() -> Arc<TrackLocalStaticSample> {
    video_track("video-screen")
}

fn video_track(id: &str) -> Arc<TrackLocalStaticSample> {
    Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90_000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        id.to_string(),
        STREAM_ID.to_string(),
    ))
}
