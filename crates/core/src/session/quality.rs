//! Adaptive quality scoring from transport statistics
//!
//! A sampled round-trip time maps to a discrete score 0–4 (4 best), and the
//! score picks an outgoing video encoder ceiling. Advisory rate control
//! only: no application data is ever blocked or dropped here.

use crate::engine::TransportStats;
use std::time::Duration;

/// Highest quality score
pub const MAX_SCORE: u8 = 4;

/// Map a sampled round-trip time to a quality score
///
/// `thresholds_ms` are ascending boundaries for scores 4..=1; an RTT above
/// the last boundary, or no measurable RTT at all, scores 0.
pub fn score_from_rtt(rtt: Option<Duration>, thresholds_ms: &[u32; 4]) -> u8 {
    let Some(rtt) = rtt else {
        return 0;
    };

    let rtt_ms = rtt.as_millis() as u64;
    for (i, boundary) in thresholds_ms.iter().enumerate() {
        if rtt_ms <= u64::from(*boundary) {
            return MAX_SCORE - i as u8;
        }
    }
    0
}

/// Pick the outgoing video bitrate cap for a quality score
pub fn cap_for_score(score: u8, caps_kbps: &[u32; 5]) -> u32 {
    caps_kbps[usize::from(score.min(MAX_SCORE))]
}

/// One step of the quality monitor: sample → score
pub fn score_sample(stats: &TransportStats, thresholds_ms: &[u32; 4]) -> u8 {
    score_from_rtt(stats.round_trip_time, thresholds_ms)
}
