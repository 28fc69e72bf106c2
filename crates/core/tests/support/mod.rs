//! Shared test harness: in-memory relay hub and scriptable media engine
//!
//! The hub reproduces the relay's broadcast semantics, including echoing a
//! sender's own envelopes back to it, optional duplicate delivery
//! (at-least-once), held delivery (to stage races deterministically), and
//! dropped delivery (to starve recovery paths).

#![allow(dead_code)]

use async_trait::async_trait;
use pairlink_core::{
    CandidateInit, ConnectivityState, DescriptionKind, EngineEvent, EngineEventKind, Error,
    MediaEngine, RelayEvent, RelayTransport, Result, SessionConfig, SessionDescription,
    SessionSnapshot, SignalEnvelope, SignalPayload, TrackKind, TransportStats, VideoSourceKind,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

// ============================================================================
// Relay hub
// ============================================================================

/// In-memory room-broadcast relay shared by every test participant
pub struct RelayHub {
    events: broadcast::Sender<RelayEvent>,
    duplicate: AtomicBool,
    hold: AtomicBool,
    drop_all: AtomicBool,
    held: Mutex<Vec<RelayEvent>>,
    log: Mutex<Vec<SignalEnvelope>>,
}

impl RelayHub {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            events,
            duplicate: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            drop_all: AtomicBool::new(false),
            held: Mutex::new(Vec::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Create a relay endpoint for one participant
    pub fn client(self: &Arc<Self>) -> Arc<HubRelay> {
        Arc::new(HubRelay {
            hub: Arc::clone(self),
        })
    }

    /// Deliver every envelope twice (at-least-once delivery)
    pub fn set_duplicate_delivery(&self, on: bool) {
        self.duplicate.store(on, Ordering::SeqCst);
    }

    /// Queue deliveries instead of dispatching them
    pub fn set_hold(&self, on: bool) {
        self.hold.store(on, Ordering::SeqCst);
    }

    /// Silently discard every send (lossy relay)
    pub fn set_drop_all(&self, on: bool) {
        self.drop_all.store(on, Ordering::SeqCst);
    }

    /// Dispatch everything queued while holding
    pub fn release_held(&self) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for event in held {
            let _ = self.events.send(event);
        }
    }

    /// Inject an arbitrary envelope, as if a (possibly scripted) peer sent it
    pub fn inject(&self, envelope: SignalEnvelope) {
        self.dispatch(RelayEvent::Message(envelope));
    }

    /// Report a relay-level departure
    pub fn announce_peer_left(&self, peer_id: &str) {
        self.dispatch(RelayEvent::PeerLeft(peer_id.to_string()));
    }

    /// Every envelope that was ever published through this hub
    pub fn sent_envelopes(&self) -> Vec<SignalEnvelope> {
        self.log.lock().unwrap().clone()
    }

    /// Count published envelopes matching a predicate
    pub fn count_sent(&self, predicate: impl Fn(&SignalEnvelope) -> bool) -> usize {
        self.log.lock().unwrap().iter().filter(|e| predicate(e)).count()
    }

    fn publish(&self, envelope: SignalEnvelope) {
        self.log.lock().unwrap().push(envelope.clone());

        if self.drop_all.load(Ordering::SeqCst) {
            return;
        }

        self.dispatch(RelayEvent::Message(envelope.clone()));
        if self.duplicate.load(Ordering::SeqCst) {
            self.dispatch(RelayEvent::Message(envelope));
        }
    }

    fn dispatch(&self, event: RelayEvent) {
        if self.hold.load(Ordering::SeqCst) {
            self.held.lock().unwrap().push(event);
        } else {
            let _ = self.events.send(event);
        }
    }
}

/// One participant's endpoint on the hub
pub struct HubRelay {
    hub: Arc<RelayHub>,
}

#[async_trait]
impl RelayTransport for HubRelay {
    async fn send(&self, envelope: SignalEnvelope) -> Result<()> {
        self.hub.publish(envelope);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.hub.events.subscribe()
    }
}

// ============================================================================
// Mock media engine
// ============================================================================

#[derive(Default)]
struct EngineInner {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<CandidateInit>,
    applied_caps: Vec<u32>,
    offers_created: u32,
    answers_created: u32,
    restarts_created: u32,
    audio_enabled: bool,
    video_enabled: bool,
    video_source: Option<VideoSourceKind>,
    connected: bool,
    rtt: Option<Duration>,
    fail_screen_capture: bool,
}

/// Scriptable media engine with deterministic descriptions
///
/// Connectivity is simulated: once both a local and a remote description are
/// applied the engine reports `Checking` then `Connected`. Two engines can be
/// linked so that resetting or closing one side surfaces `Disconnected` on
/// the other, the way a real transport would observe its peer vanishing.
pub struct MockEngine {
    id: String,
    generation: AtomicU64,
    events: broadcast::Sender<EngineEvent>,
    partner: Mutex<Option<Weak<MockEngine>>>,
    inner: Mutex<EngineInner>,
}

impl MockEngine {
    pub fn new(id: &str) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            id: id.to_string(),
            generation: AtomicU64::new(0),
            events,
            partner: Mutex::new(None),
            inner: Mutex::new(EngineInner {
                audio_enabled: true,
                video_enabled: true,
                video_source: Some(VideoSourceKind::Camera),
                ..Default::default()
            }),
        })
    }

    /// Make each engine observe the other side's reset/close as a disconnect
    pub fn link_pair(a: &Arc<Self>, b: &Arc<Self>) {
        *a.partner.lock().unwrap() = Some(Arc::downgrade(b));
        *b.partner.lock().unwrap() = Some(Arc::downgrade(a));
    }

    /// Emit an engine event with the current generation
    pub fn emit(&self, kind: EngineEventKind) {
        let _ = self.events.send(EngineEvent {
            generation: self.generation.load(Ordering::SeqCst),
            kind,
        });
    }

    /// Force a connectivity state, as the transport layer would
    pub fn force_connectivity(&self, state: ConnectivityState) {
        if state != ConnectivityState::Connected {
            self.inner.lock().unwrap().connected = false;
        }
        self.emit(EngineEventKind::ConnectivityChanged(state));
    }

    /// Announce a discovered local connectivity candidate
    pub fn emit_local_candidate(&self, candidate: CandidateInit) {
        self.emit(EngineEventKind::LocalCandidate(candidate));
    }

    pub fn set_rtt(&self, rtt: Option<Duration>) {
        self.inner.lock().unwrap().rtt = rtt;
    }

    pub fn set_fail_screen_capture(&self, fail: bool) {
        self.inner.lock().unwrap().fail_screen_capture = fail;
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().local_description.clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().remote_description.clone()
    }

    pub fn applied_candidates(&self) -> Vec<CandidateInit> {
        self.inner.lock().unwrap().applied_candidates.clone()
    }

    pub fn applied_caps(&self) -> Vec<u32> {
        self.inner.lock().unwrap().applied_caps.clone()
    }

    pub fn offers_created(&self) -> u32 {
        self.inner.lock().unwrap().offers_created
    }

    pub fn restarts_created(&self) -> u32 {
        self.inner.lock().unwrap().restarts_created
    }

    pub fn audio_enabled(&self) -> bool {
        self.inner.lock().unwrap().audio_enabled
    }

    pub fn video_enabled(&self) -> bool {
        self.inner.lock().unwrap().video_enabled
    }

    pub fn video_source(&self) -> Option<VideoSourceKind> {
        self.inner.lock().unwrap().video_source
    }

    /// Report Checking then Connected once both descriptions are in place
    fn maybe_connect(&self, inner: &mut EngineInner) {
        if inner.connected
            || inner.local_description.is_none()
            || inner.remote_description.is_none()
        {
            return;
        }
        inner.connected = true;
        self.emit(EngineEventKind::ConnectivityChanged(ConnectivityState::Checking));
        self.emit(EngineEventKind::ConnectivityChanged(ConnectivityState::Connected));
    }

    fn notify_partner_disconnected(&self) {
        let partner = self.partner.lock().unwrap().clone();
        if let Some(partner) = partner.and_then(|p| p.upgrade()) {
            partner.force_connectivity(ConnectivityState::Disconnected);
        }
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn create_local_description(&self, kind: DescriptionKind) -> Result<SessionDescription> {
        let mut inner = self.inner.lock().unwrap();
        let blob = match kind {
            DescriptionKind::Offer => {
                inner.offers_created += 1;
                format!("{}-offer-{}", self.id, inner.offers_created)
            }
            DescriptionKind::Answer => {
                inner.answers_created += 1;
                format!("{}-answer-{}", self.id, inner.answers_created)
            }
        };
        Ok(SessionDescription { kind, blob })
    }

    async fn create_restart_description(&self) -> Result<SessionDescription> {
        let mut inner = self.inner.lock().unwrap();
        inner.restarts_created += 1;
        Ok(SessionDescription {
            kind: DescriptionKind::Offer,
            blob: format!("{}-restart-{}", self.id, inner.restarts_created),
        })
    }

    async fn apply_local_description(&self, description: &SessionDescription) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.local_description = Some(description.clone());
        self.maybe_connect(&mut inner);
        Ok(())
    }

    async fn apply_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.remote_description = Some(description.clone());
        self.maybe_connect(&mut inner);
        Ok(())
    }

    async fn rollback_local_description(&self) -> Result<()> {
        self.inner.lock().unwrap().local_description = None;
        Ok(())
    }

    async fn add_connectivity_candidate(&self, candidate: &CandidateInit) -> Result<()> {
        self.inner.lock().unwrap().applied_candidates.push(candidate.clone());
        Ok(())
    }

    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match kind {
            TrackKind::Audio => inner.audio_enabled = enabled,
            TrackKind::Video => inner.video_enabled = enabled,
        }
        Ok(())
    }

    async fn switch_video_source(&self, source: VideoSourceKind) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if source == VideoSourceKind::Screen && inner.fail_screen_capture {
            return Err(Error::CaptureDenied("display capture refused".to_string()));
        }
        inner.video_source = Some(source);
        Ok(())
    }

    async fn set_outgoing_bitrate_cap(&self, kbps: u32) -> Result<()> {
        self.inner.lock().unwrap().applied_caps.push(kbps);
        Ok(())
    }

    async fn statistics(&self) -> Result<TransportStats> {
        let inner = self.inner.lock().unwrap();
        Ok(TransportStats {
            round_trip_time: inner.rtt,
            packets_sent: 0,
            packets_received: 0,
        })
    }

    async fn reset(&self) -> Result<u64> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.local_description = None;
            inner.remote_description = None;
            inner.connected = false;
            inner.video_source = Some(VideoSourceKind::Camera);
        }
        self.notify_partner_disconnected();
        Ok(generation)
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().unwrap().connected = false;
        self.notify_partner_disconnected();
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Install the test log subscriber (RUST_LOG controls verbosity)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session configuration with intervals fast enough for tests
pub fn fast_config(peer_id: &str) -> SessionConfig {
    SessionConfig {
        peer_id: Some(peer_id.to_string()),
        discovery_interval: Duration::from_millis(50),
        disconnect_grace: Duration::from_millis(100),
        restart_window: Duration::from_millis(800),
        quality_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Wait until the observed snapshot satisfies the predicate
pub async fn wait_for(
    rx: &mut watch::Receiver<SessionSnapshot>,
    what: &str,
    predicate: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let snapshot = rx.borrow();
                if predicate(&snapshot) {
                    return snapshot.clone();
                }
            }
            if rx.changed().await.is_err() {
                panic!("snapshot channel closed while waiting for {}", what);
            }
        }
    })
    .await;

    match result {
        Ok(snapshot) => snapshot,
        Err(_) => panic!("timed out waiting for {}", what),
    }
}

/// Build an envelope as a scripted peer would send it
pub fn envelope_from(sender: &str, room: &str, payload: SignalPayload) -> SignalEnvelope {
    SignalEnvelope {
        room_id: room.to_string(),
        sender_id: sender.to_string(),
        payload,
    }
}

/// Shorthand candidate blob
pub fn candidate(n: u16) -> CandidateInit {
    CandidateInit {
        candidate: format!("candidate:{} 1 udp 2122260223 192.0.2.{} 54321 typ host", n, n),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(n),
    }
}
