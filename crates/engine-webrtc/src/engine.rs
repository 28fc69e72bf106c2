//! MediaEngine implementation over an RTCPeerConnection

use crate::tracks;
use async_trait::async_trait;
use pairlink_core::{
    CandidateInit, ConnectivityState, DescriptionKind, EngineEvent, EngineEventKind, Error,
    MediaEngine, Result, SessionConfig, SessionDescription, TrackKind, TransportStats,
    TurnServerConfig, VideoSourceKind,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine as RtcMediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::stats::StatsReportType;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// ICE server settings carried across connection rebuilds
#[derive(Clone)]
struct IceSettings {
    stun_servers: Vec<String>,
    turn_servers: Vec<TurnServerConfig>,
}

/// One peer connection with its outgoing tracks and senders
struct Connection {
    pc: Arc<RTCPeerConnection>,
    audio_track: Arc<TrackLocalStaticSample>,
    camera_track: Arc<TrackLocalStaticSample>,
    screen_track: Option<Arc<TrackLocalStaticSample>>,
    // Senders are retained so the tracks are not cleaned up under us.
    #[allow(dead_code)]
    audio_sender: Arc<RTCRtpSender>,
    video_sender: Arc<RTCRtpSender>,
    active_source: VideoSourceKind,
    remote_tracks: Arc<std::sync::Mutex<Vec<Arc<TrackRemote>>>>,
}

/// Media engine backed by webrtc-rs
///
/// One underlying `RTCPeerConnection` exists at a time; glare rollback and
/// epoch resets rebuild it. Handlers registered on a superseded connection
/// stop emitting the moment the connection sequence advances, and every
/// event carries the engine generation so the session driver can discard
/// results of abandoned operations.
pub struct WebRtcEngine {
    settings: IceSettings,
    generation: AtomicU64,
    connection_seq: Arc<AtomicU64>,
    events: broadcast::Sender<EngineEvent>,
    connection: RwLock<Connection>,
    audio_enabled: AtomicBool,
    video_enabled: AtomicBool,
    bitrate_cap: watch::Sender<Option<u32>>,
}

impl WebRtcEngine {
    /// Create the engine and its first underlying connection
    pub async fn new(config: &SessionConfig) -> Result<Arc<Self>> {
        let settings = IceSettings {
            stun_servers: config.stun_servers.clone(),
            turn_servers: config.turn_servers.clone(),
        };

        let (events, _) = broadcast::channel(256);
        let connection_seq = Arc::new(AtomicU64::new(0));
        let connection =
            build_connection(&settings, events.clone(), 0, 0, Arc::clone(&connection_seq)).await?;
        let (bitrate_cap, _) = watch::channel(None);

        Ok(Arc::new(Self {
            settings,
            generation: AtomicU64::new(0),
            connection_seq,
            events,
            connection: RwLock::new(connection),
            audio_enabled: AtomicBool::new(true),
            video_enabled: AtomicBool::new(true),
            bitrate_cap,
        }))
    }

    /// The outgoing audio track the application writes samples into
    pub async fn audio_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.connection.read().await.audio_track)
    }

    /// The outgoing video track currently wired to the session
    pub async fn active_video_track(&self) -> Arc<TrackLocalStaticSample> {
        let connection = self.connection.read().await;
        match connection.active_source {
            VideoSourceKind::Camera => Arc::clone(&connection.camera_track),
            VideoSourceKind::Screen => connection
                .screen_track
                .as_ref()
                .map(Arc::clone)
                .unwrap_or_else(|| Arc::clone(&connection.camera_track)),
        }
    }

    /// Remote tracks received so far, for the application to render
    pub async fn remote_tracks(&self) -> Vec<Arc<TrackRemote>> {
        self.connection.read().await.remote_tracks.lock().unwrap().clone()
    }

    /// Mute gate consulted by the sample writers
    pub fn track_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.audio_enabled.load(Ordering::SeqCst),
            TrackKind::Video => self.video_enabled.load(Ordering::SeqCst),
        }
    }

    /// Watch the advisory encoder ceiling in kbps (`None` = unlimited)
    pub fn bitrate_cap_watch(&self) -> watch::Receiver<Option<u32>> {
        self.bitrate_cap.subscribe()
    }

    /// Report that the OS-level capture behind the active source stopped
    ///
    /// Called by the capture glue when display sharing is ended outside the
    /// application; the session driver reverts to the camera in response.
    pub fn notify_video_source_ended(&self, source: VideoSourceKind) {
        self.emit(EngineEventKind::VideoSourceEnded(source));
    }

    fn emit(&self, kind: EngineEventKind) {
        let _ = self.events.send(EngineEvent {
            generation: self.generation.load(Ordering::SeqCst),
            kind,
        });
    }

    /// Tear down the current connection and wire up a fresh one
    async fn rebuild(&self) -> Result<()> {
        let seq = self.connection_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.load(Ordering::SeqCst);

        let fresh = build_connection(
            &self.settings,
            self.events.clone(),
            generation,
            seq,
            Arc::clone(&self.connection_seq),
        )
        .await?;

        let old = {
            let mut connection = self.connection.write().await;
            std::mem::replace(&mut *connection, fresh)
        };

        if let Err(e) = old.pc.close().await {
            warn!("closing superseded connection failed: {}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn create_local_description(&self, kind: DescriptionKind) -> Result<SessionDescription> {
        let pc = Arc::clone(&self.connection.read().await.pc);

        let description = match kind {
            DescriptionKind::Offer => pc
                .create_offer(None)
                .await
                .map_err(|e| Error::NegotiationError(format!("Failed to create offer: {}", e)))?,
            DescriptionKind::Answer => pc
                .create_answer(None)
                .await
                .map_err(|e| Error::NegotiationError(format!("Failed to create answer: {}", e)))?,
        };

        Ok(SessionDescription {
            kind,
            blob: description.sdp,
        })
    }

    async fn create_restart_description(&self) -> Result<SessionDescription> {
        let pc = Arc::clone(&self.connection.read().await.pc);

        let offer = pc
            .create_offer(Some(RTCOfferOptions {
                ice_restart: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to create restart offer: {}", e)))?;

        Ok(SessionDescription {
            kind: DescriptionKind::Offer,
            blob: offer.sdp,
        })
    }

    async fn apply_local_description(&self, description: &SessionDescription) -> Result<()> {
        let pc = Arc::clone(&self.connection.read().await.pc);
        let description = parse_description(description)?;

        pc.set_local_description(description)
            .await
            .map_err(|e| Error::NegotiationError(format!("Failed to set local description: {}", e)))
    }

    async fn apply_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let pc = Arc::clone(&self.connection.read().await.pc);
        let description = parse_description(description)?;

        pc.set_remote_description(description)
            .await
            .map_err(|e| {
                Error::NegotiationError(format!("Failed to set remote description: {}", e))
            })
    }

    async fn rollback_local_description(&self) -> Result<()> {
        // webrtc-rs has no first-class rollback; a fresh connection restores
        // the pre-offer state for the same epoch.
        debug!("rolling back local offer by rebuilding the connection");
        self.rebuild().await
    }

    async fn add_connectivity_candidate(&self, candidate: &CandidateInit) -> Result<()> {
        let pc = Arc::clone(&self.connection.read().await.pc);

        let init = RTCIceCandidateInit {
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };

        pc.add_ice_candidate(init)
            .await
            .map_err(|e| Error::CandidateError(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> Result<()> {
        // The track stays attached; the sample writer consults the gate and
        // pauses, which is what keeps this renegotiation-free.
        match kind {
            TrackKind::Audio => self.audio_enabled.store(enabled, Ordering::SeqCst),
            TrackKind::Video => self.video_enabled.store(enabled, Ordering::SeqCst),
        }
        debug!(?kind, enabled, "track gate updated");
        Ok(())
    }

    async fn switch_video_source(&self, source: VideoSourceKind) -> Result<()> {
        let mut connection = self.connection.write().await;
        if connection.active_source == source {
            return Ok(());
        }

        let replacement: Arc<TrackLocalStaticSample> = match source {
            VideoSourceKind::Camera => Arc::clone(&connection.camera_track),
            VideoSourceKind::Screen => {
                let track = connection
                    .screen_track
                    .get_or_insert_with(tracks::screen_track);
                Arc::clone(track)
            }
        };

        connection
            .video_sender
            .replace_track(Some(replacement as Arc<dyn TrackLocal + Send + Sync>))
            .await
            .map_err(|e| Error::MediaTrackError(format!("Failed to substitute track: {}", e)))?;

        connection.active_source = source;
        info!(?source, "outgoing video source substituted");
        Ok(())
    }

    async fn set_outgoing_bitrate_cap(&self, kbps: u32) -> Result<()> {
        // Advisory: the encoding side observes the watch channel and lowers
        // its target; nothing is dropped here.
        self.bitrate_cap.send_replace(Some(kbps));
        Ok(())
    }

    async fn statistics(&self) -> Result<TransportStats> {
        let pc = Arc::clone(&self.connection.read().await.pc);
        let report = pc.get_stats().await;

        let mut stats = TransportStats::default();
        for (_id, entry) in report.reports.iter() {
            if let StatsReportType::CandidatePair(pair) = entry {
                if !pair.nominated {
                    continue;
                }
                if pair.current_round_trip_time > 0.0 {
                    stats.round_trip_time =
                        Some(Duration::from_secs_f64(pair.current_round_trip_time));
                }
                stats.packets_sent = pair.packets_sent as u64;
                stats.packets_received = pair.packets_received as u64;
            }
        }

        Ok(stats)
    }

    async fn reset(&self) -> Result<u64> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "resetting engine");
        self.rebuild().await?;
        Ok(generation)
    }

    async fn close(&self) -> Result<()> {
        // Kill the handlers first so a late state change from the closing
        // connection is never observed.
        self.connection_seq.fetch_add(1, Ordering::SeqCst);

        let pc = Arc::clone(&self.connection.read().await.pc);
        pc.close()
            .await
            .map_err(|e| Error::EngineError(format!("Failed to close connection: {}", e)))
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}

/// Map the connection state callback into the session's connectivity field
pub fn map_connection_state(state: RTCPeerConnectionState) -> Option<ConnectivityState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectivityState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectivityState::Checking),
        RTCPeerConnectionState::Connected => Some(ConnectivityState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectivityState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectivityState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectivityState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn parse_description(description: &SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.kind {
        DescriptionKind::Offer => RTCSessionDescription::offer(description.blob.clone()),
        DescriptionKind::Answer => RTCSessionDescription::answer(description.blob.clone()),
    };
    parsed.map_err(|e| Error::NegotiationError(format!("Failed to parse description: {}", e)))
}

/// Build one peer connection with outgoing tracks and event forwarding
async fn build_connection(
    settings: &IceSettings,
    events: broadcast::Sender<EngineEvent>,
    generation: u64,
    seq: u64,
    live_seq: Arc<AtomicU64>,
) -> Result<Connection> {
    let mut media_engine = RtcMediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| Error::EngineError(format!("Failed to register codecs: {}", e)))?;

    let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
        .map_err(|e| Error::EngineError(format!("Failed to register interceptors: {}", e)))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(interceptor_registry)
        .build();

    let ice_servers: Vec<RTCIceServer> = settings
        .stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .chain(settings.turn_servers.iter().map(|turn| RTCIceServer {
            urls: vec![turn.url.clone()],
            username: turn.username.clone(),
            credential: turn.credential.clone(),
        }))
        .collect();

    let rtc_config = RTCConfiguration {
        ice_servers,
        ..Default::default()
    };

    let pc = Arc::new(api.new_peer_connection(rtc_config).await.map_err(|e| {
        Error::EngineError(format!("Failed to create peer connection: {}", e))
    })?);

    // Outgoing tracks; the application feeds samples, the session drives
    // everything else.
    let audio_track = tracks::audio_track();
    let camera_track = tracks::camera_track();

    let audio_sender = pc
        .add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| Error::MediaTrackError(format!("Failed to add audio track: {}", e)))?;
    let video_sender = pc
        .add_track(Arc::clone(&camera_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| Error::MediaTrackError(format!("Failed to add video track: {}", e)))?;

    // Connectivity callback, mapped 1:1 into session connectivity. The
    // live_seq check silences handlers of superseded connections.
    {
        let events = events.clone();
        let live_seq = Arc::clone(&live_seq);
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            if live_seq.load(Ordering::SeqCst) == seq {
                if let Some(connectivity) = map_connection_state(state) {
                    let _ = events.send(EngineEvent {
                        generation,
                        kind: EngineEventKind::ConnectivityChanged(connectivity),
                    });
                }
            }
            Box::pin(async {})
        }));
    }

    // Local candidate discovery, forwarded for the session to publish.
    {
        let events = events.clone();
        let live_seq = Arc::clone(&live_seq);
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if live_seq.load(Ordering::SeqCst) == seq {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(EngineEvent {
                                generation,
                                kind: EngineEventKind::LocalCandidate(CandidateInit {
                                    candidate: init.candidate,
                                    sdp_mid: init.sdp_mid,
                                    sdp_mline_index: init.sdp_mline_index,
                                }),
                            });
                        }
                        Err(e) => warn!("failed to serialize local candidate: {}", e),
                    }
                } else {
                    debug!("candidate gathering complete");
                }
            }
            Box::pin(async {})
        }));
    }

    // Remote track arrival.
    let remote_tracks: Arc<std::sync::Mutex<Vec<Arc<TrackRemote>>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let events = events.clone();
        let live_seq = Arc::clone(&live_seq);
        let remote_tracks = Arc::clone(&remote_tracks);
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            if live_seq.load(Ordering::SeqCst) == seq {
                let kind = match track.kind() {
                    RTPCodecType::Audio => Some(TrackKind::Audio),
                    RTPCodecType::Video => Some(TrackKind::Video),
                    RTPCodecType::Unspecified => None,
                };
                if let Some(kind) = kind {
                    remote_tracks.lock().unwrap().push(Arc::clone(&track));
                    let _ = events.send(EngineEvent {
                        generation,
                        kind: EngineEventKind::RemoteTrackReceived(kind),
                    });
                }
            }
            Box::pin(async {})
        }));
    }

    Ok(Connection {
        pc,
        audio_track,
        camera_track,
        screen_track: None,
        audio_sender,
        video_sender,
        active_source: VideoSourceKind::Camera,
        remote_tracks,
    })
}
