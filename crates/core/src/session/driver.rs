//! The session driver: a single-actor event loop over all session inputs
//!
//! One driver task owns every piece of mutable session state. User commands,
//! relay messages, engine events, and timer ticks are funneled into one
//! `select!` loop and each is handled to completion before the next, which is
//! what makes the offer/answer transitions safe without locks. Handlers that
//! suspend on an engine call re-check sub-state on entry instead of holding
//! assumptions across awaits, so a duplicate offer queued behind an in-flight
//! apply is resolved by state, not by exclusion.

use crate::config::SessionConfig;
use crate::engine::{
    ConnectivityState, DescriptionKind, EngineEvent, EngineEventKind, MediaEngine,
    SessionDescription,
};
use crate::media::{MediaState, TrackKind, VideoSourceKind};
use crate::session::arbiter;
use crate::session::candidates::CandidateBuffer;
use crate::session::media_control::MediaController;
use crate::session::quality;
use crate::session::state::{PeerInfo, Role, SessionSnapshot, SessionStatus, SignalingState};
use crate::signaling::{CandidateInit, RelayEvent, RelayTransport, SignalEnvelope, SignalPayload};
use crate::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// User-initiated operations delivered to the driver
pub(crate) enum Command {
    Leave {
        reply: oneshot::Sender<Result<()>>,
    },
    ToggleAudio {
        reply: oneshot::Sender<Result<bool>>,
    },
    ToggleVideo {
        reply: oneshot::Sender<Result<bool>>,
    },
    ToggleScreenShare {
        reply: oneshot::Sender<Result<bool>>,
    },
    ManualReconnect {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// The outstanding local offer, kept verbatim for idempotent re-publish
struct LocalOffer {
    blob: String,
    restart: bool,
}

/// Single-writer owner of all session state
pub(crate) struct SessionDriver {
    config: SessionConfig,
    room_id: String,
    local: PeerInfo,

    relay: Arc<dyn RelayTransport>,
    engine: Arc<dyn MediaEngine>,

    commands: mpsc::Receiver<Command>,
    relay_rx: broadcast::Receiver<RelayEvent>,
    engine_rx: broadcast::Receiver<EngineEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,

    role: Role,
    signaling: SignalingState,
    connectivity: ConnectivityState,
    remote: Option<PeerInfo>,
    local_offer: Option<LocalOffer>,
    have_remote_description: bool,
    candidates: CandidateBuffer,
    media: MediaController,
    remote_media: MediaState,
    quality_score: u8,
    applied_cap: Option<u32>,
    engine_generation: u64,

    discovering: bool,
    reset_discovery: bool,
    grace_deadline: Option<Instant>,
    restart_deadline: Option<Instant>,
    failed: bool,
    closed: bool,
}

impl SessionDriver {
    pub(crate) fn new(
        config: SessionConfig,
        room_id: String,
        local: PeerInfo,
        relay: Arc<dyn RelayTransport>,
        engine: Arc<dyn MediaEngine>,
        commands: mpsc::Receiver<Command>,
        snapshot_tx: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let relay_rx = relay.subscribe();
        let engine_rx = engine.subscribe();
        let engine_generation = engine.generation();
        let media = MediaController::new(Arc::clone(&engine));

        Self {
            config,
            room_id,
            local,
            relay,
            engine,
            commands,
            relay_rx,
            engine_rx,
            snapshot_tx,
            role: Role::Unassigned,
            signaling: SignalingState::Stable,
            connectivity: ConnectivityState::New,
            remote: None,
            local_offer: None,
            have_remote_description: false,
            candidates: CandidateBuffer::new(),
            media,
            remote_media: MediaState::default(),
            quality_score: 0,
            applied_cap: None,
            engine_generation,
            discovering: false,
            reset_discovery: false,
            grace_deadline: None,
            restart_deadline: None,
            failed: false,
            closed: false,
        }
    }

    /// Run the session until it is left or every handle is dropped
    pub(crate) async fn run(mut self) {
        info!(room = %self.room_id, peer = %self.local.peer_id, "joined room");

        self.discovering = true;
        self.announce().await;
        self.publish_snapshot();

        let mut discovery = interval(self.config.discovery_interval);
        discovery.set_missed_tick_behavior(MissedTickBehavior::Delay);
        discovery.reset();

        let mut sampling = interval(self.config.quality_interval);
        sampling.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // Every handle dropped: tear the session down.
                    None => {
                        let _ = self.shutdown().await;
                    }
                },

                event = self.relay_rx.recv() => match event {
                    Ok(event) => self.handle_relay_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // The discovery loop's periodic resend recovers
                        // whatever control messages were dropped here.
                        warn!(missed, "relay event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("relay event stream closed");
                        let _ = self.shutdown().await;
                    }
                },

                event = self.engine_rx.recv() => match event {
                    Ok(event) => self.handle_engine_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "engine event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!("engine event stream closed");
                        let _ = self.shutdown().await;
                    }
                },

                _ = discovery.tick(), if self.discovering => self.announce().await,

                _ = sampling.tick(), if self.connectivity == ConnectivityState::Connected => {
                    self.sample_quality().await;
                }

                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    self.handle_deadline().await;
                }
            }

            if std::mem::take(&mut self.reset_discovery) {
                discovery.reset();
            }

            self.publish_snapshot();

            if self.closed {
                break;
            }
        }

        info!(room = %self.room_id, "session ended");
    }

    // ========================================================================
    // Relay input
    // ========================================================================

    async fn handle_relay_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Message(envelope) => {
                // The relay is a broadcast medium: our own envelopes echo
                // back and must be dropped before any other handling.
                if envelope.sender_id == self.local.peer_id {
                    return;
                }
                if envelope.room_id != self.room_id {
                    return;
                }
                if let Some(target) = envelope.target() {
                    if target != self.local.peer_id {
                        return;
                    }
                }
                self.handle_envelope(envelope).await;
            }
            RelayEvent::PeerJoined(peer_id) => {
                // Announce promptly so the newcomer discovers us without
                // waiting out a full discovery interval.
                if peer_id != self.local.peer_id && self.discovering {
                    self.announce().await;
                }
            }
            RelayEvent::PeerLeft(peer_id) => {
                if self.is_current_remote(&peer_id) {
                    info!(peer = %peer_id, "relay reported peer departure");
                    self.force_close(true).await;
                }
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: SignalEnvelope) {
        let sender = envelope.sender_id;
        match envelope.payload {
            SignalPayload::Join { display_name } => self.handle_join(sender, display_name).await,
            SignalPayload::Offer { description, .. } => {
                self.handle_offer(sender, description, false).await;
            }
            SignalPayload::IceRestart { description, .. } => {
                self.handle_offer(sender, description, true).await;
            }
            SignalPayload::Answer { description, .. } => {
                self.handle_answer(sender, description).await;
            }
            SignalPayload::IceCandidate { candidate, .. } => {
                self.handle_candidate(sender, candidate).await;
            }
            SignalPayload::Leave => {
                if self.is_current_remote(&sender) {
                    info!(peer = %sender, "peer left the room");
                    self.force_close(true).await;
                }
            }
            SignalPayload::MediaStatus { kind, enabled } => {
                if self.is_current_remote(&sender) {
                    self.remote_media.set_enabled(kind, enabled);
                }
            }
            SignalPayload::ScreenShareStatus { active } => {
                if self.is_current_remote(&sender) {
                    self.remote_media.screen_sharing = active;
                }
            }
        }
    }

    async fn handle_join(&mut self, sender: String, display_name: String) {
        match &mut self.remote {
            Some(remote) if remote.peer_id == sender => {
                remote.display_name = display_name;
                // Duplicate announcement: at-least-once delivery, or our
                // offer never arrived. Re-publishing the existing offer
                // verbatim repairs the lost-offer case without producing a
                // second negotiation.
                if self.signaling == SignalingState::HaveLocalOffer {
                    self.republish_local_offer().await;
                } else {
                    self.maybe_offer().await;
                }
            }
            Some(other) => {
                warn!(
                    current = %other.peer_id,
                    joining = %sender,
                    "ignoring additional participant in two-party room"
                );
            }
            None => {
                info!(peer = %sender, "discovered remote peer");
                self.remote = Some(PeerInfo {
                    peer_id: sender.clone(),
                    display_name,
                });
                self.role = arbiter::decide_role(&self.local.peer_id, &sender);
                info!(role = ?self.role, "role assigned for this epoch");

                if self.discovering {
                    self.announce().await;
                }
                self.maybe_offer().await;
            }
        }
    }

    async fn handle_offer(&mut self, sender: String, blob: String, restart: bool) {
        // The relay is unordered; an offer may outrun its join announcement
        // and then it doubles as discovery.
        if self.remote.is_none() {
            self.remote = Some(PeerInfo {
                peer_id: sender.clone(),
                display_name: sender.clone(),
            });
            self.role = arbiter::decide_role(&self.local.peer_id, &sender);
            info!(peer = %sender, role = ?self.role, "discovered remote peer via offer");
        }

        if !self.is_current_remote(&sender) {
            debug!(peer = %sender, "discarding offer from stale sender");
            return;
        }

        if self.signaling == SignalingState::HaveLocalOffer {
            // Glare: both sides produced an offer for the same epoch. The
            // polite side rolls back and answers; the Caller's offer wins.
            if !arbiter::is_polite(self.role) {
                debug!("offer collision, keeping our own offer");
                return;
            }

            info!("offer collision, rolling back local offer");
            if let Err(e) = self.engine.rollback_local_description().await {
                warn!("rollback failed: {}", e);
                return;
            }
            self.signaling = SignalingState::Stable;
            self.local_offer = None;
        }

        if restart {
            debug!("answering connectivity restart offer");
        }

        if let Err(e) = self.accept_offer(sender, blob).await {
            self.signaling = SignalingState::Stable;
            warn!("failed to answer offer: {}", e);
        }
    }

    async fn accept_offer(&mut self, sender: String, blob: String) -> Result<()> {
        let remote_description = SessionDescription {
            kind: DescriptionKind::Offer,
            blob,
        };

        self.signaling = SignalingState::HaveRemoteOffer;
        self.engine
            .apply_remote_description(&remote_description)
            .await?;
        self.on_remote_description_applied().await;

        let answer = self
            .engine
            .create_local_description(DescriptionKind::Answer)
            .await?;
        self.engine.apply_local_description(&answer).await?;
        self.signaling = SignalingState::Stable;

        self.send_payload(SignalPayload::Answer {
            target: sender,
            description: answer.blob,
        })
        .await;

        Ok(())
    }

    async fn handle_answer(&mut self, sender: String, blob: String) {
        if self.signaling != SignalingState::HaveLocalOffer || !self.is_current_remote(&sender) {
            debug!(peer = %sender, "discarding stale answer");
            return;
        }

        let remote_description = SessionDescription {
            kind: DescriptionKind::Answer,
            blob,
        };

        match self
            .engine
            .apply_remote_description(&remote_description)
            .await
        {
            Ok(()) => {
                self.signaling = SignalingState::Stable;
                self.local_offer = None;
                self.on_remote_description_applied().await;
            }
            Err(e) => {
                // Stay in HaveLocalOffer: the next duplicate announcement
                // re-publishes our offer and yields a fresh answer.
                warn!("failed to apply answer: {}", e);
            }
        }
    }

    async fn handle_candidate(&mut self, sender: String, candidate: CandidateInit) {
        if self.is_current_remote(&sender) && self.have_remote_description {
            if let Err(e) = self.engine.add_connectivity_candidate(&candidate).await {
                warn!("failed to apply candidate: {}", e);
            }
        } else {
            // Early or unmatched candidates wait for a remote description;
            // the drain filters out anything from a different sender.
            self.candidates.enqueue(sender, candidate);
        }
    }

    // ========================================================================
    // Negotiation steps
    // ========================================================================

    /// Produce an offer if this side initiates and nothing is in flight
    async fn maybe_offer(&mut self) {
        if self.role != Role::Caller || self.signaling != SignalingState::Stable {
            return;
        }
        if matches!(
            self.connectivity,
            ConnectivityState::Connected | ConnectivityState::Checking
        ) {
            return;
        }
        let Some(remote) = self.remote.clone() else {
            return;
        };

        if let Err(e) = self.produce_offer(&remote.peer_id, false).await {
            warn!("failed to produce offer: {}", e);
        }
    }

    async fn produce_offer(&mut self, target: &str, restart: bool) -> Result<()> {
        let description = if restart {
            self.engine.create_restart_description().await?
        } else {
            self.engine
                .create_local_description(DescriptionKind::Offer)
                .await?
        };
        self.engine.apply_local_description(&description).await?;

        self.signaling = SignalingState::HaveLocalOffer;
        self.local_offer = Some(LocalOffer {
            blob: description.blob.clone(),
            restart,
        });

        debug!(to = %target, restart, "publishing local offer");
        self.send_offer_payload(target.to_string(), description.blob, restart)
            .await;
        Ok(())
    }

    async fn republish_local_offer(&mut self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let Some(offer) = self.local_offer.as_ref() else {
            return;
        };

        debug!("re-publishing outstanding local offer verbatim");
        let (blob, restart) = (offer.blob.clone(), offer.restart);
        self.send_offer_payload(remote.peer_id, blob, restart).await;
    }

    async fn send_offer_payload(&mut self, target: String, blob: String, restart: bool) {
        let payload = if restart {
            SignalPayload::IceRestart {
                target,
                description: blob,
            }
        } else {
            SignalPayload::Offer {
                target,
                description: blob,
            }
        };
        self.send_payload(payload).await;
    }

    /// Drain the candidate buffer exactly once per applied remote description
    async fn on_remote_description_applied(&mut self) {
        self.have_remote_description = true;

        let drained = self.candidates.drain();
        if drained.is_empty() {
            return;
        }

        debug!(count = drained.len(), "draining buffered candidates");
        for record in drained {
            if !self.is_current_remote(&record.peer_id) {
                debug!(peer = %record.peer_id, "dropping candidate from stale sender");
                continue;
            }
            if let Err(e) = self.engine.add_connectivity_candidate(&record.candidate).await {
                warn!("failed to apply buffered candidate: {}", e);
            }
        }
    }

    // ========================================================================
    // Engine input
    // ========================================================================

    async fn handle_engine_event(&mut self, event: EngineEvent) {
        // Results of operations abandoned by a reset arrive stamped with an
        // old generation and must not leak into the fresh epoch.
        if event.generation != self.engine_generation {
            debug!(
                event_generation = event.generation,
                current = self.engine_generation,
                "discarding stale engine event"
            );
            return;
        }

        match event.kind {
            EngineEventKind::ConnectivityChanged(state) => self.on_connectivity(state).await,
            EngineEventKind::LocalCandidate(candidate) => {
                let target = self.remote.as_ref().map(|r| r.peer_id.clone());
                self.send_payload(SignalPayload::IceCandidate { target, candidate })
                    .await;
            }
            EngineEventKind::RemoteTrackReceived(kind) => {
                debug!(?kind, "remote track received");
            }
            EngineEventKind::VideoSourceEnded(VideoSourceKind::Screen) => {
                if let Some(payload) = self.media.screen_source_ended().await {
                    info!("screen share ended by the capture source");
                    self.send_payload(payload).await;
                }
            }
            EngineEventKind::VideoSourceEnded(_) => {}
        }
    }

    async fn on_connectivity(&mut self, state: ConnectivityState) {
        if state != self.connectivity {
            info!(from = ?self.connectivity, to = ?state, "connectivity changed");
        }
        self.connectivity = state;

        match state {
            ConnectivityState::Connected => {
                // Stop announcing the moment the path is confirmed.
                self.discovering = false;
                self.grace_deadline = None;
                self.restart_deadline = None;
                self.failed = false;
            }
            ConnectivityState::Disconnected => {
                self.quality_score = 0;
                if self.grace_deadline.is_none() {
                    self.grace_deadline = Some(Instant::now() + self.config.disconnect_grace);
                }
            }
            ConnectivityState::Failed => {
                self.quality_score = 0;
                self.trigger_connectivity_restart().await;
            }
            ConnectivityState::Closed => {
                self.quality_score = 0;
            }
            ConnectivityState::New | ConnectivityState::Checking => {}
        }
    }

    /// Re-run connectivity checks on the existing description pair
    async fn trigger_connectivity_restart(&mut self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };

        self.grace_deadline = None;
        if self.restart_deadline.is_none() {
            self.restart_deadline = Some(Instant::now() + self.config.restart_window);
        }

        if self.signaling == SignalingState::HaveLocalOffer {
            // A restart offer is already outstanding; resend it.
            self.republish_local_offer().await;
            return;
        }

        info!("requesting connectivity restart");
        if let Err(e) = self.produce_offer(&remote.peer_id, true).await {
            warn!("connectivity restart failed: {}", e);
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn next_deadline(&self) -> Option<Instant> {
        match (self.grace_deadline, self.restart_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle_deadline(&mut self) {
        let now = Instant::now();

        if self.grace_deadline.is_some_and(|d| d <= now) {
            self.grace_deadline = None;
            if self.connectivity == ConnectivityState::Disconnected {
                info!("disconnect persisted past the grace window, escalating");
                self.trigger_connectivity_restart().await;
            }
        }

        if self.restart_deadline.is_some_and(|d| d <= now) {
            self.restart_deadline = None;
            if self.connectivity != ConnectivityState::Connected {
                warn!("connectivity restart did not converge");
                self.failed = true;
            }
        }
    }

    async fn announce(&mut self) {
        self.send_payload(SignalPayload::Join {
            display_name: self.local.display_name.clone(),
        })
        .await;
    }

    async fn sample_quality(&mut self) {
        let stats = match self.engine.statistics().await {
            Ok(stats) => stats,
            Err(e) => {
                debug!("statistics unavailable: {}", e);
                return;
            }
        };

        let score = quality::score_sample(&stats, &self.config.rtt_thresholds_ms);
        if score != self.quality_score {
            debug!(
                from = self.quality_score,
                to = score,
                rtt = ?stats.round_trip_time,
                "quality score changed"
            );
            self.quality_score = score;
        }

        let cap = quality::cap_for_score(score, &self.config.bitrate_caps_kbps);
        if self.applied_cap != Some(cap) {
            match self.engine.set_outgoing_bitrate_cap(cap).await {
                Ok(()) => {
                    debug!(cap_kbps = cap, "applied outgoing bitrate cap");
                    self.applied_cap = Some(cap);
                }
                Err(e) => warn!("failed to apply bitrate cap: {}", e),
            }
        }
    }

    // ========================================================================
    // User commands
    // ========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Leave { reply } => {
                let _ = reply.send(self.shutdown().await);
            }
            Command::ToggleAudio { reply } => {
                let _ = reply.send(self.toggle_track(TrackKind::Audio).await);
            }
            Command::ToggleVideo { reply } => {
                let _ = reply.send(self.toggle_track(TrackKind::Video).await);
            }
            Command::ToggleScreenShare { reply } => {
                let result = match self.media.toggle_screen_share().await {
                    Ok((active, payload)) => {
                        self.send_payload(payload).await;
                        Ok(active)
                    }
                    Err(e) => {
                        warn!("screen share toggle failed: {}", e);
                        Err(e)
                    }
                };
                let _ = reply.send(result);
            }
            Command::ManualReconnect { reply } => {
                info!("manual reconnect requested");
                self.force_close(true).await;
                let _ = reply.send(Ok(()));
            }
        }
    }

    async fn toggle_track(&mut self, kind: TrackKind) -> Result<bool> {
        let (enabled, payload) = self.media.toggle_track(kind).await?;
        self.send_payload(payload).await;
        Ok(enabled)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Close the current epoch and optionally resume discovery
    ///
    /// Discards every piece of negotiation state; no role, sub-state, or
    /// buffered candidate from this epoch survives into the next one.
    async fn force_close(&mut self, resume_discovery: bool) {
        info!("closing session epoch");

        match self.engine.reset().await {
            Ok(generation) => self.engine_generation = generation,
            Err(e) => warn!("engine reset failed: {}", e),
        }

        self.candidates.clear();
        self.remote = None;
        self.role = Role::Unassigned;
        self.signaling = SignalingState::Stable;
        self.connectivity = ConnectivityState::New;
        self.local_offer = None;
        self.have_remote_description = false;
        self.remote_media = MediaState::default();
        self.media.reset_screen_share();
        self.quality_score = 0;
        self.applied_cap = None;
        self.grace_deadline = None;
        self.restart_deadline = None;
        self.failed = false;

        if resume_discovery {
            self.discovering = true;
            self.reset_discovery = true;
            self.announce().await;
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.discovering = false;

        // Best-effort departure notice; peers that miss it still observe the
        // departure through relay presence.
        self.send_payload(SignalPayload::Leave).await;
        self.connectivity = ConnectivityState::Closed;
        self.engine.close().await
    }

    // ========================================================================
    // Output
    // ========================================================================

    async fn send_payload(&self, payload: SignalPayload) {
        let envelope = SignalEnvelope {
            room_id: self.room_id.clone(),
            sender_id: self.local.peer_id.clone(),
            payload,
        };

        if let Err(e) = self.relay.send(envelope).await {
            // Sends carry no delivery guarantee anyway; periodic resend and
            // idempotent payloads absorb the loss.
            warn!("relay send failed: {}", e);
        }
    }

    fn is_current_remote(&self, peer_id: &str) -> bool {
        self.remote.as_ref().is_some_and(|r| r.peer_id == peer_id)
    }

    fn derive_status(&self) -> SessionStatus {
        if self.closed {
            SessionStatus::Closed
        } else if self.failed {
            SessionStatus::Failed
        } else if matches!(
            self.connectivity,
            ConnectivityState::Disconnected | ConnectivityState::Failed
        ) || self.restart_deadline.is_some()
        {
            SessionStatus::Reconnecting
        } else if self.connectivity == ConnectivityState::Connected {
            SessionStatus::Connected
        } else if self.remote.is_some() {
            SessionStatus::Connecting
        } else {
            SessionStatus::Searching
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = SessionSnapshot {
            local_peer: self.local.clone(),
            remote_peer: self.remote.clone(),
            role: self.role,
            signaling: self.signaling,
            connectivity: self.connectivity,
            local_media: self.media.state(),
            remote_media: self.remote_media,
            quality_score: self.quality_score,
            status: self.derive_status(),
        };

        if *self.snapshot_tx.borrow() != snapshot {
            self.snapshot_tx.send_replace(snapshot);
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // Guarded out of the select arms; never actually polled.
        None => std::future::pending().await,
    }
}
