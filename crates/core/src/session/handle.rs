//! Public handle to a running call session

use crate::config::SessionConfig;
use crate::engine::MediaEngine;
use crate::session::driver::{Command, SessionDriver};
use crate::session::state::{PeerInfo, SessionSnapshot};
use crate::signaling::RelayTransport;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::instrument;

/// A one-to-one call session within a room
///
/// Created by [`CallSession::join`], which spawns the driver task owning all
/// session state. The handle is cheap to clone; the session tears itself
/// down when [`CallSession::leave`] is called or every handle is dropped.
#[derive(Clone)]
pub struct CallSession {
    commands: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    local_peer: PeerInfo,
}

impl CallSession {
    /// Join a room and start searching for the remote participant
    ///
    /// # Arguments
    ///
    /// * `config` - Session configuration (validated here)
    /// * `room_id` - Room both participants agreed on out-of-band
    /// * `display_name` - Name announced to the remote participant
    /// * `relay` - Control-message relay transport
    /// * `engine` - Media engine driven by the session
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration fails validation.
    #[instrument(skip_all, fields(room_id = %room_id.as_ref()))]
    pub fn join(
        config: SessionConfig,
        room_id: impl AsRef<str>,
        display_name: impl Into<String>,
        relay: Arc<dyn RelayTransport>,
        engine: Arc<dyn MediaEngine>,
    ) -> Result<Self> {
        config.validate()?;

        let local_peer = PeerInfo {
            peer_id: config
                .peer_id
                .clone()
                .unwrap_or_else(|| format!("peer-{}", uuid::Uuid::new_v4())),
            display_name: display_name.into(),
        };

        let (command_tx, command_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::initial(local_peer.clone()));

        let driver = SessionDriver::new(
            config,
            room_id.as_ref().to_string(),
            local_peer.clone(),
            relay,
            engine,
            command_rx,
            snapshot_tx,
        );
        tokio::spawn(driver.run());

        Ok(Self {
            commands: command_tx,
            snapshot_rx,
            local_peer,
        })
    }

    /// Leave the room and close the session
    pub async fn leave(&self) -> Result<()> {
        self.request(|reply| Command::Leave { reply }).await
    }

    /// Mute or unmute the microphone; returns the new enabled flag
    pub async fn toggle_audio(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleAudio { reply }).await
    }

    /// Disable or enable the camera; returns the new enabled flag
    pub async fn toggle_video(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleVideo { reply }).await
    }

    /// Start or stop substituting the screen for outgoing video
    ///
    /// Returns the new sharing flag. A capture refusal surfaces as
    /// `Error::CaptureDenied` and leaves the session untouched.
    pub async fn toggle_screen_share(&self) -> Result<bool> {
        self.request(|reply| Command::ToggleScreenShare { reply })
            .await
    }

    /// Tear the session down and rediscover the peer from scratch
    ///
    /// Last-resort recovery for when automatic connectivity restart does not
    /// converge: discards all negotiation state and restarts discovery.
    pub async fn manual_reconnect(&self) -> Result<()> {
        self.request(|reply| Command::ManualReconnect { reply })
            .await
    }

    /// Watch the observable session state
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current observable session state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Local participant identity
    pub fn local_peer(&self) -> &PeerInfo {
        &self.local_peer
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::SessionClosed)?;
        reply_rx.await.map_err(|_| Error::SessionClosed)?
    }
}
