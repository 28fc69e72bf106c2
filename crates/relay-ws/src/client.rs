//! WebSocket relay client

use crate::frame::RelayFrame;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use pairlink_core::{Error, RelayEvent, RelayTransport, Result, SignalEnvelope};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, warn};
use url::Url;

/// Relay transport over a WebSocket connection to a room relay service
///
/// A writer task owns the socket sink and drains an outbound queue; a reader
/// task decodes inbound frames at the transport boundary and publishes typed
/// [`RelayEvent`]s. Dropping the relay aborts both tasks.
pub struct WsRelay {
    events: broadcast::Sender<RelayEvent>,
    outbound: mpsc::Sender<Message>,
    tasks: Vec<JoinHandle<()>>,
}

impl WsRelay {
    /// Connect to the relay and subscribe to a room
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Relay URL (ws:// or wss://)
    /// * `room_id` - Room to subscribe to
    /// * `peer_id` - Local identifier announced to the relay
    pub async fn connect(
        endpoint: &str,
        room_id: impl Into<String>,
        peer_id: impl Into<String>,
    ) -> Result<Arc<Self>> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::InvalidConfig(format!("Invalid relay URL: {}", e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(Error::InvalidConfig(format!(
                "Relay URL must be ws:// or wss://: {}",
                endpoint
            )));
        }

        info!(%url, "connecting to relay");
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::RelayError(format!("Relay connection failed: {}", e)))?;
        let (mut sink, mut source) = stream.split();

        // Subscribe before anything else so the relay starts broadcasting
        // the room to us.
        let subscribe = RelayFrame::Subscribe {
            room_id: room_id.into(),
            peer_id: peer_id.into(),
        };
        let text = serde_json::to_string(&subscribe)
            .map_err(|e| Error::SerializationError(format!("Failed to encode subscribe: {}", e)))?;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| Error::RelayError(format!("Relay subscribe failed: {}", e)))?;

        let (events, _) = broadcast::channel(256);
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(64);

        // Writer task: owns the sink, drains the outbound queue.
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    warn!("relay write failed: {}", e);
                    break;
                }
            }
            debug!("relay writer stopped");
        });

        // Reader task: decodes frames into typed events at the boundary.
        let event_tx = events.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<RelayFrame>(&text) {
                        Ok(frame) => {
                            if let Some(event) = frame_to_event(frame) {
                                let _ = event_tx.send(event);
                            }
                        }
                        Err(e) => warn!("discarding malformed relay frame: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        info!("relay closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("relay read failed: {}", e);
                        break;
                    }
                }
            }
            debug!("relay reader stopped");
        });

        Ok(Arc::new(Self {
            events,
            outbound,
            tasks: vec![writer, reader],
        }))
    }

    /// Close the relay connection
    pub async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None)).await;
    }
}

impl Drop for WsRelay {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn frame_to_event(frame: RelayFrame) -> Option<RelayEvent> {
    match frame {
        RelayFrame::Signal { envelope } => Some(RelayEvent::Message(envelope)),
        RelayFrame::PeerJoined { peer_id } => Some(RelayEvent::PeerJoined(peer_id)),
        RelayFrame::PeerLeft { peer_id } => Some(RelayEvent::PeerLeft(peer_id)),
        // Subscribe only travels client → relay.
        RelayFrame::Subscribe { .. } => None,
    }
}

#[async_trait]
impl RelayTransport for WsRelay {
    async fn send(&self, envelope: SignalEnvelope) -> Result<()> {
        let frame = RelayFrame::Signal { envelope };
        let text = serde_json::to_string(&frame)
            .map_err(|e| Error::SerializationError(format!("Failed to encode frame: {}", e)))?;

        self.outbound
            .send(Message::Text(text))
            .await
            .map_err(|_| Error::RelayError("Relay connection is gone".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }
}
