//! Chat channel: the external messaging collaborator.
//!
//! The transport is a third-party chat relay reached over WebSocket; this
//! module only connects, logs in, sends private messages, and surfaces
//! inbound ones. Inbound messages are handed over through a plain `mpsc`
//! receiver taken once by the consumer — no listener hierarchy.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::queue::InboundMessage;

/// Channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("could not reach chat server: {0}")]
    Connection(String),
    #[error("login rejected for user \"{0}\"")]
    Auth(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("send timed out after {0:?}")]
    SendTimeout(Duration),
    #[error("channel is not connected")]
    NotConnected,
}

/// Connection settings for the chat relay.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Upper bound on a single send; expiry yields [`ChannelError::SendTimeout`].
    pub send_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1".to_string(),
            port: 5222,
            username: String::new(),
            password: String::new(),
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Frames exchanged with the chat relay (JSON over WebSocket text messages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RelayFrame {
    Login {
        user: String,
        password: String,
    },
    Message {
        to: String,
        from: String,
        body: String,
    },
}

/// Outbound seam used by the replication controller.
///
/// Implemented by [`ChannelSender`] for the real relay and by in-memory
/// stubs in tests.
pub trait MessageSender {
    fn send(
        &mut self,
        peer: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;
}

/// Cloneable sending handle bound to a connected [`ChatChannel`].
#[derive(Debug, Clone)]
pub struct ChannelSender {
    outgoing_tx: mpsc::Sender<RelayFrame>,
    from: String,
    send_timeout: Duration,
}

impl MessageSender for ChannelSender {
    async fn send(&mut self, peer: &str, body: &str) -> Result<(), ChannelError> {
        let frame = RelayFrame::Message {
            to: peer.to_string(),
            from: self.from.clone(),
            body: body.to_string(),
        };
        tokio::time::timeout(self.send_timeout, self.outgoing_tx.send(frame))
            .await
            .map_err(|_| ChannelError::SendTimeout(self.send_timeout))?
            .map_err(|_| ChannelError::NotConnected)
    }
}

/// WebSocket client for the chat relay.
///
/// `connect` spawns a writer task fed by an outgoing channel and a reader
/// task that forwards decoded message frames to the inbound channel.
pub struct ChatChannel {
    config: ChannelConfig,
    state: Arc<RwLock<ConnectionState>>,
    outgoing_tx: Option<mpsc::Sender<RelayFrame>>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
}

impl ChatChannel {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            inbound_rx: None,
        }
    }

    /// Take the inbound message receiver (can only be called once).
    pub fn take_inbound_rx(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Connect to the relay and log in.
    pub async fn connect(&mut self) -> Result<(), ChannelError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("ws://{}:{}", self.config.server, self.config.port);
        let (ws_stream, _) = match tokio_tungstenite::connect_async(&url).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ChannelError::Connection(e.to_string()));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Login frame goes out before anything else.
        let login = RelayFrame::Login {
            user: self.config.username.clone(),
            password: self.config.password.clone(),
        };
        let text =
            serde_json::to_string(&login).map_err(|e| ChannelError::Send(e.to_string()))?;
        if let Err(e) = ws_writer.send(Message::Text(text.into())).await {
            *self.state.write().await = ConnectionState::Disconnected;
            return Err(ChannelError::Auth(format!(
                "{}: {e}",
                self.config.username
            )));
        }
        info!("logged in to {} as {}", url, self.config.username);

        // Writer task: forward outgoing frames to the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<RelayFrame>(256);
        self.outgoing_tx = Some(out_tx);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("dropping unencodable frame: {e}");
                        continue;
                    }
                };
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: decode message frames, forward to the consumer.
        let (in_tx, in_rx) = mpsc::channel::<InboundMessage>(256);
        self.inbound_rx = Some(in_rx);
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                        Ok(RelayFrame::Message { from, body, .. }) => {
                            let _ = in_tx.send(InboundMessage::new(from, body)).await;
                        }
                        Ok(RelayFrame::Login { .. }) => {}
                        Err(e) => warn!("ignoring undecodable relay frame: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            info!("chat channel closed");
        });

        *self.state.write().await = ConnectionState::Connected;
        Ok(())
    }

    /// Sending handle for the replication controller.
    pub fn sender(&self) -> Result<ChannelSender, ChannelError> {
        let outgoing_tx = self
            .outgoing_tx
            .clone()
            .ok_or(ChannelError::NotConnected)?;
        Ok(ChannelSender {
            outgoing_tx,
            from: self.config.username.clone(),
            send_timeout: self.config.send_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_disconnected() {
        let channel = ChatChannel::new(ChannelConfig::default());
        assert_eq!(
            channel.connection_state().await,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_connection_error() {
        let mut channel = ChatChannel::new(ChannelConfig {
            server: "127.0.0.1".to_string(),
            port: 1, // nothing listens here
            username: "alice".to_string(),
            ..ChannelConfig::default()
        });
        let err = channel.connect().await.unwrap_err();
        assert!(matches!(err, ChannelError::Connection(_)));
        assert_eq!(
            channel.connection_state().await,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn test_sender_before_connect_is_not_connected() {
        let channel = ChatChannel::new(ChannelConfig::default());
        assert_eq!(channel.sender().unwrap_err(), ChannelError::NotConnected);
    }

    #[tokio::test]
    async fn test_channel_sender_frames_messages() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut sender = ChannelSender {
            outgoing_tx: tx,
            from: "alice".to_string(),
            send_timeout: Duration::from_secs(1),
        };

        sender.send("bob", "hello").await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            RelayFrame::Message {
                to: "bob".to_string(),
                from: "alice".to_string(),
                body: "hello".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_channel_sender_closed_channel_errors() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let mut sender = ChannelSender {
            outgoing_tx: tx,
            from: "alice".to_string(),
            send_timeout: Duration::from_secs(1),
        };
        assert_eq!(
            sender.send("bob", "hello").await.unwrap_err(),
            ChannelError::NotConnected
        );
    }

    #[test]
    fn test_relay_frame_wire_shape() {
        let frame = RelayFrame::Message {
            to: "bob".to_string(),
            from: "alice".to_string(),
            body: "<fmcmd cmd=\"RequestMapSharing\" user=\"alice\"/>".to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["kind"], "message");
        assert_eq!(json["to"], "bob");

        let login = RelayFrame::Login {
            user: "alice".to_string(),
            password: "secret".to_string(),
        };
        let json = serde_json::to_value(&login).unwrap();
        assert_eq!(json["kind"], "login");
    }
}
