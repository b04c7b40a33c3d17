//! Orchestrates action replication between the local document and the
//! chat channel.
//!
//! Local edits arrive as captured [`ActionPair`]s, get encoded and sent to
//! every peer with an accepted session. Inbound text is classified as a
//! control command (routed to the session negotiator) or an edit payload
//! (queued FIFO and applied to the document through the [`ActionApplier`]
//! seam). While an inbound action is being applied, local sending is
//! disabled so the resulting document mutation cannot be re-captured and
//! echoed back to its origin.
//!
//! The controller is driven from a single task; exactly one inbound message
//! is processed at a time, which is what makes the `sending_enabled` boolean
//! a sufficient echo guard for a two-party session. It is not safe for
//! concurrently-applying remote messages.

use arbor_core::{ActionApplier, ActionPair};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::{ChannelError, MessageSender};
use crate::codec::{self, CodecError, PayloadKind};
use crate::queue::{CommandQueue, InboundMessage};
use crate::session::{ControlCommand, SessionError, SessionNegotiator, SessionState};

/// Notifications for the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollabEvent {
    /// A peer asked to share the map; answer with `respond_sharing`.
    SharingRequested { from: String },
    SharingAccepted { by: String },
    SharingDeclined { by: String },
    SharingStopped { by: String },
    /// A remote edit was applied to the local document.
    RemoteActionApplied { from: String },
}

/// Controller errors. Errors from processing inbound messages are contained
/// and logged instead; these surface only from locally initiated operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Replication orchestrator, generic over the outbound send seam and the
/// document-mutation seam.
pub struct ReplicationController<S, A> {
    user: String,
    sender: S,
    applier: A,
    negotiator: SessionNegotiator,
    queue: CommandQueue,
    sending_enabled: bool,
    event_tx: mpsc::Sender<CollabEvent>,
    event_rx: Option<mpsc::Receiver<CollabEvent>>,
}

impl<S: MessageSender, A: ActionApplier> ReplicationController<S, A> {
    pub fn new(user: impl Into<String>, sender: S, applier: A) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            user: user.into(),
            sender,
            applier,
            negotiator: SessionNegotiator::new(),
            queue: CommandQueue::new(),
            sending_enabled: true,
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<CollabEvent>> {
        self.event_rx.take()
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn sending_enabled(&self) -> bool {
        self.sending_enabled
    }

    pub fn session_state(&self, peer: &str) -> SessionState {
        self.negotiator.state_of(peer)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Access the document-mutation collaborator.
    pub fn applier(&self) -> &A {
        &self.applier
    }

    pub fn applier_mut(&mut self) -> &mut A {
        &mut self.applier
    }

    fn emit(&self, event: CollabEvent) {
        // Best-effort: a host that stops draining loses notifications, not
        // document edits.
        if let Err(e) = self.event_tx.try_send(event) {
            debug!("dropping collab event: {e}");
        }
    }

    /// Ask `peer` to start sharing the map.
    pub async fn request_sharing(&mut self, peer: &str) -> Result<(), ControllerError> {
        self.negotiator.request(peer)?;
        let cmd = ControlCommand::request(&self.user);
        self.sender.send(peer, &cmd.encode()).await?;
        info!("requested map sharing with {peer}");
        Ok(())
    }

    /// Answer a sharing request previously received from `peer`.
    pub async fn respond_sharing(
        &mut self,
        peer: &str,
        accept: bool,
    ) -> Result<(), ControllerError> {
        self.negotiator.respond(peer, accept)?;
        let cmd = if accept {
            ControlCommand::accept(&self.user)
        } else {
            ControlCommand::decline(&self.user)
        };
        self.sender.send(peer, &cmd.encode()).await?;
        info!(
            "{} map sharing with {peer}",
            if accept { "accepted" } else { "declined" }
        );
        Ok(())
    }

    /// Stop the session with `peer` and discard anything still queued from
    /// them.
    pub async fn stop_sharing(&mut self, peer: &str) -> Result<(), ControllerError> {
        self.negotiator.stop(peer)?;
        let discarded = self.queue.discard_from(peer);
        if discarded > 0 {
            info!("discarded {discarded} queued messages from stopped peer {peer}");
        }
        let cmd = ControlCommand::stop(&self.user);
        self.sender.send(peer, &cmd.encode()).await?;
        info!("stopped map sharing with {peer}");
        Ok(())
    }

    /// Tear a stopped session down to Idle so a new handshake can start.
    pub fn reset_session(&mut self, peer: &str) {
        self.negotiator.reset(peer);
    }

    /// Ship a locally committed edit to every accepted peer.
    ///
    /// Returns whether anything was sent. Suppressed while a remote action
    /// is being applied, so the apply's own mutations never echo back.
    pub async fn on_local_edit(&mut self, pair: &ActionPair) -> Result<bool, ControllerError> {
        if !self.sending_enabled {
            debug!("sending disabled; suppressing local edit");
            return Ok(false);
        }
        let peers: Vec<String> = self
            .negotiator
            .accepted_peers()
            .map(str::to_string)
            .collect();
        if peers.is_empty() {
            return Ok(false);
        }

        let body = codec::encode(pair)?;
        for peer in &peers {
            self.sender.send(peer, &body).await?;
        }
        Ok(true)
    }

    /// Handle one raw message from the channel.
    ///
    /// All failures are contained to this message: logged, dropped, and the
    /// controller keeps processing subsequent messages.
    pub fn on_channel_message(&mut self, sender: &str, raw: &str) {
        match codec::classify(raw) {
            PayloadKind::Control => self.handle_control(sender, raw),
            PayloadKind::Edit => {
                self.queue.enqueue(InboundMessage::new(sender, raw));
                // One message consumed per receipt event; arrivals during a
                // slow apply accumulate at the tail and keep FIFO order.
                self.process_next();
            }
        }
    }

    /// Pump the channel's inbound receiver until it closes. The task running
    /// this loop is the single mutation context for the document.
    pub async fn drive(&mut self, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = inbound_rx.recv().await {
            self.on_channel_message(&msg.sender, &msg.body);
        }
        info!("channel closed; replication loop ending");
    }

    fn handle_control(&mut self, transport_sender: &str, raw: &str) {
        let cmd = match ControlCommand::decode(raw) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("dropping bad control message from {transport_sender}: {e}");
                return;
            }
        };
        // The identity inside the tag is authoritative; the transport sender
        // is only logged.
        let peer = cmd.user().to_string();

        match self.negotiator.on_remote(&cmd) {
            Ok(SessionState::Stopped) => {
                let discarded = self.queue.discard_from(&peer);
                if discarded > 0 {
                    info!("discarded {discarded} queued messages from stopped peer {peer}");
                }
                self.emit(CollabEvent::SharingStopped { by: peer });
            }
            Ok(SessionState::RequestReceived) => {
                self.emit(CollabEvent::SharingRequested { from: peer });
            }
            Ok(SessionState::Accepted) => {
                self.emit(CollabEvent::SharingAccepted { by: peer });
            }
            Ok(SessionState::Declined) => {
                self.emit(CollabEvent::SharingDeclined { by: peer });
            }
            Ok(state) => debug!("session with {peer} now {state:?}"),
            // Log and ignore: state unchanged, session intact.
            Err(violation) => warn!("{violation}; ignoring"),
        }
    }

    /// Apply the oldest queued message, if any.
    fn process_next(&mut self) {
        let Some(msg) = self.queue.dequeue_front() else {
            return;
        };
        if self.negotiator.state_of(&msg.sender) != SessionState::Accepted {
            warn!(
                "dropping edit from {} with no accepted session",
                msg.sender
            );
            return;
        }
        let pair = match codec::decode(&msg.body) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("dropping undecodable edit from {}: {e}", msg.sender);
                return;
            }
        };

        // Strict order: decode, disable sending, mutate, re-enable. There is
        // no early return between the two flag writes, so the flag is
        // restored on every exit path.
        self.sending_enabled = false;
        let applied = self.applier.execute_action(&pair);
        self.sending_enabled = true;

        match applied {
            Ok(()) => self.emit(CollabEvent::RemoteActionApplied { from: msg.sender }),
            Err(e) => warn!("failed to apply edit from {}: {e}", msg.sender),
        }
    }
}
