//! # arbor-collab — action replication between two Arbor editors
//!
//! Ships reversible document edits over an external chat network.
//!
//! ## Architecture
//!
//! ```text
//! local edit ── ActionPair ── codec::encode ──► ChatChannel ──► peer
//!
//! peer ──► ChatChannel ──► classify ─┬─ control ──► SessionNegotiator
//!                                    └─ edit ─► CommandQueue (FIFO)
//!                                                    │
//!                                     ReplicationController::process_next
//!                                                    │
//!                                        disable sending ─► ActionApplier
//!                                        re-enable sending   (document)
//! ```
//!
//! ## Modules
//!
//! - [`codec`] — text wire format for edit payloads (two-record container)
//! - [`queue`] — FIFO buffer of inbound messages
//! - [`session`] — request/accept/decline/stop handshake state machine
//! - [`channel`] — chat relay client (the external transport collaborator)
//! - [`controller`] — the replication orchestrator
//!
//! Errors from any single inbound message are contained to that message:
//! logged, dropped, and the session keeps running.

pub mod channel;
pub mod codec;
pub mod controller;
pub mod queue;
pub mod session;

pub use channel::{
    ChannelConfig, ChannelError, ChannelSender, ChatChannel, ConnectionState, MessageSender,
};
pub use codec::{CodecError, PayloadKind};
pub use controller::{CollabEvent, ControllerError, ReplicationController};
pub use queue::{CommandQueue, InboundMessage};
pub use session::{ControlCommand, SessionError, SessionNegotiator, SessionState};
