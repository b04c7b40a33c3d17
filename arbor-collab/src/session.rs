//! Session-establishment handshake between two peers.
//!
//! Sharing starts with a request, which the other side accepts or declines;
//! either side may stop an established or pending session. State is tracked
//! independently per remote peer identity. A control command that is
//! well-formed but unexpected in the current state is a protocol violation:
//! it is reported to the caller, the state is left unchanged, and the caller
//! logs and continues — one peer's inconsistency never tears down the
//! session for anyone else.

use std::collections::HashMap;

use thiserror::Error;

use crate::codec::CodecError;

/// Negotiation status for one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// We asked this peer to share.
    RequestSent,
    /// This peer asked us to share.
    RequestReceived,
    Accepted,
    Declined,
    /// Torn down by either side; reset returns it to Idle.
    Stopped,
}

/// The four session-control commands of the wire protocol.
///
/// Each carries the sender's own identity as its sole payload field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    RequestMapSharing { user: String },
    AcceptMapSharing { user: String },
    DeclineMapSharing { user: String },
    StopMapSharing { user: String },
}

impl ControlCommand {
    /// Leading bytes that distinguish a control command from an edit payload.
    pub const WIRE_PREFIX: &'static str = "<fmcmd";

    pub fn request(user: impl Into<String>) -> Self {
        Self::RequestMapSharing { user: user.into() }
    }

    pub fn accept(user: impl Into<String>) -> Self {
        Self::AcceptMapSharing { user: user.into() }
    }

    pub fn decline(user: impl Into<String>) -> Self {
        Self::DeclineMapSharing { user: user.into() }
    }

    pub fn stop(user: impl Into<String>) -> Self {
        Self::StopMapSharing { user: user.into() }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestMapSharing { .. } => "RequestMapSharing",
            Self::AcceptMapSharing { .. } => "AcceptMapSharing",
            Self::DeclineMapSharing { .. } => "DeclineMapSharing",
            Self::StopMapSharing { .. } => "StopMapSharing",
        }
    }

    /// The peer identity carried by the command.
    pub fn user(&self) -> &str {
        match self {
            Self::RequestMapSharing { user }
            | Self::AcceptMapSharing { user }
            | Self::DeclineMapSharing { user }
            | Self::StopMapSharing { user } => user,
        }
    }

    /// Render as the self-closing wire tag.
    pub fn encode(&self) -> String {
        format!("<fmcmd cmd=\"{}\" user=\"{}\"/>", self.name(), self.user())
    }

    /// Parse a control tag. The grammar is fixed: one `cmd` attribute, one
    /// `user` attribute, in that order, self-closing.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let malformed =
            |detail: &str| CodecError::MalformedPayload(format!("control tag: {detail}"));

        let body = text
            .trim()
            .strip_prefix("<fmcmd ")
            .and_then(|t| t.strip_suffix("/>"))
            .ok_or_else(|| malformed("not a self-closing fmcmd element"))?;

        let rest = body
            .trim()
            .strip_prefix("cmd=\"")
            .ok_or_else(|| malformed("missing cmd attribute"))?;
        let (cmd, rest) = rest
            .split_once('"')
            .ok_or_else(|| malformed("unterminated cmd attribute"))?;
        let rest = rest
            .trim_start()
            .strip_prefix("user=\"")
            .ok_or_else(|| malformed("missing user attribute"))?;
        let (user, rest) = rest
            .split_once('"')
            .ok_or_else(|| malformed("unterminated user attribute"))?;
        if !rest.trim().is_empty() {
            return Err(malformed("trailing content after attributes"));
        }
        if user.is_empty() {
            return Err(malformed("empty user identity"));
        }

        match cmd {
            "RequestMapSharing" => Ok(Self::request(user)),
            "AcceptMapSharing" => Ok(Self::accept(user)),
            "DeclineMapSharing" => Ok(Self::decline(user)),
            "StopMapSharing" => Ok(Self::stop(user)),
            other => Err(CodecError::MalformedPayload(format!(
                "unknown control command \"{other}\""
            ))),
        }
    }
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A command arrived that makes no sense in the peer's current state,
    /// e.g. an accept with no outstanding request.
    #[error("unexpected {command} for peer \"{peer}\" in state {state:?}")]
    ProtocolViolation {
        peer: String,
        command: &'static str,
        state: SessionState,
    },
}

/// Per-peer handshake state machine.
#[derive(Debug, Default)]
pub struct SessionNegotiator {
    states: HashMap<String, SessionState>,
}

impl SessionNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a peer; unknown peers are Idle.
    pub fn state_of(&self, peer: &str) -> SessionState {
        self.states.get(peer).copied().unwrap_or_default()
    }

    pub fn is_accepted(&self, peer: &str) -> bool {
        self.state_of(peer) == SessionState::Accepted
    }

    /// Peers with an established session.
    pub fn accepted_peers(&self) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(|(_, s)| **s == SessionState::Accepted)
            .map(|(p, _)| p.as_str())
    }

    fn transition(
        &mut self,
        peer: &str,
        command: &'static str,
        expected: &[SessionState],
        next: SessionState,
    ) -> Result<SessionState, SessionError> {
        let current = self.state_of(peer);
        if !expected.contains(&current) {
            return Err(SessionError::ProtocolViolation {
                peer: peer.to_string(),
                command,
                state: current,
            });
        }
        self.states.insert(peer.to_string(), next);
        Ok(next)
    }

    /// Local: we are asking `peer` to share.
    pub fn request(&mut self, peer: &str) -> Result<SessionState, SessionError> {
        self.transition(
            peer,
            "RequestMapSharing",
            &[SessionState::Idle],
            SessionState::RequestSent,
        )
    }

    /// Local: answer a request we previously received from `peer`.
    pub fn respond(&mut self, peer: &str, accept: bool) -> Result<SessionState, SessionError> {
        let (command, next) = if accept {
            ("AcceptMapSharing", SessionState::Accepted)
        } else {
            ("DeclineMapSharing", SessionState::Declined)
        };
        self.transition(peer, command, &[SessionState::RequestReceived], next)
    }

    /// Local: stop a session with `peer`, from any non-Idle state.
    pub fn stop(&mut self, peer: &str) -> Result<SessionState, SessionError> {
        self.transition(
            peer,
            "StopMapSharing",
            &[
                SessionState::RequestSent,
                SessionState::RequestReceived,
                SessionState::Accepted,
                SessionState::Declined,
            ],
            SessionState::Stopped,
        )
    }

    /// Remote: apply a control command received from the channel.
    ///
    /// On violation the state is unchanged; the caller logs and continues.
    pub fn on_remote(&mut self, cmd: &ControlCommand) -> Result<SessionState, SessionError> {
        let peer = cmd.user();
        match cmd {
            ControlCommand::RequestMapSharing { .. } => self.transition(
                peer,
                "RequestMapSharing",
                &[SessionState::Idle],
                SessionState::RequestReceived,
            ),
            ControlCommand::AcceptMapSharing { .. } => self.transition(
                peer,
                "AcceptMapSharing",
                &[SessionState::RequestSent],
                SessionState::Accepted,
            ),
            ControlCommand::DeclineMapSharing { .. } => self.transition(
                peer,
                "DeclineMapSharing",
                &[SessionState::RequestSent],
                SessionState::Declined,
            ),
            ControlCommand::StopMapSharing { .. } => self.transition(
                peer,
                "StopMapSharing",
                &[
                    SessionState::RequestSent,
                    SessionState::RequestReceived,
                    SessionState::Accepted,
                    SessionState::Declined,
                ],
                SessionState::Stopped,
            ),
        }
    }

    /// Tear a stopped or declined session down to Idle.
    pub fn reset(&mut self, peer: &str) {
        self.states.remove(peer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_command_wire_roundtrip() {
        let commands = [
            ControlCommand::request("bob"),
            ControlCommand::accept("alice"),
            ControlCommand::decline("alice"),
            ControlCommand::stop("bob"),
        ];
        for cmd in commands {
            let wire = cmd.encode();
            assert!(wire.starts_with(ControlCommand::WIRE_PREFIX));
            assert_eq!(ControlCommand::decode(&wire).unwrap(), cmd);
        }
    }

    #[test]
    fn test_control_command_exact_wire_shape() {
        assert_eq!(
            ControlCommand::request("bob").encode(),
            "<fmcmd cmd=\"RequestMapSharing\" user=\"bob\"/>"
        );
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        for bad in [
            "<fmcmd cmd=\"RequestMapSharing\" user=\"bob\">",
            "<fmcmd user=\"bob\"/>",
            "<fmcmd cmd=\"RequestMapSharing\"/>",
            "<fmcmd cmd=\"RequestMapSharing\" user=\"\"/>",
            "<fmcmd cmd=\"RequestMapSharing\" user=\"bob\" extra=\"x\"/>",
            "plain text",
        ] {
            assert!(
                matches!(
                    ControlCommand::decode(bad),
                    Err(CodecError::MalformedPayload(_))
                ),
                "expected malformed: {bad}"
            );
        }
    }

    #[test]
    fn test_decode_rejects_unknown_command_name() {
        let err =
            ControlCommand::decode("<fmcmd cmd=\"PauseMapSharing\" user=\"bob\"/>").unwrap_err();
        assert!(matches!(err, CodecError::MalformedPayload(_)));
    }

    #[test]
    fn test_accept_while_idle_is_violation_and_state_unchanged() {
        let mut negotiator = SessionNegotiator::new();
        let err = negotiator
            .on_remote(&ControlCommand::accept("bob"))
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::ProtocolViolation {
                peer: "bob".to_string(),
                command: "AcceptMapSharing",
                state: SessionState::Idle,
            }
        );
        assert_eq!(negotiator.state_of("bob"), SessionState::Idle);
    }

    #[test]
    fn test_request_accept_handshake_both_sides() {
        // Peer A ("alice") requests; peer B ("bob") accepts.
        let mut alice = SessionNegotiator::new();
        let mut bob = SessionNegotiator::new();

        alice.request("bob").unwrap();
        assert_eq!(alice.state_of("bob"), SessionState::RequestSent);

        bob.on_remote(&ControlCommand::request("alice")).unwrap();
        assert_eq!(bob.state_of("alice"), SessionState::RequestReceived);

        bob.respond("alice", true).unwrap();
        assert_eq!(bob.state_of("alice"), SessionState::Accepted);

        alice.on_remote(&ControlCommand::accept("bob")).unwrap();
        assert_eq!(alice.state_of("bob"), SessionState::Accepted);
    }

    #[test]
    fn test_decline_path() {
        let mut alice = SessionNegotiator::new();
        alice.request("bob").unwrap();
        alice.on_remote(&ControlCommand::decline("bob")).unwrap();
        assert_eq!(alice.state_of("bob"), SessionState::Declined);
    }

    #[test]
    fn test_stop_from_any_non_idle_state() {
        for setup in [
            SessionState::RequestSent,
            SessionState::RequestReceived,
            SessionState::Accepted,
            SessionState::Declined,
        ] {
            let mut negotiator = SessionNegotiator::new();
            negotiator.states.insert("bob".to_string(), setup);
            assert_eq!(negotiator.stop("bob").unwrap(), SessionState::Stopped);
        }

        let mut idle = SessionNegotiator::new();
        assert!(idle.stop("bob").is_err());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut negotiator = SessionNegotiator::new();
        negotiator.request("bob").unwrap();
        negotiator.stop("bob").unwrap();
        negotiator.reset("bob");
        assert_eq!(negotiator.state_of("bob"), SessionState::Idle);
        // A fresh request is possible again.
        negotiator.request("bob").unwrap();
    }

    #[test]
    fn test_state_is_tracked_per_peer() {
        let mut negotiator = SessionNegotiator::new();
        negotiator.request("bob").unwrap();
        negotiator
            .on_remote(&ControlCommand::request("carol"))
            .unwrap();

        assert_eq!(negotiator.state_of("bob"), SessionState::RequestSent);
        assert_eq!(negotiator.state_of("carol"), SessionState::RequestReceived);
        assert_eq!(negotiator.state_of("dave"), SessionState::Idle);
    }

    #[test]
    fn test_accepted_peers() {
        let mut negotiator = SessionNegotiator::new();
        negotiator.request("bob").unwrap();
        negotiator.on_remote(&ControlCommand::accept("bob")).unwrap();
        negotiator.request("carol").unwrap();

        let accepted: Vec<&str> = negotiator.accepted_peers().collect();
        assert_eq!(accepted, vec!["bob"]);
        assert!(negotiator.is_accepted("bob"));
        assert!(!negotiator.is_accepted("carol"));
    }

    #[test]
    fn test_duplicate_request_is_violation() {
        let mut negotiator = SessionNegotiator::new();
        negotiator.on_remote(&ControlCommand::request("bob")).unwrap();
        let err = negotiator
            .on_remote(&ControlCommand::request("bob"))
            .unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation { .. }));
        assert_eq!(negotiator.state_of("bob"), SessionState::RequestReceived);
    }
}
