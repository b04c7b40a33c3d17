//! Text wire format for edit payloads.
//!
//! Two payload shapes travel over the chat channel:
//!
//! ```text
//! control:  <fmcmd cmd="RequestMapSharing" user="bob"/>
//! edit:     {"actions":[{"type":"set_node_text",...},{"type":"set_node_text",...}]}
//! ```
//!
//! An edit payload is a container wrapping exactly two action records,
//! do first, undo second. Order is positional, never tagged by name, so
//! `decode(encode(p)) == p` holds for every valid pair.

use arbor_core::{Action, ActionPair};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::session::ControlCommand;

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The payload does not parse as a container of exactly two records.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// An action record carries a type tag we do not recognize.
    #[error("unknown action type \"{0}\"")]
    UnknownActionType(String),
    /// Local serialization failure while encoding an outgoing payload.
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Coarse classification of inbound channel text.
///
/// Classification is by grammar shape only; full decoding (and its errors)
/// happens when the message is actually consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Control,
    Edit,
}

pub fn classify(raw: &str) -> PayloadKind {
    if raw.trim_start().starts_with(ControlCommand::WIRE_PREFIX) {
        PayloadKind::Control
    } else {
        PayloadKind::Edit
    }
}

#[derive(Serialize, Deserialize)]
struct EditContainer {
    actions: Vec<Value>,
}

/// Serialize an [`ActionPair`] to a transport payload.
pub fn encode(pair: &ActionPair) -> Result<String, CodecError> {
    let container = EditContainer {
        actions: vec![
            serde_json::to_value(pair.do_action())
                .map_err(|e| CodecError::Serialize(e.to_string()))?,
            serde_json::to_value(pair.undo_action())
                .map_err(|e| CodecError::Serialize(e.to_string()))?,
        ],
    };
    serde_json::to_string(&container).map_err(|e| CodecError::Serialize(e.to_string()))
}

/// Parse a transport payload back into an [`ActionPair`].
pub fn decode(text: &str) -> Result<ActionPair, CodecError> {
    let container: EditContainer = serde_json::from_str(text)
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))?;
    let [do_record, undo_record] = <[Value; 2]>::try_from(container.actions).map_err(
        |records: Vec<Value>| {
            CodecError::MalformedPayload(format!(
                "expected exactly 2 action records, got {}",
                records.len()
            ))
        },
    )?;

    let do_action = decode_record(do_record)?;
    let undo_action = decode_record(undo_record)?;
    Ok(ActionPair::new(do_action, undo_action))
}

fn decode_record(record: Value) -> Result<Action, CodecError> {
    let tag = record
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| CodecError::MalformedPayload("action record has no type tag".into()))?;
    if !Action::KNOWN_TYPES.contains(&tag) {
        return Err(CodecError::UnknownActionType(tag.to_string()));
    }
    serde_json::from_value(record).map_err(|e| CodecError::MalformedPayload(e.to_string()))
}
