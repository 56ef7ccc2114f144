//! Status notifications emitted by the device.
//!
//! Each notification is a JSON object whose `event` field names the event:
//!
//! ```text
//! {"event": "start_ack"}
//! {"event": "chunk_ack", "seq": 4, "received_count": 5}
//! {"event": "stored", "digest": "<64 hex chars>"}
//! {"event": "hash_mismatch"}
//! {"event": "start_error", "msg": "invalid size"}
//! ```

use serde::Serialize;
use serde_json::{Map, Value};

/// Failure reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Timeout,
    HashMismatch,
    StartError,
    ChunkError,
    AssembleError,
}

impl FailureKind {
    /// Wire name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::HashMismatch => "hash_mismatch",
            Self::StartError => "start_error",
            Self::ChunkError => "chunk_error",
            Self::AssembleError => "assemble_error",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "timeout" => Some(Self::Timeout),
            "hash_mismatch" => Some(Self::HashMismatch),
            "start_error" => Some(Self::StartError),
            "chunk_error" => Some(Self::ChunkError),
            "assemble_error" => Some(Self::AssembleError),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure event with the device's optional explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFailure {
    pub kind: FailureKind,
    pub message: Option<String>,
}

impl std::fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Typed status event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    StartAck,
    ChunkAck { seq: u32, received_count: u32 },
    Stored { digest_hex: String },
    Failed(RemoteFailure),
    /// Event tag this version does not understand.
    Unknown(String),
}

/// Errors from decoding a status notification.
#[derive(Debug, thiserror::Error)]
pub enum StatusDecodeError {
    #[error("invalid status JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("status notification has no `event` tag")]
    MissingTag,

    #[error("`{event}` event missing field `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Default, Serialize)]
struct WireStatus {
    event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    received_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

/// Reads `field` as a `u32`, or `None` when absent or not a small integer.
fn u32_field(object: &Map<String, Value>, field: &str) -> Option<u32> {
    object
        .get(field)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn required_u32(
    object: &Map<String, Value>,
    event: &'static str,
    field: &'static str,
) -> Result<u32, StatusDecodeError> {
    u32_field(object, field).ok_or(StatusDecodeError::MissingField { event, field })
}

/// Any non-null `msg` is kept, as JSON text when it is not a string.
fn message_field(object: &Map<String, Value>) -> Option<String> {
    match object.get("msg")? {
        Value::Null => None,
        Value::String(msg) => Some(msg.clone()),
        other => Some(other.to_string()),
    }
}

impl StatusEvent {
    /// Decodes one notification payload.
    ///
    /// Only the `event` tag and the fields that event uses are checked.
    pub fn decode(payload: &[u8]) -> Result<Self, StatusDecodeError> {
        let value: Value = serde_json::from_slice(payload)?;
        let object = value.as_object().ok_or(StatusDecodeError::MissingTag)?;
        let tag = object
            .get("event")
            .and_then(Value::as_str)
            .ok_or(StatusDecodeError::MissingTag)?;

        let event = match tag {
            "start_ack" => Self::StartAck,
            "chunk_ack" => Self::ChunkAck {
                seq: required_u32(object, "chunk_ack", "seq")?,
                received_count: required_u32(object, "chunk_ack", "received_count")?,
            },
            // Older firmware acknowledges with the sequence number only.
            "ack" => {
                let seq = required_u32(object, "ack", "seq")?;
                Self::ChunkAck {
                    seq,
                    received_count: u32_field(object, "received_count")
                        .unwrap_or(seq.saturating_add(1)),
                }
            }
            "stored" => Self::Stored {
                digest_hex: object
                    .get("digest")
                    .or_else(|| object.get("sha256"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            tag => match FailureKind::from_tag(tag) {
                Some(kind) => Self::Failed(RemoteFailure {
                    kind,
                    message: message_field(object),
                }),
                None => Self::Unknown(tag.to_string()),
            },
        };
        Ok(event)
    }

    /// Encodes the event as the device would send it.
    pub fn encode(&self) -> Vec<u8> {
        let wire = match self {
            Self::StartAck => WireStatus {
                event: "start_ack".into(),
                ..Default::default()
            },
            Self::ChunkAck {
                seq,
                received_count,
            } => WireStatus {
                event: "chunk_ack".into(),
                seq: Some(*seq),
                received_count: Some(*received_count),
                ..Default::default()
            },
            Self::Stored { digest_hex } => WireStatus {
                event: "stored".into(),
                digest: Some(digest_hex.clone()),
                ..Default::default()
            },
            Self::Failed(failure) => WireStatus {
                event: failure.kind.as_str().into(),
                msg: failure.message.clone(),
                ..Default::default()
            },
            Self::Unknown(tag) => WireStatus {
                event: tag.clone(),
                ..Default::default()
            },
        };
        // A struct of strings and integers always serializes.
        serde_json::to_vec(&wire).unwrap_or_default()
    }

    /// Wire tag of the event.
    pub fn tag(&self) -> &str {
        match self {
            Self::StartAck => "start_ack",
            Self::ChunkAck { .. } => "chunk_ack",
            Self::Stored { .. } => "stored",
            Self::Failed(failure) => failure.kind.as_str(),
            Self::Unknown(tag) => tag,
        }
    }
}
