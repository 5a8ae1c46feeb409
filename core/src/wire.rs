//! Wire protocol: newline-delimited JSON frames exchanged over the
//! persistent bidirectional socket (spec.md §6).
//!
//! [`Frame`] is internally tagged on `"type"`, matching the table in
//! spec.md §6 exactly (`hello`, `welcome`, `subscribe`, `delta`, `ack`,
//! `subscribeComplete`, `ping`, `pong`, `error`). Payload field names are
//! `camelCase` on the wire (`documentId`, `seqAtOrigin`, ...) independent
//! of the `snake_case` Rust-side [`Delta`](crate::delta::Delta) type,
//! which [`DeltaFrame`] converts to and from.

use crate::clock::HybridStamp;
use crate::delta::{Delta, Op};
use crate::error::{Result, SyncError};
use crate::ids::{ClientId, DocumentId, FieldName, SessionId};
use crate::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Wire form of a [`HybridStamp`]: `{phys, log, client}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStamp {
    pub phys: u64,
    pub log: u32,
    pub client: ClientId,
}

impl From<&HybridStamp> for WireStamp {
    fn from(s: &HybridStamp) -> Self {
        Self {
            phys: s.physical_millis,
            log: s.logical_counter,
            client: s.client_id.clone(),
        }
    }
}

impl From<WireStamp> for HybridStamp {
    fn from(w: WireStamp) -> Self {
        HybridStamp::new(w.phys, w.log, w.client)
    }
}

/// Wire form of [`Op`]: `"set"` or `"del"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOp {
    Set,
    #[serde(rename = "del")]
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub client_id: ClientId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub protocol_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    pub session_id: SessionId,
    pub server_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribePayload {
    pub document_id: DocumentId,
    pub vector_clock: VectorClock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaFrame {
    pub document_id: DocumentId,
    pub field_name: FieldName,
    pub op: WireOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    pub stamp: WireStamp,
    pub origin_client: ClientId,
    pub seq_at_origin: u64,
}

impl From<&Delta> for DeltaFrame {
    fn from(d: &Delta) -> Self {
        let (op, value) = match &d.op {
            Op::Set(v) => (WireOp::Set, Some(v.clone())),
            Op::Delete => (WireOp::Delete, None),
        };
        Self {
            document_id: d.document_id.clone(),
            field_name: d.field_name.clone(),
            op,
            value,
            stamp: (&d.stamp).into(),
            origin_client: d.origin_client.clone(),
            seq_at_origin: d.seq_at_origin,
        }
    }
}

impl TryFrom<DeltaFrame> for Delta {
    type Error = SyncError;

    fn try_from(f: DeltaFrame) -> Result<Self> {
        let op = match f.op {
            WireOp::Set => Op::Set(
                f.value
                    .ok_or_else(|| SyncError::Protocol("set delta missing value".into()))?,
            ),
            WireOp::Delete => Op::Delete,
        };
        Ok(Delta {
            document_id: f.document_id,
            field_name: f.field_name,
            op,
            stamp: f.stamp.into(),
            origin_client: f.origin_client,
            seq_at_origin: f.seq_at_origin,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub origin_client: ClientId,
    pub seq_at_origin: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeCompletePayload {
    pub document_id: DocumentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingPongPayload {
    pub t: u64,
}

/// Error codes named in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireErrorCode {
    AuthFailed,
    Oversize,
    RateLimited,
    Internal,
}

impl From<&SyncError> for WireErrorCode {
    fn from(e: &SyncError) -> Self {
        match e {
            SyncError::AuthFailed(_) => WireErrorCode::AuthFailed,
            SyncError::Oversize { .. } => WireErrorCode::Oversize,
            SyncError::RateLimited(_) => WireErrorCode::RateLimited,
            _ => WireErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub code: WireErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonValue>,
}

/// One newline-delimited wire frame (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    Hello(HelloPayload),
    Welcome(WelcomePayload),
    Subscribe(SubscribePayload),
    Delta(DeltaFrame),
    Ack(AckPayload),
    SubscribeComplete(SubscribeCompletePayload),
    Ping(PingPongPayload),
    Pong(PingPongPayload),
    Error(ErrorPayload),
}

impl Frame {
    /// Encode as a single line, newline-terminated, ready to push onto a
    /// socket framed by `\n`.
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| SyncError::SerializationError(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }

    /// Decode a single line (leading/trailing whitespace tolerated).
    pub fn decode_line(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim())
            .map_err(|e| SyncError::DeserializationError(e.to_string()))
    }
}
