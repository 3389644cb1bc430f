//! JSON wire protocol spoken over the relay WebSocket.
//!
//! Inbound frames have the shape `{type, target?, data, conversationId?}`
//! and are decoded exactly once, at the transport boundary, into a
//! [`ClientMessage`]. Anything that does not decode is dropped there.
//! Outbound frames are [`ServerMessage`]s: either a relayed signal, whose
//! `type` is the original signal kind, or a relay notice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::AUTH_TAG;
use crate::error::ProtocolError;
use crate::types::{ConversationId, UserId};

/// The seven call-signaling message kinds the relay forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    CallStart,
    CallEnd,
    CallAccept,
    CallReject,
}

impl SignalKind {
    pub const ALL: [SignalKind; 7] = [
        SignalKind::Offer,
        SignalKind::Answer,
        SignalKind::IceCandidate,
        SignalKind::CallStart,
        SignalKind::CallEnd,
        SignalKind::CallAccept,
        SignalKind::CallReject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::CallStart => "call-start",
            SignalKind::CallEnd => "call-end",
            SignalKind::CallAccept => "call-accept",
            SignalKind::CallReject => "call-reject",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == tag)
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// Loose shape of every inbound frame before it is classified.
///
/// A sender-supplied `from` field is deliberately not read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    target: Option<UserId>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    user_id: Option<UserId>,
}

/// A call-signaling message as received from its sender.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalMessage {
    pub kind: SignalKind,
    pub target: UserId,
    /// Opaque to the relay.
    pub payload: Value,
    pub conversation_id: Option<ConversationId>,
}

impl SignalMessage {
    /// Attach the verified sender identity, producing the frame delivered
    /// to the target.
    pub fn relay(self, sender: UserId) -> RelayedSignal {
        RelayedSignal {
            kind: self.kind,
            from: sender,
            data: self.payload,
            conversation_id: self.conversation_id,
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Bind the connection to an identity already verified upstream.
    Auth { user_id: UserId },
    Signal(SignalMessage),
}

impl ClientMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: InboundFrame = serde_json::from_str(text)?;

        if frame.kind == AUTH_TAG {
            let user_id = frame
                .user_id
                .filter(|u| !u.is_empty())
                .ok_or(ProtocolError::MissingIdentity)?;
            return Ok(ClientMessage::Auth { user_id });
        }

        let kind = SignalKind::from_tag(&frame.kind)
            .ok_or_else(|| ProtocolError::UnknownType(frame.kind.clone()))?;
        let target = frame
            .target
            .filter(|t| !t.is_empty())
            .ok_or(ProtocolError::MissingTarget(kind))?;

        Ok(ClientMessage::Signal(SignalMessage {
            kind,
            target,
            payload: frame.data,
            conversation_id: frame.conversation_id,
        }))
    }
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A signal as delivered to its target, tagged with the verified sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedSignal {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub from: UserId,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// A stored message, as pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Frames the relay itself originates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Notice {
    AuthOk {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    NewMessage {
        #[serde(rename = "conversationId")]
        conversation_id: ConversationId,
        message: MessageEvent,
    },
    /// Only sent when the server is configured to surface it.
    Unreachable { target: UserId, kind: SignalKind },
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Signal(RelayedSignal),
    Notice(Notice),
}

impl ServerMessage {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl From<RelayedSignal> for ServerMessage {
    fn from(signal: RelayedSignal) -> Self {
        ServerMessage::Signal(signal)
    }
}

impl From<Notice> for ServerMessage {
    fn from(notice: Notice) -> Self {
        ServerMessage::Notice(notice)
    }
}
