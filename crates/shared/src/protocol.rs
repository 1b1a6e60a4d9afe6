//! Wire frames exchanged over the chat WebSocket.
//!
//! Every frame is a single JSON text message with a `type` discriminator and
//! camelCase fields. The server uses the same shape family in both directions,
//! so the structs here back both [`OutboundFrame`] and [`InboundFrame`].

use serde::{Deserialize, Serialize};

/// `type` tag for a private chat frame.
pub const TYPE_CHAT: &str = "chat";
/// `type` tag for a group chat frame.
pub const TYPE_GROUP_CHAT: &str = "group_chat";

/// A private chat message between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub from_user_id: String,
    pub to_user_id: String,
    pub message: String,
}

/// A message addressed to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub from_user_id: String,
    pub group_id: String,
    pub message: String,
}

/// Frame sent by this client, serialized with its `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "chat")]
    Direct(DirectMessage),
    #[serde(rename = "group_chat")]
    Group(GroupMessage),
}

impl OutboundFrame {
    pub fn direct(from: impl Into<String>, to: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Direct(DirectMessage {
            from_user_id: from.into(),
            to_user_id: to.into(),
            message: text.into(),
        })
    }

    pub fn group(from: impl Into<String>, group: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Group(GroupMessage {
            from_user_id: from.into(),
            group_id: group.into(),
            message: text.into(),
        })
    }
}

/// Frame received from the server, as handed to message listeners.
///
/// Frames with a `type` other than the two chat tags (for example the
/// server's `user_online`/`user_offline` broadcasts) are passed through
/// unmodified as [`InboundFrame::Other`] so newer servers keep working
/// against older clients.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Direct(DirectMessage),
    Group(GroupMessage),
    Other(serde_json::Value),
}

impl InboundFrame {
    /// Parse one text frame.
    ///
    /// Invalid JSON, or a frame carrying a known `type` tag but missing that
    /// schema's fields, is an error; the caller drops such frames.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let tag = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_owned);
        match tag.as_deref() {
            Some(TYPE_CHAT) => serde_json::from_value(value).map(Self::Direct),
            Some(TYPE_GROUP_CHAT) => serde_json::from_value(value).map(Self::Group),
            _ => Ok(Self::Other(value)),
        }
    }

    /// Sender of the frame, when the shape carries one.
    pub fn from_user_id(&self) -> Option<&str> {
        match self {
            Self::Direct(m) => Some(&m.from_user_id),
            Self::Group(m) => Some(&m.from_user_id),
            Self::Other(v) => v.get("fromUserId").and_then(|u| u.as_str()),
        }
    }
}
