//! WebSocket message DTOs for the chat application.
//!
//! Frames are JSON objects tagged by `type`.

use hiroba_shared::time::timestamp_to_rfc3339;
use serde::{Deserialize, Serialize};

use crate::domain::{ChatMessage, Identity};

use super::http::JoinRequestDto;

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Omitting `room_id` targets the public channel
    Join {
        room_id: Option<String>,
        invite_code: Option<String>,
    },
    Leave {
        room_id: Option<String>,
    },
    Send {
        room_id: Option<String>,
        body: String,
    },
    History {
        room_id: Option<String>,
        limit: Option<usize>,
    },
}

impl ClientMessage {
    /// Action name echoed back in `error` frames
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave { .. } => "leave",
            ClientMessage::Send { .. } => "send",
            ClientMessage::History { .. } => "history",
        }
    }
}

/// Frames sent by the server: acknowledgements and pushed events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Joined {
        room_id: Option<String>,
        member_count: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        members: Option<Vec<MemberDto>>,
    },
    Left {
        room_id: Option<String>,
    },
    Sent {
        message: MessageDto,
    },
    History {
        room_id: Option<String>,
        messages: Vec<MessageDto>,
    },
    Error {
        action: String,
        reason: String,
        message: String,
    },
    Message {
        message: MessageDto,
    },
    MemberCount {
        room_id: Option<String>,
        count: usize,
    },
    MemberListUpdate {
        room_id: Option<String>,
        members: Vec<MemberDto>,
    },
    KickedFromRoom {
        room_id: String,
    },
    JoinRequestReceived {
        room_name: String,
        request: JoinRequestDto,
    },
    JoinRequestStatus {
        room_name: String,
        request: JoinRequestDto,
    },
}

/// Public view of an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDto {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

impl From<&Identity> for MemberDto {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.as_str().to_string(),
            name: identity.name.as_str().to_string(),
            avatar: identity.avatar.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: i64,
    /// `None` for the public channel
    pub room_id: Option<String>,
    pub author: MemberDto,
    pub body: String,
    /// Unix timestamp (milliseconds since epoch, UTC)
    pub timestamp: i64,
    pub created_at: String, // ISO 8601
}

impl From<&ChatMessage> for MessageDto {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id.value(),
            room_id: message.channel.room_id().map(|id| id.as_str().to_string()),
            author: MemberDto::from(&message.author),
            body: message.body.as_str().to_string(),
            timestamp: message.created_at.value(),
            created_at: timestamp_to_rfc3339(message.created_at.value()),
        }
    }
}
