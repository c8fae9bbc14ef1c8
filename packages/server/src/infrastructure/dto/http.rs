//! HTTP API request / response DTOs for the chat application.

use hiroba_shared::time::timestamp_to_rfc3339;
use serde::{Deserialize, Serialize};

use crate::domain::{Decision, Identity, JoinRequest, Membership, Room, UserId, Visibility};

use super::websocket::{MemberDto, MessageDto};

/// Body of `POST /api/rooms`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub description: Option<String>,
    /// Defaults to public
    pub visibility: Option<Visibility>,
}

/// Room as shown to a viewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub creator_id: String,
    pub created_at: String, // ISO 8601
    /// Live presence entries
    pub member_count: usize,
    /// Shown to the creator only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
}

impl RoomDto {
    pub fn new(room: Room, member_count: usize, viewer: &UserId) -> Self {
        let invite_code = if room.is_creator(viewer) {
            room.invite_code.map(|c| c.as_str().to_string())
        } else {
            None
        };
        Self {
            id: room.id.into_string(),
            name: room.name.as_str().to_string(),
            description: room.description.map(|d| d.as_str().to_string()),
            visibility: room.visibility,
            creator_id: room.creator_id.into_string(),
            created_at: timestamp_to_rfc3339(room.created_at.value()),
            member_count,
            invite_code,
        }
    }
}

/// Body of `POST /api/rooms/{room_id}/join-requests`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateJoinRequest {
    pub message: Option<String>,
}

/// Body of `POST /api/join-requests/{request_id}/decision`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequestDto {
    pub id: String,
    pub room_id: String,
    pub requester: MemberDto,
    pub message: Option<String>,
    pub status: String,
    pub created_at: String, // ISO 8601
}

impl From<&JoinRequest> for JoinRequestDto {
    fn from(request: &JoinRequest) -> Self {
        Self {
            id: request.id.to_string(),
            room_id: request.room_id.as_str().to_string(),
            requester: MemberDto::from(&request.requester),
            message: request.message.as_ref().map(|m| m.as_str().to_string()),
            status: request.status.as_str().to_string(),
            created_at: timestamp_to_rfc3339(request.created_at.value()),
        }
    }
}

/// Live presence of a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub room_id: Option<String>,
    pub member_count: usize,
    pub members: Vec<MemberDto>,
}

impl MembersResponse {
    pub fn new(room_id: Option<String>, member_count: usize, members: &[Identity]) -> Self {
        Self {
            room_id,
            member_count,
            members: members.iter().map(MemberDto::from).collect(),
        }
    }
}

/// Durable roster entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipDto {
    pub user_id: String,
    pub joined_at: String, // ISO 8601
}

impl From<&Membership> for MembershipDto {
    fn from(membership: &Membership) -> Self {
        Self {
            user_id: membership.user_id.as_str().to_string(),
            joined_at: timestamp_to_rfc3339(membership.joined_at.value()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveMemberResponse {
    pub removed: bool,
}

/// Query of `GET /api/messages`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesQuery {
    pub room_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub room_id: Option<String>,
    pub messages: Vec<MessageDto>,
}

/// Body of every rejected request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
