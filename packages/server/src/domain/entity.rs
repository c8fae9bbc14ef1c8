//! Core domain models for the chat application.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    error::RoomError,
    value_object::{
        AvatarRef, DisplayName, InviteCode, JoinNote, JoinRequestId, MessageBody, MessageId,
        RoomDescription, RoomId, RoomName, Timestamp, UserId,
    },
};

/// Authenticated identity supplied by the authentication collaborator.
///
/// Immutable for the lifetime of a connection session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub name: DisplayName,
    pub avatar: AvatarRef,
}

impl Identity {
    pub fn new(id: UserId, name: DisplayName, avatar: AvatarRef) -> Self {
        Self { id, name, avatar }
    }
}

/// Room visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// Where a message is posted or a presence entry lives.
///
/// `Public` is the single implicit channel with no room id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Public,
    Room(RoomId),
}

impl Channel {
    pub fn from_room_id(room_id: Option<RoomId>) -> Self {
        match room_id {
            Some(id) => Channel::Room(id),
            None => Channel::Public,
        }
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Channel::Public => None,
            Channel::Room(id) => Some(id),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Public => write!(f, "public"),
            Channel::Room(id) => write!(f, "room:{id}"),
        }
    }
}

/// Represents a chat room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    pub name: RoomName,
    pub description: Option<RoomDescription>,
    pub visibility: Visibility,
    /// Creator is implicitly and permanently a member
    pub creator_id: UserId,
    /// Timestamp when the room was created
    pub created_at: Timestamp,
    /// Present only for private rooms
    pub invite_code: Option<InviteCode>,
}

impl Room {
    /// Create a public room
    pub fn new_public(
        id: RoomId,
        name: RoomName,
        description: Option<RoomDescription>,
        creator_id: UserId,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            name,
            description,
            visibility: Visibility::Public,
            creator_id,
            created_at,
            invite_code: None,
        }
    }

    /// Create a private room guarded by an invite code
    pub fn new_private(
        id: RoomId,
        name: RoomName,
        description: Option<RoomDescription>,
        creator_id: UserId,
        created_at: Timestamp,
        invite_code: InviteCode,
    ) -> Self {
        Self {
            id,
            name,
            description,
            visibility: Visibility::Private,
            creator_id,
            created_at,
            invite_code: Some(invite_code),
        }
    }

    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    pub fn is_creator(&self, user_id: &UserId) -> bool {
        &self.creator_id == user_id
    }

    /// Check that `target` may be removed from this room
    ///
    /// # Errors
    ///
    /// Returns `RoomError::CreatorIsPermanent` when `target` is the creator
    pub fn ensure_removable(&self, target: &UserId) -> Result<(), RoomError> {
        if self.is_creator(target) {
            return Err(RoomError::CreatorIsPermanent);
        }
        Ok(())
    }
}

/// Relation between a room and one of its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub joined_at: Timestamp,
}

impl Membership {
    pub fn new(room_id: RoomId, user_id: UserId, joined_at: Timestamp) -> Self {
        Self {
            room_id,
            user_id,
            joined_at,
        }
    }
}

/// Join request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(JoinRequestStatus::Pending),
            "approved" => Some(JoinRequestStatus::Approved),
            "rejected" => Some(JoinRequestStatus::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision taken by a room creator on a join request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn resulting_status(&self) -> JoinRequestStatus {
        match self {
            Decision::Approve => JoinRequestStatus::Approved,
            Decision::Reject => JoinRequestStatus::Rejected,
        }
    }
}

/// Request by an identity to become a member of a private room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub id: JoinRequestId,
    pub room_id: RoomId,
    pub requester: Identity,
    pub message: Option<JoinNote>,
    pub status: JoinRequestStatus,
    pub created_at: Timestamp,
}

impl JoinRequest {
    /// Create a new pending request
    pub fn new(
        id: JoinRequestId,
        room_id: RoomId,
        requester: Identity,
        message: Option<JoinNote>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            room_id,
            requester,
            message,
            status: JoinRequestStatus::Pending,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == JoinRequestStatus::Pending
    }

    /// Apply a decision to a pending request
    ///
    /// # Errors
    ///
    /// Returns `RoomError::AlreadyDecided` if the request is no longer pending
    pub fn decide(&mut self, decision: Decision) -> Result<(), RoomError> {
        if !self.is_pending() {
            return Err(RoomError::AlreadyDecided(self.status));
        }
        self.status = decision.resulting_status();
        Ok(())
    }
}

/// Represents a chat message in the domain model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    /// Author identity as it was at send time
    pub author: Identity,
    pub channel: Channel,
    pub body: MessageBody,
    /// Server clock, never client supplied
    pub created_at: Timestamp,
}

impl ChatMessage {
    /// Create a new chat message
    pub fn new(
        id: MessageId,
        author: Identity,
        channel: Channel,
        body: MessageBody,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            author,
            channel,
            body,
            created_at,
        }
    }

    /// Natural key used to detect a message that was already committed.
    pub fn key(&self) -> MessageKey {
        MessageKey {
            author_id: self.author.id.clone(),
            channel: self.channel.clone(),
            body: self.body.as_str().to_string(),
            created_at: self.created_at,
        }
    }
}

/// (author, room, body, created-at)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub author_id: UserId,
    pub channel: Channel,
    pub body: String,
    pub created_at: Timestamp,
}
