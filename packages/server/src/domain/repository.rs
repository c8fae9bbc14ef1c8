//! Storage interfaces consumed by the usecase layer.
//!
//! The domain defines the traits; infrastructure provides the implementations
//! (dependency inversion). All methods may suspend on I/O.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::{
    Channel, ChatMessage, Decision, InviteCode, JoinRequest, JoinRequestId, Membership,
    MessageId, MessageKey, RepositoryError, Room, RoomId, Timestamp, UserId,
};

/// Durable state of the room directory: rooms, memberships and join requests.
///
/// Implementations must make every method atomic with respect to the others.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Insert a room together with its creator's membership.
    ///
    /// Fails with `Conflict` if the id or the invite code is already taken.
    async fn insert_room(&self, room: Room, creator: Membership) -> Result<(), RepositoryError>;

    async fn invite_code_exists(&self, code: &InviteCode) -> Result<bool, RepositoryError>;

    async fn find_room(&self, room_id: &RoomId) -> Result<Option<Room>, RepositoryError>;

    async fn find_room_by_invite_code(
        &self,
        code: &InviteCode,
    ) -> Result<Option<Room>, RepositoryError>;

    /// Public rooms plus private rooms `user_id` belongs to, newest first.
    async fn list_rooms_visible_to(&self, user_id: &UserId) -> Result<Vec<Room>, RepositoryError>;

    async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, RepositoryError>;

    /// Returns `false` when the membership already existed.
    async fn add_membership(&self, membership: Membership) -> Result<bool, RepositoryError>;

    /// Returns `false` when there was nothing to remove.
    async fn remove_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError>;

    async fn list_memberships(&self, room_id: &RoomId) -> Result<Vec<Membership>, RepositoryError>;

    /// Store a new pending request.
    ///
    /// Fails with `Conflict` if the requester is already a member or already has
    /// a pending request for the room.
    async fn insert_join_request(&self, request: JoinRequest) -> Result<(), RepositoryError>;

    async fn find_join_request(
        &self,
        id: &JoinRequestId,
    ) -> Result<Option<JoinRequest>, RepositoryError>;

    async fn list_pending_join_requests(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<JoinRequest>, RepositoryError>;

    /// Move a pending request to its final status.
    ///
    /// Approval creates the membership in the same atomic step. Fails with
    /// `NotFound` for unknown ids and `PreconditionFailed` if the request is no
    /// longer pending.
    async fn resolve_join_request(
        &self,
        id: &JoinRequestId,
        decision: Decision,
        decided_at: Timestamp,
    ) -> Result<JoinRequest, RepositoryError>;
}

/// Durable message store. Its write path belongs to the persistence buffer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Commit a batch in one transaction: either every new record becomes
    /// visible or none does. Records whose id or natural key is already stored
    /// are skipped. Returns the number of inserted records.
    async fn insert_batch(&self, messages: &[ChatMessage]) -> Result<usize, RepositoryError>;

    /// Existence check by natural key.
    async fn exists(&self, key: &MessageKey) -> Result<bool, RepositoryError> {
        Ok(self.committed_id(key).await?.is_some())
    }

    /// Id of the committed record holding `key`, if any.
    async fn committed_id(&self, key: &MessageKey) -> Result<Option<MessageId>, RepositoryError>;

    /// Most recent `limit` messages of a channel, oldest first.
    async fn recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    async fn max_id(&self) -> Result<Option<MessageId>, RepositoryError>;
}

/// Fast cache holding messages that are not yet durable, one FIFO per channel.
///
/// Many writers append; the persistence buffer is the single consumer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageCache: Send + Sync {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError>;

    /// Oldest `max` queued entries, left in place.
    async fn peek(&self, channel: &Channel, max: usize)
    -> Result<Vec<ChatMessage>, RepositoryError>;

    /// Remove and return up to `max` of the oldest queued entries.
    async fn pop_up_to(
        &self,
        channel: &Channel,
        max: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// Newest `limit` queued entries, oldest first.
    async fn recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError>;

    /// Channels that currently have queued entries.
    async fn pending_channels(&self) -> Result<Vec<Channel>, RepositoryError>;
}
