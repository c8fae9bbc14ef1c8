//! Domain layer for the chat application.
//!
//! This module contains business logic that is independent of
//! data transfer objects (DTOs) and infrastructure concerns.

pub mod clock;
pub mod entity;
pub mod error;
pub mod factory;
pub mod repository;
pub mod value_object;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{
    Channel, ChatMessage, Decision, Identity, JoinRequest, JoinRequestStatus, Membership,
    MessageKey, Room, Visibility,
};
pub use error::{RepositoryError, RoomError, ValueObjectError};
pub use factory::{ConnectionIdFactory, InviteCodeFactory, JoinRequestIdFactory, RoomIdFactory};
pub use repository::{MessageCache, MessageStore, RoomRepository};
#[cfg(test)]
pub use repository::{MockMessageCache, MockMessageStore, MockRoomRepository};
pub use value_object::{
    AvatarRef, ConnectionId, DisplayName, InviteCode, JoinNote, JoinRequestId, MessageBody,
    MessageId, RoomDescription, RoomId, RoomName, Timestamp, UserId,
};
