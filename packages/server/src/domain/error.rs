//! Domain layer error definitions.

use thiserror::Error;

use super::entity::JoinRequestStatus;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// UserId validation error
    #[error("UserId cannot be empty")]
    UserIdEmpty,

    /// DisplayName validation error
    #[error("display name cannot be empty")]
    DisplayNameEmpty,

    /// RoomId validation error
    #[error("RoomId cannot be empty")]
    RoomIdEmpty,

    /// RoomId invalid format error (not a valid UUID format)
    #[error("RoomId must be a valid UUID format (got: {0})")]
    RoomIdInvalidFormat(String),

    #[error("room name cannot be empty")]
    RoomNameEmpty,

    #[error("invite code is malformed (got: {0})")]
    InviteCodeInvalid(String),

    #[error("join request id must be a valid UUID format (got: {0})")]
    JoinRequestIdInvalid(String),

    /// MessageBody validation error
    #[error("message body cannot be empty")]
    MessageBodyEmpty,

    /// Shared length check for every bounded text value
    #[error("value cannot exceed {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },
}

/// Errors related to Room domain logic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// A join request may only be decided once
    #[error("join request was already {0}")]
    AlreadyDecided(JoinRequestStatus),

    /// The creator is permanently a member of their room
    #[error("the room creator cannot be removed")]
    CreatorIsPermanent,
}

/// Errors raised at the storage boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// The stored record is not in the state the write expected
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
