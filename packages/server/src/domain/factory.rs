//! Domain factories for creating domain entities and value objects.

use rand::{Rng, distr::Alphanumeric};

use super::{
    ConnectionId, InviteCode, JoinRequestId, RoomId, error::ValueObjectError,
    value_object::INVITE_CODE_LEN,
};

/// Factory for generating RoomId instances.
///
/// This factory encapsulates the logic for generating new room identifiers,
/// separating the generation concern from the validation logic in RoomId.
pub struct RoomIdFactory;

impl RoomIdFactory {
    /// Generate a new RoomId with a random UUID v4.
    ///
    /// # Errors
    ///
    /// This method should not fail in practice, but returns Result for consistency
    /// with the domain error handling pattern.
    pub fn generate() -> Result<RoomId, ValueObjectError> {
        let uuid = uuid::Uuid::new_v4();
        RoomId::from_uuid(uuid)
    }
}

/// Factory for invite codes.
///
/// Codes are drawn from `[A-Za-z0-9]` with the thread-local CSPRNG. Uniqueness
/// is the caller's concern (collision check against stored codes).
pub struct InviteCodeFactory;

impl InviteCodeFactory {
    pub fn generate() -> InviteCode {
        let code: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(INVITE_CODE_LEN)
            .map(char::from)
            .collect();
        InviteCode::from_generated(code)
    }
}

pub struct JoinRequestIdFactory;

impl JoinRequestIdFactory {
    pub fn generate() -> JoinRequestId {
        JoinRequestId::from_uuid(uuid::Uuid::new_v4())
    }
}

pub struct ConnectionIdFactory;

impl ConnectionIdFactory {
    pub fn generate() -> ConnectionId {
        ConnectionId::from_uuid(uuid::Uuid::new_v4())
    }
}
