//! Request extractors.
//!
//! The authentication collaborator in front of this server supplies the caller's
//! identity through trusted headers.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    domain::{AvatarRef, DisplayName, Identity, JoinRequestId, RoomId, UserId},
    usecase::ChatError,
};

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_AVATAR_HEADER: &str = "x-user-avatar";

/// Caller identity; requests without one are refused with 401
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        let id = header(USER_ID_HEADER)
            .and_then(|id| UserId::new(id).ok())
            .ok_or_else(|| ApiError::Unauthorized("missing or invalid user id".to_string()))?;
        let name = header(USER_NAME_HEADER)
            .and_then(|name| DisplayName::new(name).ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("missing or invalid display name".to_string())
            })?;
        let avatar = AvatarRef::new(header(USER_AVATAR_HEADER));

        Ok(AuthenticatedUser(Identity::new(id, name, avatar)))
    }
}

pub(crate) fn parse_room_id(room_id: String) -> Result<RoomId, ChatError> {
    Ok(RoomId::new(room_id)?)
}

/// `None` is the public channel
pub(crate) fn parse_channel(room_id: Option<String>) -> Result<Option<RoomId>, ChatError> {
    room_id.map(parse_room_id).transpose()
}

pub(crate) fn parse_user_id(user_id: String) -> Result<UserId, ChatError> {
    Ok(UserId::new(user_id)?)
}

pub(crate) fn parse_join_request_id(request_id: &str) -> Result<JoinRequestId, ChatError> {
    Ok(JoinRequestId::parse(request_id)?)
}
