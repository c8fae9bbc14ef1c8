//! Value Objects for domain models.
//!
//! Value Objects are immutable objects that represent values in the domain.
//! They are compared by their value, not by identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::ValueObjectError;

/// Maximum length of a user identifier.
pub const USER_ID_MAX_LEN: usize = 128;

/// Maximum length of a display name.
pub const DISPLAY_NAME_MAX_LEN: usize = 80;

/// Maximum length of a room name.
pub const ROOM_NAME_MAX_LEN: usize = 100;

/// Maximum length of a room description.
pub const ROOM_DESCRIPTION_MAX_LEN: usize = 500;

/// Maximum length of a message body.
pub const MESSAGE_BODY_MAX_LEN: usize = 500;

/// Maximum length of a join request note.
pub const JOIN_NOTE_MAX_LEN: usize = 500;

/// Length of a room invite code.
pub const INVITE_CODE_LEN: usize = 8;

/// Avatar used when the authentication collaborator supplies none.
pub const DEFAULT_AVATAR: &str = "default.png";

fn check_len(len: usize, max: usize) -> Result<(), ValueObjectError> {
    if len > max {
        return Err(ValueObjectError::TooLong { max, actual: len });
    }
    Ok(())
}

/// User identifier value object.
///
/// Opaque identifier supplied by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId.
    ///
    /// # Arguments
    ///
    /// * `id` - The user identifier string
    ///
    /// # Returns
    ///
    /// A Result containing the UserId or an error if validation fails
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        if id.trim().is_empty() {
            return Err(ValueObjectError::UserIdEmpty);
        }
        check_len(id.chars().count(), USER_ID_MAX_LEN)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name shown next to messages and in member lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(name: String) -> Result<Self, ValueObjectError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ValueObjectError::DisplayNameEmpty);
        }
        check_len(name.chars().count(), DISPLAY_NAME_MAX_LEN)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an avatar image (URL or file name); never validated further.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRef(String);

impl AvatarRef {
    /// Blank references fall back to [`DEFAULT_AVATAR`].
    pub fn new(avatar: Option<String>) -> Self {
        match avatar.map(|a| a.trim().to_string()) {
            Some(a) if !a.is_empty() => Self(a),
            _ => Self(DEFAULT_AVATAR.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AvatarRef {
    fn default() -> Self {
        Self(DEFAULT_AVATAR.to_string())
    }
}

/// Room identifier value object.
///
/// Represents a unique, server-assigned identifier for a chat room (UUID format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(String);

impl RoomId {
    /// Create a new RoomId.
    ///
    /// # Arguments
    ///
    /// * `id` - The room identifier string (must be a UUID)
    ///
    /// # Returns
    ///
    /// A Result containing the RoomId or an error if validation fails
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        if id.is_empty() {
            return Err(ValueObjectError::RoomIdEmpty);
        }
        let uuid = Uuid::parse_str(&id).map_err(|_| ValueObjectError::RoomIdInvalidFormat(id))?;
        Self::from_uuid(uuid)
    }

    /// Create a RoomId from an already generated UUID.
    pub fn from_uuid(uuid: Uuid) -> Result<Self, ValueObjectError> {
        Ok(Self(uuid.hyphenated().to_string()))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room name, trimmed and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomName(String);

impl RoomName {
    pub fn new(name: String) -> Result<Self, ValueObjectError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ValueObjectError::RoomNameEmpty);
        }
        check_len(name.chars().count(), ROOM_NAME_MAX_LEN)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional room description. Blank descriptions are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDescription(String);

impl RoomDescription {
    pub fn parse(description: Option<String>) -> Result<Option<Self>, ValueObjectError> {
        let Some(description) = description.map(|d| d.trim().to_string()) else {
            return Ok(None);
        };
        if description.is_empty() {
            return Ok(None);
        }
        check_len(description.chars().count(), ROOM_DESCRIPTION_MAX_LEN)?;
        Ok(Some(Self(description)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Invite code granting join rights to a private room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InviteCode(String);

impl InviteCode {
    /// Parse a user supplied invite code.
    pub fn new(code: String) -> Result<Self, ValueObjectError> {
        if code.chars().count() != INVITE_CODE_LEN || !code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValueObjectError::InviteCodeInvalid(code));
        }
        Ok(Self(code))
    }

    /// Wrap a code produced by the invite code factory.
    pub(crate) fn from_generated(code: String) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Join request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JoinRequestId(Uuid);

impl JoinRequestId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(id: &str) -> Result<Self, ValueObjectError> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| ValueObjectError::JoinRequestIdInvalid(id.to_string()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for JoinRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message body value object.
///
/// Represents the text of a chat message with validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody(String);

impl MessageBody {
    /// Create a new MessageBody.
    ///
    /// Surrounding whitespace is not part of the body; a whitespace-only body is empty.
    pub fn new(body: String) -> Result<Self, ValueObjectError> {
        let body = body.trim().to_string();
        if body.is_empty() {
            return Err(ValueObjectError::MessageBodyEmpty);
        }
        check_len(body.chars().count(), MESSAGE_BODY_MAX_LEN)?;
        Ok(Self(body))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageBody {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional note attached to a join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNote(String);

impl JoinNote {
    pub fn parse(note: Option<String>) -> Result<Option<Self>, ValueObjectError> {
        let Some(note) = note.map(|n| n.trim().to_string()) else {
            return Ok(None);
        };
        if note.is_empty() {
            return Ok(None);
        }
        check_len(note.chars().count(), JOIN_NOTE_MAX_LEN)?;
        Ok(Some(Self(note)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Message identifier, monotonically increasing in assignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(i64);

impl MessageId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp value object.
///
/// Represents a Unix timestamp in milliseconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a new Timestamp.
    ///
    /// # Arguments
    ///
    /// * `value` - Unix timestamp in milliseconds
    ///
    /// # Returns
    ///
    /// A Timestamp instance
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the inner i64 value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
