//! UseCase 層のエラー定義
//!
//! アクション境界で回復され、構造化された結果として呼び出し元に返されます。
//! 接続やプロセスを終了させることはありません。

use thiserror::Error;

use crate::domain::{RepositoryError, RoomError, ValueObjectError};

/// Errors returned by every room, presence and message action
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Malformed input (empty name/body, bad identifier)
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AccessDenied(String),

    /// Room, request, connection or identity missing
    #[error("{0}")]
    NotFound(String),

    /// Duplicate pending request or duplicate membership attempt
    #[error("{0}")]
    Conflict(String),

    /// Re-deciding a resolved request, requesting to join a public room
    #[error("{0}")]
    InvalidState(String),

    /// Storage failure during a synchronous action; nothing was committed
    #[error("{0}")]
    Unavailable(String),
}

impl ChatError {
    /// Short machine-readable reason
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Validation(_) => "validation_error",
            ChatError::AccessDenied(_) => "access_denied",
            ChatError::NotFound(_) => "not_found",
            ChatError::Conflict(_) => "conflict",
            ChatError::InvalidState(_) => "invalid_state",
            ChatError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<ValueObjectError> for ChatError {
    fn from(err: ValueObjectError) -> Self {
        ChatError::Validation(err.to_string())
    }
}

impl From<RoomError> for ChatError {
    fn from(err: RoomError) -> Self {
        ChatError::InvalidState(err.to_string())
    }
}

impl From<RepositoryError> for ChatError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => ChatError::NotFound(msg),
            RepositoryError::Conflict(msg) => ChatError::Conflict(msg),
            RepositoryError::PreconditionFailed(msg) => ChatError::InvalidState(msg),
            RepositoryError::Unavailable(msg) => {
                tracing::error!(error = %msg, "storage unavailable");
                ChatError::Unavailable("storage is temporarily unavailable".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_mapping() {
        // テスト項目: ストレージ層のエラーが UseCase のエラー分類に変換される
        // then (期待する結果):
        assert_eq!(
            ChatError::from(RepositoryError::PreconditionFailed("decided".to_string())).code(),
            "invalid_state"
        );
        assert_eq!(
            ChatError::from(RepositoryError::Conflict("dup".to_string())).code(),
            "conflict"
        );
        assert_eq!(
            ChatError::from(RepositoryError::Unavailable("disk".to_string())),
            ChatError::Unavailable("storage is temporarily unavailable".to_string())
        );
    }

    #[test]
    fn test_value_object_error_is_validation() {
        // テスト項目: 値オブジェクトの検証エラーは validation_error になる
        // when (操作):
        let err = ChatError::from(ValueObjectError::MessageBodyEmpty);

        // then (期待する結果):
        assert_eq!(err.code(), "validation_error");
        assert_eq!(err.to_string(), "message body cannot be empty");
    }
}
