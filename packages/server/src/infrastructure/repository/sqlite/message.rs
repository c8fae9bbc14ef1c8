//! SQLite Message Store 実装

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::{channel_param, corrupt};
use crate::domain::{
    AvatarRef, Channel, ChatMessage, DisplayName, Identity, MessageBody, MessageId, MessageKey,
    MessageStore, RepositoryError, RoomId, Timestamp, UserId,
};

const ID_BY_KEY: &str = "SELECT id FROM messages \
     WHERE author_id = ? AND room_id IS ? AND body = ? AND created_at = ? LIMIT 1";

#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage, RepositoryError> {
    let room_id: Option<String> = row.try_get("room_id")?;
    let avatar: String = row.try_get("author_avatar")?;
    Ok(ChatMessage::new(
        MessageId::new(row.try_get("id")?),
        Identity::new(
            UserId::new(row.try_get("author_id")?).map_err(corrupt)?,
            DisplayName::new(row.try_get("author_name")?).map_err(corrupt)?,
            AvatarRef::new(Some(avatar)),
        ),
        Channel::from_room_id(room_id.map(RoomId::new).transpose().map_err(corrupt)?),
        MessageBody::new(row.try_get("body")?).map_err(corrupt)?,
        Timestamp::new(row.try_get("created_at")?),
    ))
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn insert_batch(&self, messages: &[ChatMessage]) -> Result<usize, RepositoryError> {
        // dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for message in messages {
            let existing = sqlx::query(ID_BY_KEY)
                .bind(message.author.id.as_str())
                .bind(channel_param(&message.channel))
                .bind(message.body.as_str())
                .bind(message.created_at.value())
                .fetch_optional(&mut *tx)
                .await?;
            if existing.is_some() {
                continue;
            }
            let result = sqlx::query(
                "INSERT OR IGNORE INTO messages \
                 (id, author_id, author_name, author_avatar, room_id, body, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(message.id.value())
            .bind(message.author.id.as_str())
            .bind(message.author.name.as_str())
            .bind(message.author.avatar.as_str())
            .bind(channel_param(&message.channel))
            .bind(message.body.as_str())
            .bind(message.created_at.value())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn committed_id(&self, key: &MessageKey) -> Result<Option<MessageId>, RepositoryError> {
        let row = sqlx::query(ID_BY_KEY)
            .bind(key.author_id.as_str())
            .bind(channel_param(&key.channel))
            .bind(key.body.as_str())
            .bind(key.created_at.value())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| row.try_get("id").map(MessageId::new))
            .transpose()
            .map_err(RepositoryError::from)
    }

    async fn recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, author_id, author_name, author_avatar, room_id, body, created_at \
             FROM messages WHERE room_id IS ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(channel_param(channel))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn max_id(&self) -> Result<Option<MessageId>, RepositoryError> {
        let row = sqlx::query("SELECT MAX(id) AS max_id FROM messages")
            .fetch_one(&self.pool)
            .await?;
        let max: Option<i64> = row.try_get("max_id")?;
        Ok(max.map(MessageId::new))
    }
}
