//! UseCase: メッセージパイプライン
//!
//! メッセージの検証・認可・タイムスタンプ付与を行い、高速キャッシュへ追記した上で
//! チャンネルにいる全接続へ配信します。

use std::{collections::HashSet, sync::Arc};

use tokio::sync::Mutex;

use crate::domain::{
    Channel, ChatMessage, Clock, Identity, MessageBody, MessageCache, MessageId, MessageStore,
    Timestamp, UserId,
};

use super::{
    connection_registry::ConnectionRegistry,
    error::ChatError,
    event::ChatEvent,
    room_directory::{Action, RoomDirectory},
};

/// Last issued timestamp and the next id.
///
/// Held across append and broadcast so that fan-out order equals cache order.
struct Sequencer {
    last_timestamp: Timestamp,
    next_id: MessageId,
}

/// メッセージパイプライン
pub struct MessagePipeline {
    directory: Arc<RoomDirectory>,
    registry: Arc<ConnectionRegistry>,
    cache: Arc<dyn MessageCache>,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
    sequencer: Mutex<Sequencer>,
}

impl MessagePipeline {
    /// Build the pipeline, continuing the id sequence of the durable store.
    pub async fn new(
        directory: Arc<RoomDirectory>,
        registry: Arc<ConnectionRegistry>,
        cache: Arc<dyn MessageCache>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ChatError> {
        let next_id = store
            .max_id()
            .await?
            .map(|id| id.next())
            .unwrap_or(MessageId::new(1));
        tracing::debug!(%next_id, "message sequence seeded");

        Ok(Self {
            directory,
            registry,
            cache,
            store,
            clock,
            sequencer: Mutex::new(Sequencer {
                last_timestamp: Timestamp::new(i64::MIN),
                next_id,
            }),
        })
    }

    /// メッセージを送信する
    ///
    /// # Arguments
    ///
    /// * `author` - 送信者（送信時点のユーザー情報がメッセージに記録されます）
    /// * `channel` - 送信先チャンネル
    /// * `body` - 本文（前後の空白は取り除かれます）
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - キャッシュに追記され、配信されたメッセージ
    /// * `Err(ChatError)` - 検証・認可エラー、またはキャッシュ障害（`Unavailable`）
    pub async fn send(
        &self,
        author: &Identity,
        channel: &Channel,
        body: String,
    ) -> Result<ChatMessage, ChatError> {
        let body = MessageBody::new(body)?;
        self.directory
            .authorize(&author.id, channel, Action::Write)
            .await?;

        let mut sequencer = self.sequencer.lock().await;
        let created_at = self.clock.now().max(sequencer.last_timestamp);
        let message = ChatMessage::new(
            sequencer.next_id,
            author.clone(),
            channel.clone(),
            body,
            created_at,
        );
        self.cache.append(message.clone()).await?;
        sequencer.next_id = sequencer.next_id.next();
        sequencer.last_timestamp = created_at;

        let delivered = self
            .registry
            .broadcast(channel, ChatEvent::Message(message.clone()))
            .await;
        drop(sequencer);

        tracing::debug!(
            message_id = %message.id,
            %channel,
            author = %author.id,
            delivered,
            "message accepted"
        );
        Ok(message)
    }

    /// 直近 `limit` 件のメッセージを古い順に返す
    ///
    /// 未フラッシュのキャッシュと永続ストアをマージし、ID で重複を取り除きます。
    pub async fn recent_messages(
        &self,
        user_id: &UserId,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.directory
            .authorize(user_id, channel, Action::Read)
            .await?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        // cache first: a concurrent flush only moves entries from the cache into the store
        let pending = self.cache.recent(channel, limit).await?;
        let committed = self.store.recent(channel, limit).await?;

        let mut seen = HashSet::new();
        let mut merged: Vec<ChatMessage> = committed
            .into_iter()
            .chain(pending)
            .filter(|message| seen.insert(message.id))
            .collect();
        merged.sort_by_key(|message| (message.created_at, message.id));

        let skip = merged.len().saturating_sub(limit);
        Ok(merged.split_off(skip))
    }
}
