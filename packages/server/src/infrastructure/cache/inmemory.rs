//! In-process fast cache: one FIFO queue per channel.
//!
//! Appends never wait on the persistence buffer beyond the short critical
//! section of a single queue operation.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Channel, ChatMessage, MessageCache, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryMessageCache {
    queues: Arc<Mutex<HashMap<Channel, VecDeque<ChatMessage>>>>,
}

impl InMemoryMessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of queued entries across channels.
    pub async fn pending_len(&self) -> usize {
        self.queues.lock().await.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl MessageCache for InMemoryMessageCache {
    async fn append(&self, message: ChatMessage) -> Result<(), RepositoryError> {
        let mut queues = self.queues.lock().await;
        queues
            .entry(message.channel.clone())
            .or_default()
            .push_back(message);
        Ok(())
    }

    async fn peek(
        &self,
        channel: &Channel,
        max: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(channel)
            .map(|q| q.iter().take(max).cloned().collect())
            .unwrap_or_default())
    }

    async fn pop_up_to(
        &self,
        channel: &Channel,
        max: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(channel) else {
            return Ok(Vec::new());
        };
        let n = max.min(queue.len());
        let popped: Vec<ChatMessage> = queue.drain(..n).collect();
        if queue.is_empty() {
            queues.remove(channel);
        }
        Ok(popped)
    }

    async fn recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let queues = self.queues.lock().await;
        Ok(queues
            .get(channel)
            .map(|q| {
                let skip = q.len().saturating_sub(limit);
                q.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn pending_channels(&self) -> Result<Vec<Channel>, RepositoryError> {
        let queues = self.queues.lock().await;
        Ok(queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(c, _)| c.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AvatarRef, DisplayName, Identity, MessageBody, MessageId, RoomIdFactory, Timestamp,
        UserId,
    };

    fn message(id: i64, channel: Channel) -> ChatMessage {
        ChatMessage::new(
            MessageId::new(id),
            Identity::new(
                UserId::new("bob".to_string()).unwrap(),
                DisplayName::new("Bob".to_string()).unwrap(),
                AvatarRef::default(),
            ),
            channel,
            MessageBody::new(format!("message {id}")).unwrap(),
            Timestamp::new(id),
        )
    }

    #[tokio::test]
    async fn test_peek_leaves_entries_and_pop_removes_them() {
        // テスト項目: peek はキューを変更せず、pop_up_to は先頭から取り出す
        // given (前提条件):
        let cache = InMemoryMessageCache::new();
        for id in 1..=3 {
            cache.append(message(id, Channel::Public)).await.unwrap();
        }

        // when (操作):
        let peeked = cache.peek(&Channel::Public, 2).await.unwrap();
        let popped = cache.pop_up_to(&Channel::Public, 2).await.unwrap();

        // then (期待する結果):
        assert_eq!(peeked, popped);
        assert_eq!(popped[0].id, MessageId::new(1));
        assert_eq!(popped[1].id, MessageId::new(2));
        assert_eq!(cache.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_pending_channels_forgets_drained_queues() {
        // テスト項目: 空になったチャンネルは pending_channels に含まれない
        // given (前提条件):
        let cache = InMemoryMessageCache::new();
        let room = Channel::Room(RoomIdFactory::generate().unwrap());
        cache.append(message(1, Channel::Public)).await.unwrap();
        cache.append(message(2, room.clone())).await.unwrap();

        // when (操作):
        cache.pop_up_to(&Channel::Public, 10).await.unwrap();

        // then (期待する結果):
        assert_eq!(cache.pending_channels().await.unwrap(), vec![room]);
    }

    #[tokio::test]
    async fn test_recent_returns_tail_of_queue() {
        // テスト項目: recent はキュー末尾の N 件を古い順に返す
        // given (前提条件):
        let cache = InMemoryMessageCache::new();
        for id in 1..=5 {
            cache.append(message(id, Channel::Public)).await.unwrap();
        }

        // when (操作):
        let recent = cache.recent(&Channel::Public, 2).await.unwrap();

        // then (期待する結果):
        let ids: Vec<i64> = recent.iter().map(|m| m.id.value()).collect();
        assert_eq!(ids, vec![4, 5]);
    }
}
