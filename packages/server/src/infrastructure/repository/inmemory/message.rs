//! InMemory Message Store 実装
//!
//! 永続ストアの代わりに Vec を使用する実装。テストと揮発的な起動モードで使います。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Channel, ChatMessage, MessageId, MessageKey, MessageStore, RepositoryError};

#[derive(Default)]
struct MessageTable {
    rows: Vec<ChatMessage>,
    ids: HashSet<MessageId>,
    keys: HashMap<MessageKey, MessageId>,
}

/// インメモリ Message Store 実装
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    table: Arc<Mutex<MessageTable>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    pub async fn len(&self) -> usize {
        self.table.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn insert_batch(&self, messages: &[ChatMessage]) -> Result<usize, RepositoryError> {
        let mut table = self.table.lock().await;
        let mut inserted = 0;
        for message in messages {
            let key = message.key();
            if table.ids.contains(&message.id) || table.keys.contains_key(&key) {
                continue;
            }
            table.ids.insert(message.id);
            table.keys.insert(key, message.id);
            table.rows.push(message.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn committed_id(&self, key: &MessageKey) -> Result<Option<MessageId>, RepositoryError> {
        Ok(self.table.lock().await.keys.get(key).copied())
    }

    async fn recent(
        &self,
        channel: &Channel,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, RepositoryError> {
        let table = self.table.lock().await;
        let mut rows: Vec<ChatMessage> = table
            .rows
            .iter()
            .filter(|m| &m.channel == channel)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.created_at, m.id));
        let skip = rows.len().saturating_sub(limit);
        Ok(rows.split_off(skip))
    }

    async fn max_id(&self) -> Result<Option<MessageId>, RepositoryError> {
        Ok(self.table.lock().await.ids.iter().max().copied())
    }
}
