//! UseCase: 永続化バッファ（write-behind）
//!
//! 高速キャッシュに溜まったメッセージを一定間隔でバッチ単位に永続ストアへ書き込みます。
//! 書き込みはチャンネルごとに peek → 既存チェック → トランザクション挿入 → pop の順で行い、
//! 途中で失敗してもキャッシュのエントリは残り、次のサイクルで再試行されます。

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::domain::{Channel, MessageCache, MessageStore, RepositoryError};

/// Upper bound on catch-up cycles run at shutdown
const FINAL_FLUSH_MAX_CYCLES: usize = 1_000;

/// Outcome of one flush cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    /// Newly durable records
    pub committed: usize,
    /// Entries found already committed and dropped from the cache
    pub skipped: usize,
    /// Distinct messages dropped because another message with the same
    /// natural key was committed first
    pub collapsed: usize,
    /// Channels whose batch stays queued for the next cycle
    pub failed_channels: usize,
}

impl FlushReport {
    pub fn is_idle(&self) -> bool {
        self.committed == 0 && self.skipped == 0 && self.collapsed == 0
    }

    fn absorb(&mut self, other: FlushReport) {
        self.committed += other.committed;
        self.skipped += other.skipped;
        self.collapsed += other.collapsed;
        self.failed_channels += other.failed_channels;
    }
}

/// 永続化バッファ
pub struct PersistenceBuffer {
    cache: Arc<dyn MessageCache>,
    store: Arc<dyn MessageStore>,
    batch_size: usize,
    interval: Duration,
}

impl PersistenceBuffer {
    pub fn new(
        cache: Arc<dyn MessageCache>,
        store: Arc<dyn MessageStore>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    /// 1 サイクル分のフラッシュを実行する
    ///
    /// ストレージ障害はログに記録され、呼び出し元には返しません。
    pub async fn flush_once(&self) -> FlushReport {
        let mut report = FlushReport::default();
        let channels = match self.cache.pending_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                tracing::warn!(error = %e, "could not list pending channels");
                return report;
            }
        };

        for channel in channels {
            match self.flush_channel(&channel).await {
                Ok(flushed) => report.absorb(flushed),
                Err(e) => {
                    tracing::warn!(%channel, error = %e, "flush failed, batch stays queued");
                    report.failed_channels += 1;
                }
            }
        }
        report
    }

    async fn flush_channel(&self, channel: &Channel) -> Result<FlushReport, RepositoryError> {
        let mut report = FlushReport::default();
        let batch = self.cache.peek(channel, self.batch_size).await?;
        if batch.is_empty() {
            return Ok(report);
        }

        // natural key -> id of the message that owns it
        let mut owners = HashMap::with_capacity(batch.len());
        let mut fresh = Vec::with_capacity(batch.len());
        for message in &batch {
            let key = message.key();
            let owner = match owners.get(&key) {
                Some(id) => Some(*id),
                None => self.store.committed_id(&key).await?,
            };
            match owner {
                None => {
                    owners.insert(key, message.id);
                    fresh.push(message.clone());
                }
                Some(id) if id == message.id => report.skipped += 1,
                Some(id) => {
                    tracing::warn!(
                        %channel,
                        message_id = %message.id,
                        owner_id = %id,
                        author = %message.author.id,
                        "message shares its natural key with another message, not stored"
                    );
                    report.collapsed += 1;
                }
            }
        }
        if !fresh.is_empty() {
            report.committed = self.store.insert_batch(&fresh).await?;
            // rows the store itself found already present
            report.skipped += fresh.len().saturating_sub(report.committed);
        }

        // a failure here only means the batch is seen again and skipped next cycle
        self.cache.pop_up_to(channel, batch.len()).await?;
        Ok(report)
    }

    /// 停止シグナルを受け取るまで一定間隔でフラッシュを繰り返す
    ///
    /// 停止時にはキャッシュが空になるまで（または失敗するまで）最終フラッシュを行います。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            batch_size = self.batch_size,
            "persistence buffer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.flush_once().await;
                    if !report.is_idle() || report.failed_channels > 0 {
                        tracing::debug!(
                            committed = report.committed,
                            skipped = report.skipped,
                            collapsed = report.collapsed,
                            failed_channels = report.failed_channels,
                            "flush cycle"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let mut total = FlushReport::default();
        for _ in 0..FINAL_FLUSH_MAX_CYCLES {
            let report = self.flush_once().await;
            total.absorb(report);
            if report.is_idle() || report.failed_channels > 0 {
                break;
            }
        }
        tracing::info!(
            committed = total.committed,
            skipped = total.skipped,
            collapsed = total.collapsed,
            failed_channels = total.failed_channels,
            "persistence buffer stopped"
        );
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            AvatarRef, ChatMessage, DisplayName, Identity, MessageBody, MessageId,
            MockMessageStore, RoomIdFactory, Timestamp, UserId,
        },
        infrastructure::{cache::InMemoryMessageCache, repository::InMemoryMessageStore},
    };

    fn message(id: i64, channel: Channel, body: &str) -> ChatMessage {
        ChatMessage::new(
            MessageId::new(id),
            Identity::new(
                UserId::new("alice".to_string()).unwrap(),
                DisplayName::new("Alice".to_string()).unwrap(),
                AvatarRef::default(),
            ),
            channel,
            MessageBody::new(body.to_string()).unwrap(),
            Timestamp::new(1_000 + id),
        )
    }

    fn buffer(
        cache: Arc<InMemoryMessageCache>,
        store: Arc<dyn MessageStore>,
        batch_size: usize,
    ) -> PersistenceBuffer {
        PersistenceBuffer::new(cache, store, batch_size, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_flush_drains_every_channel_in_batches() {
        // テスト項目: チャンネルごとにバッチサイズまでフラッシュされる
        // given (前提条件):
        let cache = Arc::new(InMemoryMessageCache::new());
        let store = Arc::new(InMemoryMessageStore::new());
        let room = Channel::Room(RoomIdFactory::generate().unwrap());
        for id in 1..=3 {
            cache.append(message(id, Channel::Public, "p")).await.unwrap();
        }
        cache.append(message(4, room.clone(), "r")).await.unwrap();
        let buffer = buffer(cache.clone(), store.clone(), 2);

        // when (操作):
        let first = buffer.flush_once().await;
        let second = buffer.flush_once().await;
        let third = buffer.flush_once().await;

        // then (期待する結果):
        assert_eq!(first.committed, 3);
        assert_eq!(second.committed, 1);
        assert!(third.is_idle());
        assert_eq!(store.len().await, 4);
        assert_eq!(cache.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_flushing_same_entry_twice_keeps_one_record() {
        // テスト項目: 同じエントリを 2 回フラッシュしても永続レコードは 1 件（再起動の模擬）
        // given (前提条件):
        let cache = Arc::new(InMemoryMessageCache::new());
        let store = Arc::new(InMemoryMessageStore::new());
        let buffer = buffer(cache.clone(), store.clone(), 100);
        let entry = message(1, Channel::Public, "hello");
        cache.append(entry.clone()).await.unwrap();
        buffer.flush_once().await;

        // when (操作):
        cache.append(entry).await.unwrap();
        let report = buffer.flush_once().await;

        // then (期待する結果):
        assert_eq!(report.committed, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(cache.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_distinct_messages_sharing_natural_key_are_reported() {
        // テスト項目: 自然キーが同じ別メッセージ（ID が異なる）は再フラッシュと区別して collapsed として数えられる
        // given (前提条件):
        let cache = Arc::new(InMemoryMessageCache::new());
        let store = Arc::new(InMemoryMessageStore::new());
        let buffer = buffer(cache.clone(), store.clone(), 100);
        cache.append(message(1, Channel::Public, "ok")).await.unwrap();
        let mut repeated = message(2, Channel::Public, "ok");
        repeated.created_at = Timestamp::new(1_001);
        cache.append(repeated).await.unwrap();

        // when (操作):
        let first = buffer.flush_once().await;
        let mut later = message(3, Channel::Public, "ok");
        later.created_at = Timestamp::new(1_001);
        cache.append(later).await.unwrap();
        let second = buffer.flush_once().await;

        // then (期待する結果):
        assert_eq!(first.committed, 1);
        assert_eq!(first.collapsed, 1);
        assert_eq!(first.skipped, 0);
        assert_eq!(second.committed, 0);
        assert_eq!(second.collapsed, 1);
        assert_eq!(second.skipped, 0);
        assert_eq!(store.len().await, 1);
        assert_eq!(cache.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_keeps_entries_queued_for_retry() {
        // テスト項目: ストレージ障害時はエントリがキャッシュに残り、次のサイクルで再試行される
        // given (前提条件):
        let cache = Arc::new(InMemoryMessageCache::new());
        cache
            .append(message(1, Channel::Public, "hello"))
            .await
            .unwrap();
        let mut failing = MockMessageStore::new();
        failing.expect_committed_id().returning(|_| Ok(None));
        failing
            .expect_insert_batch()
            .returning(|_| Err(RepositoryError::Unavailable("database is locked".to_string())));

        // when (操作):
        let report = buffer(cache.clone(), Arc::new(failing), 100)
            .flush_once()
            .await;

        // then (期待する結果):
        assert_eq!(report.failed_channels, 1);
        assert_eq!(cache.pending_len().await, 1);

        // 復旧後のサイクルでコミットされる
        let store = Arc::new(InMemoryMessageStore::new());
        let retry = buffer(cache.clone(), store.clone(), 100).flush_once().await;
        assert_eq!(retry.committed, 1);
        assert_eq!(store.len().await, 1);
        assert_eq!(cache.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_run_commits_on_each_interval_without_shutdown() {
        // テスト項目: 停止シグナルがなくても、一定間隔のサイクルでキャッシュがコミットされる
        // given (前提条件):
        let cache = Arc::new(InMemoryMessageCache::new());
        let store = Arc::new(InMemoryMessageStore::new());
        let buffer = Arc::new(PersistenceBuffer::new(
            cache.clone(),
            store.clone(),
            100,
            Duration::from_millis(20),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = buffer.spawn(shutdown_rx);

        // when (操作):
        for id in 1..=3 {
            cache
                .append(message(id, Channel::Public, "tick"))
                .await
                .unwrap();
        }
        let committed = tokio::time::timeout(Duration::from_secs(2), async {
            while store.len().await < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        // then (期待する結果):
        assert!(committed.is_ok(), "interval flush did not commit");
        assert!(!handle.is_finished());
        assert_eq!(cache.pending_len().await, 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_flushes_remaining_entries_on_shutdown() {
        // テスト項目: 停止シグナルでループが終了し、残りのエントリが最終フラッシュされる
        // given (前提条件):
        let cache = Arc::new(InMemoryMessageCache::new());
        let store = Arc::new(InMemoryMessageStore::new());
        let buffer = Arc::new(PersistenceBuffer::new(
            cache.clone(),
            store.clone(),
            1,
            Duration::from_secs(3600),
        ));
        for id in 1..=3 {
            cache
                .append(message(id, Channel::Public, "queued"))
                .await
                .unwrap();
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = buffer.spawn(shutdown_rx);

        // when (操作):
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // then (期待する結果):
        assert_eq!(store.len().await, 3);
        assert_eq!(cache.pending_len().await, 0);
    }
}
