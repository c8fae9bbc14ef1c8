//! UseCase: 接続レジストリ
//!
//! どの認証済みユーザーが、どの接続で、どのチャンネルにいるか（プレゼンス）を管理します。
//! 状態はすべて単一の `Mutex` で保護され、join / leave / disconnect は直列化されます。

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, mpsc};

use crate::domain::{Channel, ConnectionId, Identity, InviteCode, UserId};

use super::{
    error::ChatError,
    event::ChatEvent,
    room_directory::{Action, ChannelAccess, RoomDirectory},
};

/// Queue feeding one connection's writer task
pub type EventSender = mpsc::UnboundedSender<ChatEvent>;

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub channel: Channel,
    pub member_count: usize,
    /// Full roster, private rooms only
    pub members: Option<Vec<Identity>>,
}

struct ConnectionEntry {
    identity: Identity,
    sender: EventSender,
    channels: Vec<Channel>,
}

#[derive(Default)]
struct ChannelPresence {
    private: bool,
    /// Join order
    entries: Vec<(ConnectionId, Identity)>,
}

impl ChannelPresence {
    fn members(&self) -> Vec<Identity> {
        let mut members: Vec<Identity> = Vec::new();
        for (_, identity) in &self.entries {
            if !members.iter().any(|m| m.id == identity.id) {
                members.push(identity.clone());
            }
        }
        members
    }
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    presence: HashMap<Channel, ChannelPresence>,
}

impl RegistryState {
    fn member_count(&self, channel: &Channel) -> usize {
        self.presence
            .get(channel)
            .map(|p| p.entries.len())
            .unwrap_or(0)
    }

    /// Remove `connection_id` from `channel`, dropping the presence once empty.
    fn remove_entry(&mut self, channel: &Channel, connection_id: &ConnectionId) -> bool {
        let Some(presence) = self.presence.get_mut(channel) else {
            return false;
        };
        let before = presence.entries.len();
        presence.entries.retain(|(id, _)| id != connection_id);
        let removed = presence.entries.len() != before;
        if presence.entries.is_empty() {
            self.presence.remove(channel);
        }
        removed
    }

    /// Deliver `event` to every connection present in `channel`.
    fn deliver(&self, channel: &Channel, event: &ChatEvent) -> usize {
        let Some(presence) = self.presence.get(channel) else {
            return 0;
        };
        let mut delivered = 0;
        for (connection_id, _) in &presence.entries {
            if let Some(entry) = self.connections.get(connection_id) {
                if entry.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    tracing::debug!(%connection_id, "connection queue closed, event dropped");
                }
            }
        }
        delivered
    }

    /// Emit `member_count` (and `member_list_update` for private rooms).
    fn notify_presence(&self, channel: &Channel) {
        let Some(presence) = self.presence.get(channel) else {
            return;
        };
        self.deliver(
            channel,
            &ChatEvent::MemberCount {
                channel: channel.clone(),
                count: presence.entries.len(),
            },
        );
        if presence.private {
            self.deliver(
                channel,
                &ChatEvent::MemberListUpdate {
                    channel: channel.clone(),
                    members: presence.members(),
                },
            );
        }
    }
}

/// 接続レジストリ
pub struct ConnectionRegistry {
    directory: Arc<RoomDirectory>,
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new(directory: Arc<RoomDirectory>) -> Self {
        Self {
            directory,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// 接続を登録する
    ///
    /// # Arguments
    ///
    /// * `connection_id` - 接続 ID
    /// * `identity` - 認証済みのユーザー情報（接続中は不変）
    /// * `sender` - この接続へのイベント送信キュー
    ///
    /// # Errors
    ///
    /// * `ChatError::Conflict` - 同じ接続 ID が既に登録されている
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        identity: Identity,
        sender: EventSender,
    ) -> Result<(), ChatError> {
        let mut state = self.state.lock().await;
        if state.connections.contains_key(&connection_id) {
            return Err(ChatError::Conflict(format!(
                "connection {connection_id} is already registered"
            )));
        }
        tracing::info!(%connection_id, user_id = %identity.id, "connection registered");
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                identity,
                sender,
                channels: Vec::new(),
            },
        );
        Ok(())
    }

    /// チャンネルに参加する
    ///
    /// 認可に失敗した場合は状態を一切変更しません。
    /// 同じ接続での再参加は冪等です（エントリは増えません）。
    /// プライベートルームの Membership はロック取得後にも確認します。
    /// ロック取得前に削除されていれば `AccessDenied`、取得後の削除は `evict_user` が取り除きます。
    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        channel: &Channel,
        invite_code: Option<InviteCode>,
    ) -> Result<JoinOutcome, ChatError> {
        let identity = self.identity_of(connection_id).await?;
        let access = self
            .directory
            .authorize(&identity.id, channel, Action::Join { invite_code })
            .await?;

        let mut state = self.state.lock().await;
        if let ChannelAccess::Room(room) = &access
            && room.is_private()
            && !self.directory.is_member(&room.id, &identity.id).await?
        {
            tracing::info!(
                %connection_id,
                user_id = %identity.id,
                %channel,
                "membership revoked before join"
            );
            return Err(ChatError::AccessDenied(
                "not a member of this room".to_string(),
            ));
        }
        // the connection may have gone away while authorizing
        let Some(entry) = state.connections.get_mut(connection_id) else {
            return Err(ChatError::NotFound(format!(
                "connection {connection_id} is not registered"
            )));
        };
        if !entry.channels.contains(channel) {
            entry.channels.push(channel.clone());
        }

        let presence = state.presence.entry(channel.clone()).or_default();
        presence.private = access.is_private();
        if !presence.entries.iter().any(|(id, _)| id == connection_id) {
            presence.entries.push((*connection_id, identity.clone()));
        }
        let member_count = presence.entries.len();
        let members = presence.private.then(|| presence.members());

        tracing::info!(%connection_id, user_id = %identity.id, %channel, member_count, "joined");
        state.notify_presence(channel);

        Ok(JoinOutcome {
            channel: channel.clone(),
            member_count,
            members,
        })
    }

    /// チャンネルから退出する（参加していなければ何もしない）
    pub async fn leave(&self, connection_id: &ConnectionId, channel: &Channel) -> bool {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.connections.get_mut(connection_id) {
            entry.channels.retain(|c| c != channel);
        }
        let removed = state.remove_entry(channel, connection_id);
        if removed {
            tracing::info!(%connection_id, %channel, "left");
            state.notify_presence(channel);
        }
        removed
    }

    /// 接続を削除し、その接続が持つすべてのプレゼンスを取り除く
    ///
    /// # Returns
    ///
    /// 接続が参加していたチャンネルの一覧
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Vec<Channel> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.connections.remove(connection_id) else {
            return Vec::new();
        };

        let mut left = Vec::new();
        for channel in entry.channels {
            if state.remove_entry(&channel, connection_id) {
                state.notify_presence(&channel);
                left.push(channel);
            }
        }
        tracing::info!(
            %connection_id,
            user_id = %entry.identity.id,
            channels = left.len(),
            "connection removed"
        );
        left
    }

    /// Number of presence entries (one per connection)
    pub async fn member_count(&self, channel: &Channel) -> usize {
        self.state.lock().await.member_count(channel)
    }

    /// Distinct identities present, in join order
    pub async fn member_list(&self, channel: &Channel) -> Vec<Identity> {
        self.state
            .lock()
            .await
            .presence
            .get(channel)
            .map(ChannelPresence::members)
            .unwrap_or_default()
    }

    pub async fn is_present(&self, connection_id: &ConnectionId, channel: &Channel) -> bool {
        self.state
            .lock()
            .await
            .presence
            .get(channel)
            .is_some_and(|p| p.entries.iter().any(|(id, _)| id == connection_id))
    }

    /// Deliver `event` to every connection present in `channel`.
    ///
    /// At-most-once: closed queues are skipped.
    pub async fn broadcast(&self, channel: &Channel, event: ChatEvent) -> usize {
        self.state.lock().await.deliver(channel, &event)
    }

    /// Deliver `event` to every live connection of `user_id`.
    pub async fn send_to_user(&self, user_id: &UserId, event: ChatEvent) -> usize {
        let state = self.state.lock().await;
        state
            .connections
            .values()
            .filter(|entry| &entry.identity.id == user_id)
            .filter(|entry| entry.sender.send(event.clone()).is_ok())
            .count()
    }

    /// Remove every presence of `user_id` in `channel` and tell its connections.
    pub async fn evict_user(&self, channel: &Channel, user_id: &UserId) -> usize {
        let mut state = self.state.lock().await;
        let evicted: Vec<ConnectionId> = state
            .presence
            .get(channel)
            .map(|p| {
                p.entries
                    .iter()
                    .filter(|(_, identity)| &identity.id == user_id)
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default();

        for connection_id in &evicted {
            state.remove_entry(channel, connection_id);
            if let Some(entry) = state.connections.get_mut(connection_id) {
                entry.channels.retain(|c| c != channel);
            }
        }

        if let Channel::Room(room_id) = channel {
            for entry in state.connections.values() {
                if &entry.identity.id == user_id {
                    let _ = entry.sender.send(ChatEvent::KickedFromRoom {
                        room_id: room_id.clone(),
                    });
                }
            }
        }

        if !evicted.is_empty() {
            tracing::info!(%channel, user_id = %user_id, connections = evicted.len(), "evicted");
            state.notify_presence(channel);
        }
        evicted.len()
    }

    async fn identity_of(&self, connection_id: &ConnectionId) -> Result<Identity, ChatError> {
        self.state
            .lock()
            .await
            .connections
            .get(connection_id)
            .map(|entry| entry.identity.clone())
            .ok_or_else(|| {
                ChatError::NotFound(format!("connection {connection_id} is not registered"))
            })
    }
}
