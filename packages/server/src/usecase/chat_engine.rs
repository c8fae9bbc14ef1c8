//! UseCase: チャットエンジン
//!
//! トランスポート層（HTTP / WebSocket）に公開される窓口です。
//! 接続ライフサイクル、ルーム操作、問い合わせ、接続へのイベント通知をまとめます。

use std::sync::Arc;

use crate::domain::{
    Channel, ChatMessage, Clock, ConnectionId, ConnectionIdFactory, Decision, Identity,
    InviteCode, JoinRequest, JoinRequestId, Membership, MessageCache, MessageStore, Room, RoomId,
    RoomRepository, UserId, Visibility,
};

use super::{
    connection_registry::{ConnectionRegistry, EventSender, JoinOutcome},
    error::ChatError,
    event::ChatEvent,
    message_pipeline::MessagePipeline,
    room_directory::{Action, ChannelAccess, RoomDirectory},
};

/// History page sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl HistoryLimits {
    fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
        }
    }
}

/// チャットエンジン
pub struct ChatEngine {
    directory: Arc<RoomDirectory>,
    registry: Arc<ConnectionRegistry>,
    pipeline: Arc<MessagePipeline>,
    history: HistoryLimits,
}

impl ChatEngine {
    /// Wire the directory, registry and pipeline over the given storage.
    pub async fn new(
        rooms: Arc<dyn RoomRepository>,
        cache: Arc<dyn MessageCache>,
        store: Arc<dyn MessageStore>,
        clock: Arc<dyn Clock>,
        history: HistoryLimits,
    ) -> Result<Self, ChatError> {
        let directory = Arc::new(RoomDirectory::new(rooms, clock.clone()));
        let registry = Arc::new(ConnectionRegistry::new(directory.clone()));
        let pipeline = Arc::new(
            MessagePipeline::new(directory.clone(), registry.clone(), cache, store, clock).await?,
        );
        Ok(Self {
            directory,
            registry,
            pipeline,
            history,
        })
    }

    /// 接続を登録し、新しい接続 ID を返す
    pub async fn on_connect(
        &self,
        identity: Identity,
        sender: EventSender,
    ) -> Result<ConnectionId, ChatError> {
        let connection_id = ConnectionIdFactory::generate();
        self.registry.connect(connection_id, identity, sender).await?;
        Ok(connection_id)
    }

    /// 接続を削除し、すべてのプレゼンスを取り除く
    pub async fn on_disconnect(&self, connection_id: &ConnectionId) -> Vec<Channel> {
        self.registry.disconnect(connection_id).await
    }

    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        room_id: Option<RoomId>,
        invite_code: Option<String>,
    ) -> Result<JoinOutcome, ChatError> {
        let invite_code = invite_code.map(InviteCode::new).transpose()?;
        self.registry
            .join(connection_id, &Channel::from_room_id(room_id), invite_code)
            .await
    }

    pub async fn leave(&self, connection_id: &ConnectionId, room_id: Option<RoomId>) -> bool {
        self.registry
            .leave(connection_id, &Channel::from_room_id(room_id))
            .await
    }

    pub async fn send(
        &self,
        author: &Identity,
        room_id: Option<RoomId>,
        body: String,
    ) -> Result<ChatMessage, ChatError> {
        self.pipeline
            .send(author, &Channel::from_room_id(room_id), body)
            .await
    }

    /// `limit` defaults to and is capped by the configured history sizes
    pub async fn list_recent_messages(
        &self,
        user_id: &UserId,
        room_id: Option<RoomId>,
        limit: Option<usize>,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        self.pipeline
            .recent_messages(
                user_id,
                &Channel::from_room_id(room_id),
                self.history.resolve(limit),
            )
            .await
    }

    /// Identities currently present, readable by whoever may read the channel
    pub async fn list_members(
        &self,
        user_id: &UserId,
        room_id: Option<RoomId>,
    ) -> Result<Vec<Identity>, ChatError> {
        let channel = Channel::from_room_id(room_id);
        self.directory
            .authorize(user_id, &channel, Action::Read)
            .await?;
        Ok(self.registry.member_list(&channel).await)
    }

    pub async fn member_count(&self, room_id: Option<RoomId>) -> usize {
        self.registry
            .member_count(&Channel::from_room_id(room_id))
            .await
    }

    pub async fn create_room(
        &self,
        creator: &UserId,
        name: String,
        description: Option<String>,
        visibility: Visibility,
    ) -> Result<Room, ChatError> {
        self.directory
            .create_room(creator, name, description, visibility)
            .await
    }

    /// 参加リクエストを作成し、ルーム作成者の接続へ通知する
    pub async fn request_join(
        &self,
        requester: &Identity,
        room_id: &RoomId,
        message: Option<String>,
    ) -> Result<JoinRequest, ChatError> {
        let (room, request) = self
            .directory
            .request_join(requester, room_id, message)
            .await?;
        self.registry
            .send_to_user(
                &room.creator_id,
                ChatEvent::JoinRequestReceived {
                    room_name: room.name,
                    request: request.clone(),
                },
            )
            .await;
        Ok(request)
    }

    /// 参加リクエストを決定し、リクエスト者の接続へ結果を通知する
    pub async fn decide_join_request(
        &self,
        actor: &UserId,
        request_id: &JoinRequestId,
        decision: Decision,
    ) -> Result<JoinRequest, ChatError> {
        let (room, request) = self
            .directory
            .decide_join_request(actor, request_id, decision)
            .await?;
        self.registry
            .send_to_user(
                &request.requester.id,
                ChatEvent::JoinRequestStatus {
                    room_name: room.name,
                    request: request.clone(),
                },
            )
            .await;
        Ok(request)
    }

    /// メンバーを削除し、その接続をルームから退出させる（kicked_from_room を通知）
    pub async fn remove_member(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<bool, ChatError> {
        let removed = self.directory.remove_member(actor, room_id, target).await?;
        if removed {
            self.registry
                .evict_user(&Channel::Room(room_id.clone()), target)
                .await;
        }
        Ok(removed)
    }

    pub async fn list_rooms(&self, user_id: &UserId) -> Result<Vec<Room>, ChatError> {
        self.directory.list_rooms(user_id).await
    }

    /// Private rooms are visible to their members only
    pub async fn get_room(&self, viewer: &UserId, room_id: &RoomId) -> Result<Room, ChatError> {
        match self
            .directory
            .authorize(viewer, &Channel::Room(room_id.clone()), Action::Read)
            .await?
        {
            ChannelAccess::Room(room) => Ok(room),
            ChannelAccess::Public => Err(ChatError::NotFound(format!("room {room_id} not found"))),
        }
    }

    pub async fn list_join_requests(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<JoinRequest>, ChatError> {
        self.directory.list_join_requests(actor, room_id).await
    }

    pub async fn list_memberships(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Membership>, ChatError> {
        self.directory.list_memberships(actor, room_id).await
    }

    pub async fn resolve_invite(&self, code: String) -> Result<Room, ChatError> {
        self.directory.resolve_invite(code).await
    }

    /// 招待リンクからプライベートルームに参加する（接続は不要）
    pub async fn accept_invite(&self, user_id: &UserId, code: String) -> Result<Room, ChatError> {
        let room = self.directory.resolve_invite(code).await?;
        self.directory
            .authorize(
                user_id,
                &Channel::Room(room.id.clone()),
                Action::Join {
                    invite_code: room.invite_code.clone(),
                },
            )
            .await?;
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{
            AvatarRef, DisplayName, InviteCodeFactory, JoinRequestIdFactory, JoinRequestStatus,
            ManualClock, MockRoomRepository, RepositoryError, RoomIdFactory, RoomName, Timestamp,
        },
        infrastructure::{
            cache::InMemoryMessageCache,
            repository::{InMemoryMessageStore, InMemoryRoomRepository},
        },
    };
    use async_trait::async_trait;
    use tokio::sync::{
        Notify,
        mpsc::{self, UnboundedReceiver},
    };

    struct MembershipGate {
        user_id: UserId,
        paused: Arc<Notify>,
        release: Arc<Notify>,
    }

    /// In-memory rooms whose next membership check for one user stalls after reading.
    #[derive(Default)]
    struct GatedRoomRepository {
        inner: InMemoryRoomRepository,
        gate: std::sync::Mutex<Option<MembershipGate>>,
    }

    impl GatedRoomRepository {
        /// Returns (paused, release): `paused` fires once the check has read its answer.
        fn pause_next_membership_check(&self, user_id: &UserId) -> (Arc<Notify>, Arc<Notify>) {
            let paused = Arc::new(Notify::new());
            let release = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(MembershipGate {
                user_id: user_id.clone(),
                paused: paused.clone(),
                release: release.clone(),
            });
            (paused, release)
        }
    }

    #[async_trait]
    impl RoomRepository for GatedRoomRepository {
        async fn insert_room(&self, room: Room, creator: Membership) -> Result<(), RepositoryError> {
            self.inner.insert_room(room, creator).await
        }

        async fn invite_code_exists(&self, code: &InviteCode) -> Result<bool, RepositoryError> {
            self.inner.invite_code_exists(code).await
        }

        async fn find_room(&self, room_id: &RoomId) -> Result<Option<Room>, RepositoryError> {
            self.inner.find_room(room_id).await
        }

        async fn find_room_by_invite_code(
            &self,
            code: &InviteCode,
        ) -> Result<Option<Room>, RepositoryError> {
            self.inner.find_room_by_invite_code(code).await
        }

        async fn list_rooms_visible_to(
            &self,
            user_id: &UserId,
        ) -> Result<Vec<Room>, RepositoryError> {
            self.inner.list_rooms_visible_to(user_id).await
        }

        async fn is_member(
            &self,
            room_id: &RoomId,
            user_id: &UserId,
        ) -> Result<bool, RepositoryError> {
            let member = self.inner.is_member(room_id, user_id).await;
            let gate = {
                let mut slot = self.gate.lock().unwrap();
                if slot.as_ref().is_some_and(|g| &g.user_id == user_id) {
                    slot.take()
                } else {
                    None
                }
            };
            if let Some(gate) = gate {
                gate.paused.notify_one();
                gate.release.notified().await;
            }
            member
        }

        async fn add_membership(&self, membership: Membership) -> Result<bool, RepositoryError> {
            self.inner.add_membership(membership).await
        }

        async fn remove_membership(
            &self,
            room_id: &RoomId,
            user_id: &UserId,
        ) -> Result<bool, RepositoryError> {
            self.inner.remove_membership(room_id, user_id).await
        }

        async fn list_memberships(
            &self,
            room_id: &RoomId,
        ) -> Result<Vec<Membership>, RepositoryError> {
            self.inner.list_memberships(room_id).await
        }

        async fn insert_join_request(&self, request: JoinRequest) -> Result<(), RepositoryError> {
            self.inner.insert_join_request(request).await
        }

        async fn find_join_request(
            &self,
            id: &JoinRequestId,
        ) -> Result<Option<JoinRequest>, RepositoryError> {
            self.inner.find_join_request(id).await
        }

        async fn list_pending_join_requests(
            &self,
            room_id: &RoomId,
        ) -> Result<Vec<JoinRequest>, RepositoryError> {
            self.inner.list_pending_join_requests(room_id).await
        }

        async fn resolve_join_request(
            &self,
            id: &JoinRequestId,
            decision: Decision,
            decided_at: Timestamp,
        ) -> Result<JoinRequest, RepositoryError> {
            self.inner.resolve_join_request(id, decision, decided_at).await
        }
    }

    async fn create_engine() -> ChatEngine {
        ChatEngine::new(
            Arc::new(InMemoryRoomRepository::new()),
            Arc::new(InMemoryMessageCache::new()),
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(ManualClock::new(1_000)),
            HistoryLimits::default(),
        )
        .await
        .unwrap()
    }

    fn identity(id: &str) -> Identity {
        Identity::new(
            UserId::new(id.to_string()).unwrap(),
            DisplayName::new(id.to_string()).unwrap(),
            AvatarRef::default(),
        )
    }

    async fn connect(
        engine: &ChatEngine,
        user: &str,
    ) -> (ConnectionId, UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = engine.on_connect(identity(user), tx).await.unwrap();
        (connection_id, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_ops_scenario_through_engine() {
        // テスト項目: 作成 → 参加リクエスト → 承認 → join → メンバー一覧、通知も届く
        // given (前提条件):
        let engine = create_engine().await;
        let alice = identity("alice");
        let bob = identity("bob");
        let (alice_conn, mut alice_rx) = connect(&engine, "alice").await;
        let (bob_conn, mut bob_rx) = connect(&engine, "bob").await;
        let room = engine
            .create_room(&alice.id, "Ops".to_string(), None, Visibility::Private)
            .await
            .unwrap();
        engine
            .join(&alice_conn, Some(room.id.clone()), None)
            .await
            .unwrap();
        drain(&mut alice_rx);

        // when (操作):
        let request = engine
            .request_join(&bob, &room.id, Some("let me in".to_string()))
            .await
            .unwrap();
        engine
            .decide_join_request(&alice.id, &request.id, Decision::Approve)
            .await
            .unwrap();
        let joined = engine.join(&bob_conn, Some(room.id.clone()), None).await;
        let again = engine
            .decide_join_request(&alice.id, &request.id, Decision::Approve)
            .await;

        // then (期待する結果):
        assert_eq!(joined.unwrap().member_count, 2);
        assert!(matches!(again, Err(ChatError::InvalidState(_))));
        let members = engine
            .list_members(&alice.id, Some(room.id.clone()))
            .await
            .unwrap();
        assert_eq!(members, vec![alice.clone(), bob.clone()]);

        let alice_events = drain(&mut alice_rx);
        assert!(matches!(
            &alice_events[0],
            ChatEvent::JoinRequestReceived { request: r, .. } if r.id == request.id
        ));
        let bob_events = drain(&mut bob_rx);
        assert!(matches!(
            &bob_events[0],
            ChatEvent::JoinRequestStatus { request: r, .. }
                if r.status == JoinRequestStatus::Approved
        ));
    }

    #[tokio::test]
    async fn test_remove_member_kicks_live_connections() {
        // テスト項目: メンバー削除で対象の接続に kicked_from_room が届き、プレゼンスが消える
        // given (前提条件):
        let engine = create_engine().await;
        let alice = identity("alice");
        let room = engine
            .create_room(&alice.id, "Ops".to_string(), None, Visibility::Private)
            .await
            .unwrap();
        let code = room.invite_code.clone().unwrap();
        let (bob_conn, mut bob_rx) = connect(&engine, "bob").await;
        engine
            .join(&bob_conn, Some(room.id.clone()), Some(code.as_str().to_string()))
            .await
            .unwrap();
        drain(&mut bob_rx);

        // when (操作):
        let removed = engine
            .remove_member(&alice.id, &room.id, &identity("bob").id)
            .await;

        // then (期待する結果):
        assert_eq!(removed, Ok(true));
        assert_eq!(
            drain(&mut bob_rx),
            vec![ChatEvent::KickedFromRoom {
                room_id: room.id.clone()
            }]
        );
        assert_eq!(engine.member_count(Some(room.id.clone())).await, 0);
        let send = engine
            .send(&identity("bob"), Some(room.id), "still here?".to_string())
            .await;
        assert!(matches!(send, Err(ChatError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn test_member_removed_while_join_is_authorizing_is_not_registered() {
        // テスト項目: join の認可中にメンバー削除が完了した場合、join は拒否されメッセージも届かない
        // given (前提条件):
        let repo = Arc::new(GatedRoomRepository::default());
        let engine = Arc::new(
            ChatEngine::new(
                repo.clone(),
                Arc::new(InMemoryMessageCache::new()),
                Arc::new(InMemoryMessageStore::new()),
                Arc::new(ManualClock::new(1_000)),
                HistoryLimits::default(),
            )
            .await
            .unwrap(),
        );
        let alice = identity("alice");
        let bob = identity("bob");
        let room = engine
            .create_room(&alice.id, "Ops".to_string(), None, Visibility::Private)
            .await
            .unwrap();
        engine
            .accept_invite(&bob.id, room.invite_code.clone().unwrap().as_str().to_string())
            .await
            .unwrap();
        let (alice_conn, _alice_rx) = connect(&engine, "alice").await;
        engine
            .join(&alice_conn, Some(room.id.clone()), None)
            .await
            .unwrap();
        let (bob_conn, mut bob_rx) = connect(&engine, "bob").await;
        let (paused, release) = repo.pause_next_membership_check(&bob.id);

        // when (操作):
        let join = tokio::spawn({
            let engine = engine.clone();
            let room_id = room.id.clone();
            async move { engine.join(&bob_conn, Some(room_id), None).await }
        });
        paused.notified().await;
        let removed = engine.remove_member(&alice.id, &room.id, &bob.id).await;
        release.notify_one();
        let joined = join.await.unwrap();
        engine
            .send(&alice, Some(room.id.clone()), "secret".to_string())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(removed, Ok(true));
        assert!(matches!(joined, Err(ChatError::AccessDenied(_))));
        assert_eq!(engine.member_count(Some(room.id.clone())).await, 1);
        assert!(
            !drain(&mut bob_rx)
                .iter()
                .any(|event| matches!(event, ChatEvent::Message(_)))
        );
    }

    #[tokio::test]
    async fn test_decide_join_request_loads_room_once() {
        // テスト項目: 決定のコミット後にルームを再読込しない（読込失敗で適用済みの決定がエラーにならない）
        // given (前提条件):
        let room = Room::new_private(
            RoomIdFactory::generate().unwrap(),
            RoomName::new("Ops".to_string()).unwrap(),
            None,
            identity("alice").id,
            Timestamp::new(1_000),
            InviteCodeFactory::generate(),
        );
        let pending = JoinRequest::new(
            JoinRequestIdFactory::generate(),
            room.id.clone(),
            identity("bob"),
            None,
            Timestamp::new(1_000),
        );
        let mut approved = pending.clone();
        approved.decide(Decision::Approve).unwrap();

        let mut repository = MockRoomRepository::new();
        let found = pending.clone();
        repository
            .expect_find_join_request()
            .returning(move |_| Ok(Some(found.clone())));
        let loaded = room.clone();
        repository
            .expect_find_room()
            .times(1)
            .returning(move |_| Ok(Some(loaded.clone())));
        repository
            .expect_resolve_join_request()
            .times(1)
            .returning(move |_, _, _| Ok(approved.clone()));
        let engine = ChatEngine::new(
            Arc::new(repository),
            Arc::new(InMemoryMessageCache::new()),
            Arc::new(InMemoryMessageStore::new()),
            Arc::new(ManualClock::new(1_000)),
            HistoryLimits::default(),
        )
        .await
        .unwrap();
        let (_bob_conn, mut bob_rx) = connect(&engine, "bob").await;

        // when (操作):
        let decided = engine
            .decide_join_request(&identity("alice").id, &pending.id, Decision::Approve)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(decided.status, JoinRequestStatus::Approved);
        assert!(matches!(
            &drain(&mut bob_rx)[..],
            [ChatEvent::JoinRequestStatus { room_name, .. }] if room_name == &room.name
        ));
    }

    #[tokio::test]
    async fn test_private_room_detail_is_members_only() {
        // テスト項目: プライベートルームの詳細はメンバーのみ取得でき、パブリックルームは誰でも取得できる
        // given (前提条件):
        let engine = create_engine().await;
        let alice = identity("alice");
        let mallory = identity("mallory");
        let ops = engine
            .create_room(&alice.id, "Ops".to_string(), None, Visibility::Private)
            .await
            .unwrap();
        let lobby = engine
            .create_room(&alice.id, "Lobby".to_string(), None, Visibility::Public)
            .await
            .unwrap();

        // when (操作):
        let by_member = engine.get_room(&alice.id, &ops.id).await;
        let by_stranger = engine.get_room(&mallory.id, &ops.id).await;
        let public = engine.get_room(&mallory.id, &lobby.id).await;

        // then (期待する結果):
        assert_eq!(by_member.unwrap().id, ops.id);
        assert!(matches!(by_stranger, Err(ChatError::AccessDenied(_))));
        assert_eq!(public.unwrap().id, lobby.id);
    }

    #[tokio::test]
    async fn test_accept_invite_creates_membership_without_connection() {
        // テスト項目: 招待リンクの受諾で接続なしにメンバーになれる
        // given (前提条件):
        let engine = create_engine().await;
        let alice = identity("alice");
        let carol = identity("carol");
        let room = engine
            .create_room(&alice.id, "Ops".to_string(), None, Visibility::Private)
            .await
            .unwrap();

        // when (操作):
        let accepted = engine
            .accept_invite(
                &carol.id,
                room.invite_code.clone().unwrap().as_str().to_string(),
            )
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(accepted.id, room.id);
        let roster = engine.list_memberships(&carol.id, &room.id).await.unwrap();
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_history_limit_is_capped() {
        // テスト項目: 履歴件数は指定がなければ既定値、上限を超える指定は上限に丸められる
        // given (前提条件):
        let limits = HistoryLimits {
            default_limit: 2,
            max_limit: 3,
        };

        // then (期待する結果):
        assert_eq!(limits.resolve(None), 2);
        assert_eq!(limits.resolve(Some(1)), 1);
        assert_eq!(limits.resolve(Some(500)), 3);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_presence() {
        // テスト項目: on_disconnect でその接続のプレゼンスがすべて消える
        // given (前提条件):
        let engine = create_engine().await;
        let (conn, _rx) = connect(&engine, "alice").await;
        engine.join(&conn, None, None).await.unwrap();

        // when (操作):
        let left = engine.on_disconnect(&conn).await;

        // then (期待する結果):
        assert_eq!(left, vec![Channel::Public]);
        assert_eq!(engine.member_count(None).await, 0);
    }
}
