//! InMemory Room Repository 実装
//!
//! ドメイン層が定義する RoomRepository trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。
//!
//! 全てのテーブルを 1 つの Mutex で保護しているため、各メソッドは
//! 他のメソッドに対してアトミックに実行されます（承認とメンバーシップ作成を含む）。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Decision, InviteCode, JoinRequest, JoinRequestId, Membership, RepositoryError, Room, RoomId,
    RoomRepository, Timestamp, UserId, Visibility,
};

#[derive(Default)]
struct DirectoryTables {
    rooms: HashMap<RoomId, Room>,
    /// room id -> memberships in join order
    memberships: HashMap<RoomId, Vec<Membership>>,
    join_requests: HashMap<JoinRequestId, JoinRequest>,
}

impl DirectoryTables {
    fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> bool {
        self.memberships
            .get(room_id)
            .is_some_and(|members| members.iter().any(|m| &m.user_id == user_id))
    }

    fn add_membership(&mut self, membership: Membership) -> bool {
        if self.is_member(&membership.room_id, &membership.user_id) {
            return false;
        }
        self.memberships
            .entry(membership.room_id.clone())
            .or_default()
            .push(membership);
        true
    }
}

/// インメモリ Room Repository 実装
///
/// ドメイン層の RoomRepository trait を実装します（依存性の逆転）。
#[derive(Clone, Default)]
pub struct InMemoryRoomRepository {
    tables: Arc<Mutex<DirectoryTables>>,
}

impl InMemoryRoomRepository {
    /// 新しい InMemoryRoomRepository を作成
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn insert_room(&self, room: Room, creator: Membership) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.rooms.contains_key(&room.id) {
            return Err(RepositoryError::Conflict(format!(
                "room {} already exists",
                room.id
            )));
        }
        if let Some(code) = &room.invite_code
            && tables
                .rooms
                .values()
                .any(|r| r.invite_code.as_ref() == Some(code))
        {
            return Err(RepositoryError::Conflict(
                "invite code already in use".to_string(),
            ));
        }

        tables.rooms.insert(room.id.clone(), room);
        tables.add_membership(creator);
        Ok(())
    }

    async fn invite_code_exists(&self, code: &InviteCode) -> Result<bool, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rooms
            .values()
            .any(|r| r.invite_code.as_ref() == Some(code)))
    }

    async fn find_room(&self, room_id: &RoomId) -> Result<Option<Room>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.rooms.get(room_id).cloned())
    }

    async fn find_room_by_invite_code(
        &self,
        code: &InviteCode,
    ) -> Result<Option<Room>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .rooms
            .values()
            .find(|r| r.invite_code.as_ref() == Some(code))
            .cloned())
    }

    async fn list_rooms_visible_to(&self, user_id: &UserId) -> Result<Vec<Room>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut rooms: Vec<Room> = tables
            .rooms
            .values()
            .filter(|r| r.visibility == Visibility::Public || tables.is_member(&r.id, user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(rooms)
    }

    async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.is_member(room_id, user_id))
    }

    async fn add_membership(&self, membership: Membership) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if !tables.rooms.contains_key(&membership.room_id) {
            return Err(RepositoryError::NotFound(format!(
                "room {}",
                membership.room_id
            )));
        }
        Ok(tables.add_membership(membership))
    }

    async fn remove_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let Some(members) = tables.memberships.get_mut(room_id) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|m| &m.user_id != user_id);
        Ok(members.len() != before)
    }

    async fn list_memberships(&self, room_id: &RoomId) -> Result<Vec<Membership>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.memberships.get(room_id).cloned().unwrap_or_default())
    }

    async fn insert_join_request(&self, request: JoinRequest) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        if tables.is_member(&request.room_id, &request.requester.id) {
            return Err(RepositoryError::Conflict(
                "already a member of this room".to_string(),
            ));
        }
        let duplicate = tables.join_requests.values().any(|r| {
            r.is_pending() && r.room_id == request.room_id && r.requester.id == request.requester.id
        });
        if duplicate {
            return Err(RepositoryError::Conflict(
                "a join request is already pending".to_string(),
            ));
        }
        tables.join_requests.insert(request.id, request);
        Ok(())
    }

    async fn find_join_request(
        &self,
        id: &JoinRequestId,
    ) -> Result<Option<JoinRequest>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.join_requests.get(id).cloned())
    }

    async fn list_pending_join_requests(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<JoinRequest>, RepositoryError> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<JoinRequest> = tables
            .join_requests
            .values()
            .filter(|r| r.is_pending() && &r.room_id == room_id)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    async fn resolve_join_request(
        &self,
        id: &JoinRequestId,
        decision: Decision,
        decided_at: Timestamp,
    ) -> Result<JoinRequest, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let request = tables
            .join_requests
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("join request {id}")))?;
        request
            .decide(decision)
            .map_err(|e| RepositoryError::PreconditionFailed(e.to_string()))?;
        let resolved = request.clone();

        if decision == Decision::Approve {
            tables.add_membership(Membership::new(
                resolved.room_id.clone(),
                resolved.requester.id.clone(),
                decided_at,
            ));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        AvatarRef, DisplayName, Identity, InviteCodeFactory, JoinRequestIdFactory,
        JoinRequestStatus, RoomIdFactory, RoomName,
    };

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - InMemoryRoomRepository の基本的な操作
    // - 参加リクエストの一意性（pending は 1 件まで）
    // - 承認とメンバーシップ作成がアトミックに行われること
    //
    // 【なぜこのテストが必要か】
    // - Repository は RoomDirectory から呼ばれる認可判断の根拠
    // - 「pending かつ approved」のような不整合状態を防ぐ必要がある
    // ========================================

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn identity(id: &str) -> Identity {
        Identity::new(
            user(id),
            DisplayName::new(id.to_string()).unwrap(),
            AvatarRef::default(),
        )
    }

    async fn insert_private_room(repo: &InMemoryRoomRepository, creator: &str) -> Room {
        let room = Room::new_private(
            RoomIdFactory::generate().unwrap(),
            RoomName::new("Ops".to_string()).unwrap(),
            None,
            user(creator),
            Timestamp::new(100),
            InviteCodeFactory::generate(),
        );
        let membership = Membership::new(room.id.clone(), user(creator), Timestamp::new(100));
        repo.insert_room(room.clone(), membership).await.unwrap();
        room
    }

    fn pending_request(room: &Room, requester: &str) -> JoinRequest {
        JoinRequest::new(
            JoinRequestIdFactory::generate(),
            room.id.clone(),
            identity(requester),
            None,
            Timestamp::new(200),
        )
    }

    #[tokio::test]
    async fn test_insert_room_adds_creator_membership() {
        // テスト項目: ルーム作成時に作成者のメンバーシップも追加される
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();

        // when (操作):
        let room = insert_private_room(&repo, "alice").await;

        // then (期待する結果):
        assert_eq!(repo.find_room(&room.id).await.unwrap(), Some(room.clone()));
        assert!(repo.is_member(&room.id, &user("alice")).await.unwrap());
        assert!(
            repo.invite_code_exists(room.invite_code.as_ref().unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_insert_room_rejects_duplicate_invite_code() {
        // テスト項目: 既存と同じ招待コードのルームは作成できない
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();
        let existing = insert_private_room(&repo, "alice").await;
        let clash = Room::new_private(
            RoomIdFactory::generate().unwrap(),
            RoomName::new("Clash".to_string()).unwrap(),
            None,
            user("bob"),
            Timestamp::new(100),
            existing.invite_code.clone().unwrap(),
        );

        // when (操作):
        let result = repo
            .insert_room(
                clash.clone(),
                Membership::new(clash.id.clone(), user("bob"), Timestamp::new(100)),
            )
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        assert!(repo.find_room(&clash.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_membership_is_idempotent() {
        // テスト項目: 同じメンバーシップの追加は 2 回目が false になる
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();
        let room = insert_private_room(&repo, "alice").await;
        let membership = Membership::new(room.id.clone(), user("bob"), Timestamp::new(300));

        // when (操作):
        let first = repo.add_membership(membership.clone()).await.unwrap();
        let second = repo.add_membership(membership).await.unwrap();

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(repo.list_memberships(&room.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_join_request_rejects_second_pending() {
        // テスト項目: 同じ (ルーム, ユーザー) で 2 件目の pending リクエストは作成できない
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();
        let room = insert_private_room(&repo, "alice").await;
        repo.insert_join_request(pending_request(&room, "bob"))
            .await
            .unwrap();

        // when (操作):
        let result = repo.insert_join_request(pending_request(&room, "bob")).await;

        // then (期待する結果):
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        assert_eq!(
            repo.list_pending_join_requests(&room.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_resolve_join_request_approve_creates_membership() {
        // テスト項目: 承認するとステータス更新とメンバーシップ作成が同時に行われる
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();
        let room = insert_private_room(&repo, "alice").await;
        let request = pending_request(&room, "bob");
        repo.insert_join_request(request.clone()).await.unwrap();

        // when (操作):
        let resolved = repo
            .resolve_join_request(&request.id, Decision::Approve, Timestamp::new(400))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(resolved.status, JoinRequestStatus::Approved);
        assert!(repo.is_member(&room.id, &user("bob")).await.unwrap());
        assert!(
            repo.list_pending_join_requests(&room.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_resolve_join_request_twice_fails_without_mutation() {
        // テスト項目: 決定済みのリクエストは再決定できず、状態も変わらない
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();
        let room = insert_private_room(&repo, "alice").await;
        let request = pending_request(&room, "bob");
        repo.insert_join_request(request.clone()).await.unwrap();
        repo.resolve_join_request(&request.id, Decision::Reject, Timestamp::new(400))
            .await
            .unwrap();

        // when (操作):
        let result = repo
            .resolve_join_request(&request.id, Decision::Approve, Timestamp::new(500))
            .await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(RepositoryError::PreconditionFailed(_))
        ));
        assert!(!repo.is_member(&room.id, &user("bob")).await.unwrap());
        let stored = repo.find_join_request(&request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JoinRequestStatus::Rejected);
    }

    #[tokio::test]
    async fn test_list_rooms_visible_to_hides_foreign_private_rooms() {
        // テスト項目: 他人のプライベートルームは一覧に表示されない
        // given (前提条件):
        let repo = InMemoryRoomRepository::new();
        let private = insert_private_room(&repo, "alice").await;
        let public = Room::new_public(
            RoomIdFactory::generate().unwrap(),
            RoomName::new("Lobby".to_string()).unwrap(),
            None,
            user("alice"),
            Timestamp::new(50),
        );
        repo.insert_room(
            public.clone(),
            Membership::new(public.id.clone(), user("alice"), Timestamp::new(50)),
        )
        .await
        .unwrap();

        // when (操作):
        let for_alice = repo.list_rooms_visible_to(&user("alice")).await.unwrap();
        let for_bob = repo.list_rooms_visible_to(&user("bob")).await.unwrap();

        // then (期待する結果): 新しい順に並ぶ
        assert_eq!(for_alice, vec![private, public.clone()]);
        assert_eq!(for_bob, vec![public]);
    }
}
