//! UseCase: ルームディレクトリ
//!
//! Room / Membership / JoinRequest を所有し、すべての認可判断を一箇所に集約します。
//! Connection Registry と Message Pipeline はここを経由してのみアクセス可否を判定します。

use std::sync::Arc;

use crate::domain::{
    Channel, Clock, Decision, Identity, InviteCode, InviteCodeFactory, JoinNote, JoinRequest,
    JoinRequestId, JoinRequestIdFactory, Membership, RepositoryError, Room, RoomDescription,
    RoomId, RoomIdFactory, RoomName, RoomRepository, UserId, Visibility,
};

use super::error::ChatError;

/// Number of invite codes drawn before giving up on a private room
const INVITE_CODE_ATTEMPTS: usize = 8;

/// Action being authorized against a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
    /// Joining a private room needs a membership or the room's invite code
    Join { invite_code: Option<InviteCode> },
}

/// What an authorized caller may act on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAccess {
    Public,
    Room(Room),
}

impl ChannelAccess {
    pub fn is_private(&self) -> bool {
        matches!(self, ChannelAccess::Room(room) if room.is_private())
    }
}

/// ルームディレクトリ
pub struct RoomDirectory {
    /// Repository（データアクセス層の抽象化）
    repository: Arc<dyn RoomRepository>,
    clock: Arc<dyn Clock>,
}

impl RoomDirectory {
    pub fn new(repository: Arc<dyn RoomRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// ルームを作成する
    ///
    /// 作成者の Membership はルームと同じ書き込みで作成されます。
    /// プライベートルームには衝突チェック済みの招待コードが割り当てられます。
    ///
    /// # Errors
    ///
    /// * `ChatError::Validation` - ルーム名が空、または説明が長すぎる
    /// * `ChatError::Unavailable` - ストレージ障害、または招待コードを確保できなかった
    pub async fn create_room(
        &self,
        creator: &UserId,
        name: String,
        description: Option<String>,
        visibility: Visibility,
    ) -> Result<Room, ChatError> {
        let name = RoomName::new(name)?;
        let description = RoomDescription::parse(description)?;
        let room_id = RoomIdFactory::generate()?;
        let now = self.clock.now();
        let membership = Membership::new(room_id.clone(), creator.clone(), now);

        if visibility == Visibility::Public {
            let room = Room::new_public(room_id, name, description, creator.clone(), now);
            self.repository
                .insert_room(room.clone(), membership)
                .await?;
            tracing::info!(room_id = %room.id, creator = %creator, "public room created");
            return Ok(room);
        }

        for attempt in 1..=INVITE_CODE_ATTEMPTS {
            let code = InviteCodeFactory::generate();
            if self.repository.invite_code_exists(&code).await? {
                tracing::debug!(attempt, "invite code collision, drawing again");
                continue;
            }
            let room = Room::new_private(
                room_id.clone(),
                name.clone(),
                description.clone(),
                creator.clone(),
                now,
                code,
            );
            match self
                .repository
                .insert_room(room.clone(), membership.clone())
                .await
            {
                Ok(()) => {
                    tracing::info!(room_id = %room.id, creator = %creator, "private room created");
                    return Ok(room);
                }
                // lost a race for the same code
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::debug!(attempt, %reason, "invite code taken on insert");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::error!(
            attempts = INVITE_CODE_ATTEMPTS,
            "could not allocate a unique invite code"
        );
        Err(ChatError::Unavailable(
            "could not allocate a unique invite code".to_string(),
        ))
    }

    /// チャンネルに対する操作を認可する
    ///
    /// パブリックチャンネルは認証済みの全員に開かれています。
    /// パブリックルームへの join は Membership を作成します（既にあれば何もしない）。
    /// プライベートルームの read / write は Membership が必要で、
    /// join は Membership か一致する招待コードが必要です。
    pub async fn authorize(
        &self,
        user_id: &UserId,
        channel: &Channel,
        action: Action,
    ) -> Result<ChannelAccess, ChatError> {
        let room_id = match channel {
            Channel::Public => return Ok(ChannelAccess::Public),
            Channel::Room(room_id) => room_id,
        };
        let room = self.load_room(room_id).await?;

        match (room.visibility, action) {
            (Visibility::Public, Action::Join { .. }) => {
                self.add_membership(&room.id, user_id).await?;
            }
            (Visibility::Public, Action::Read | Action::Write) => {}
            (Visibility::Private, Action::Join { invite_code }) => {
                if !self.repository.is_member(&room.id, user_id).await? {
                    let code_matches = invite_code.is_some() && invite_code == room.invite_code;
                    if !code_matches {
                        tracing::info!(room_id = %room.id, user_id = %user_id, "join refused");
                        return Err(ChatError::AccessDenied(
                            "an invitation or an approved join request is required".to_string(),
                        ));
                    }
                    self.add_membership(&room.id, user_id).await?;
                }
            }
            (Visibility::Private, Action::Read | Action::Write) => {
                if !self.repository.is_member(&room.id, user_id).await? {
                    tracing::info!(room_id = %room.id, user_id = %user_id, "access refused");
                    return Err(ChatError::AccessDenied(
                        "not a member of this room".to_string(),
                    ));
                }
            }
        }

        Ok(ChannelAccess::Room(room))
    }

    /// プライベートルームへの参加リクエストを作成する
    ///
    /// # Errors
    ///
    /// * `ChatError::InvalidState` - パブリックルーム（リクエスト不要）
    /// * `ChatError::Conflict` - 既にメンバー、または pending のリクエストがある
    pub async fn request_join(
        &self,
        requester: &Identity,
        room_id: &RoomId,
        message: Option<String>,
    ) -> Result<(Room, JoinRequest), ChatError> {
        let message = JoinNote::parse(message)?;
        let room = self.load_room(room_id).await?;
        if !room.is_private() {
            return Err(ChatError::InvalidState(
                "public rooms can be joined directly".to_string(),
            ));
        }
        if self.repository.is_member(room_id, &requester.id).await? {
            return Err(ChatError::Conflict(
                "already a member of this room".to_string(),
            ));
        }

        let request = JoinRequest::new(
            JoinRequestIdFactory::generate(),
            room_id.clone(),
            requester.clone(),
            message,
            self.clock.now(),
        );
        self.repository.insert_join_request(request.clone()).await?;
        tracing::info!(
            request_id = %request.id,
            room_id = %room_id,
            requester = %requester.id,
            "join request filed"
        );
        Ok((room, request))
    }

    /// 参加リクエストを承認または却下する
    ///
    /// 承認時の Membership 作成とステータス更新は Repository 側で一つの書き込みとして行われます。
    /// 決定済みのリクエストは何も変更せずに `InvalidState` を返します。
    pub async fn decide_join_request(
        &self,
        actor: &UserId,
        request_id: &JoinRequestId,
        decision: Decision,
    ) -> Result<(Room, JoinRequest), ChatError> {
        let request = self
            .repository
            .find_join_request(request_id)
            .await?
            .ok_or_else(|| ChatError::NotFound("join request not found".to_string()))?;
        let room = self.load_room(&request.room_id).await?;
        if !room.is_creator(actor) {
            return Err(ChatError::AccessDenied(
                "only the room creator can decide join requests".to_string(),
            ));
        }

        let mut preview = request.clone();
        preview.decide(decision)?;

        let resolved = self
            .repository
            .resolve_join_request(request_id, decision, self.clock.now())
            .await?;
        tracing::info!(
            request_id = %resolved.id,
            room_id = %resolved.room_id,
            status = %resolved.status,
            "join request decided"
        );
        Ok((room, resolved))
    }

    /// メンバーをルームから削除する
    ///
    /// メンバーでない対象の削除はエラーではなく `Ok(false)` を返します。
    pub async fn remove_member(
        &self,
        actor: &UserId,
        room_id: &RoomId,
        target: &UserId,
    ) -> Result<bool, ChatError> {
        let room = self.load_room(room_id).await?;
        if !room.is_creator(actor) {
            return Err(ChatError::AccessDenied(
                "only the room creator can remove members".to_string(),
            ));
        }
        room.ensure_removable(target)?;

        let removed = self.repository.remove_membership(room_id, target).await?;
        if removed {
            tracing::info!(room_id = %room_id, target = %target, "member removed");
        }
        Ok(removed)
    }

    pub async fn get_room(&self, room_id: &RoomId) -> Result<Room, ChatError> {
        self.load_room(room_id).await
    }

    /// Public rooms plus the private rooms `user_id` belongs to, newest first
    pub async fn list_rooms(&self, user_id: &UserId) -> Result<Vec<Room>, ChatError> {
        Ok(self.repository.list_rooms_visible_to(user_id).await?)
    }

    /// Pending requests of a room, visible to its creator only
    pub async fn list_join_requests(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<JoinRequest>, ChatError> {
        let room = self.load_room(room_id).await?;
        if !room.is_creator(actor) {
            return Err(ChatError::AccessDenied(
                "only the room creator can list join requests".to_string(),
            ));
        }
        Ok(self.repository.list_pending_join_requests(room_id).await?)
    }

    pub async fn resolve_invite(&self, code: String) -> Result<Room, ChatError> {
        // a malformed code can never match a room
        let code = InviteCode::new(code)
            .map_err(|_| ChatError::NotFound("invite code not found".to_string()))?;
        self.repository
            .find_room_by_invite_code(&code)
            .await?
            .ok_or_else(|| ChatError::NotFound("invite code not found".to_string()))
    }

    pub async fn list_memberships(
        &self,
        actor: &UserId,
        room_id: &RoomId,
    ) -> Result<Vec<Membership>, ChatError> {
        self.load_room(room_id).await?;
        if !self.repository.is_member(room_id, actor).await? {
            return Err(ChatError::AccessDenied(
                "not a member of this room".to_string(),
            ));
        }
        Ok(self.repository.list_memberships(room_id).await?)
    }

    pub async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, ChatError> {
        Ok(self.repository.is_member(room_id, user_id).await?)
    }

    async fn load_room(&self, room_id: &RoomId) -> Result<Room, ChatError> {
        self.repository
            .find_room(room_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("room {room_id} not found")))
    }

    async fn add_membership(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), ChatError> {
        let created = self
            .repository
            .add_membership(Membership::new(
                room_id.clone(),
                user_id.clone(),
                self.clock.now(),
            ))
            .await?;
        if created {
            tracing::debug!(room_id = %room_id, user_id = %user_id, "membership created");
        }
        Ok(())
    }
}
