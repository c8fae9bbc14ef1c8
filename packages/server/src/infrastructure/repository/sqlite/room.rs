//! SQLite Room Repository 実装

use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::corrupt;
use crate::domain::{
    AvatarRef, Decision, DisplayName, Identity, InviteCode, JoinNote, JoinRequest, JoinRequestId,
    JoinRequestStatus, Membership, RepositoryError, Room, RoomDescription, RoomId, RoomName,
    RoomRepository, Timestamp, UserId, Visibility,
};

const ROOM_COLUMNS: &str = "id, name, description, visibility, creator_id, created_at, invite_code";

const JOIN_REQUEST_COLUMNS: &str = "id, room_id, requester_id, requester_name, requester_avatar, \
     message, status, created_at";

#[derive(Clone)]
pub struct SqliteRoomRepository {
    pool: SqlitePool,
}

impl SqliteRoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn room_from_row(row: &SqliteRow) -> Result<Room, RepositoryError> {
    let visibility: String = row.try_get("visibility")?;
    let invite_code: Option<String> = row.try_get("invite_code")?;
    Ok(Room {
        id: RoomId::new(row.try_get("id")?).map_err(corrupt)?,
        name: RoomName::new(row.try_get("name")?).map_err(corrupt)?,
        description: RoomDescription::parse(row.try_get("description")?).map_err(corrupt)?,
        visibility: Visibility::parse(&visibility).ok_or_else(|| {
            RepositoryError::Unavailable(format!("corrupt row: visibility {visibility}"))
        })?,
        creator_id: UserId::new(row.try_get("creator_id")?).map_err(corrupt)?,
        created_at: Timestamp::new(row.try_get("created_at")?),
        invite_code: invite_code
            .map(InviteCode::new)
            .transpose()
            .map_err(corrupt)?,
    })
}

fn membership_from_row(row: &SqliteRow) -> Result<Membership, RepositoryError> {
    Ok(Membership::new(
        RoomId::new(row.try_get("room_id")?).map_err(corrupt)?,
        UserId::new(row.try_get("user_id")?).map_err(corrupt)?,
        Timestamp::new(row.try_get("joined_at")?),
    ))
}

fn join_request_from_row(row: &SqliteRow) -> Result<JoinRequest, RepositoryError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let avatar: String = row.try_get("requester_avatar")?;
    Ok(JoinRequest {
        id: JoinRequestId::parse(&id).map_err(corrupt)?,
        room_id: RoomId::new(row.try_get("room_id")?).map_err(corrupt)?,
        requester: Identity::new(
            UserId::new(row.try_get("requester_id")?).map_err(corrupt)?,
            DisplayName::new(row.try_get("requester_name")?).map_err(corrupt)?,
            AvatarRef::new(Some(avatar)),
        ),
        message: JoinNote::parse(row.try_get("message")?).map_err(corrupt)?,
        status: JoinRequestStatus::parse(&status).ok_or_else(|| {
            RepositoryError::Unavailable(format!("corrupt row: status {status}"))
        })?,
        created_at: Timestamp::new(row.try_get("created_at")?),
    })
}

#[async_trait]
impl RoomRepository for SqliteRoomRepository {
    async fn insert_room(&self, room: Room, creator: Membership) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO rooms (id, name, description, visibility, creator_id, created_at, invite_code) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(room.id.as_str())
        .bind(room.name.as_str())
        .bind(room.description.as_ref().map(|d| d.as_str()))
        .bind(room.visibility.as_str())
        .bind(room.creator_id.as_str())
        .bind(room.created_at.value())
        .bind(room.invite_code.as_ref().map(|c| c.as_str()))
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO memberships (room_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(creator.room_id.as_str())
            .bind(creator.user_id.as_str())
            .bind(creator.joined_at.value())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn invite_code_exists(&self, code: &InviteCode) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM rooms WHERE invite_code = ? LIMIT 1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn find_room(&self, room_id: &RoomId) -> Result<Option<Room>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ?"))
            .bind(room_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(room_from_row).transpose()
    }

    async fn find_room_by_invite_code(
        &self,
        code: &InviteCode,
    ) -> Result<Option<Room>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE invite_code = ?"
        ))
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(room_from_row).transpose()
    }

    async fn list_rooms_visible_to(&self, user_id: &UserId) -> Result<Vec<Room>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms r \
             WHERE r.visibility = 'public' \
                OR EXISTS (SELECT 1 FROM memberships m WHERE m.room_id = r.id AND m.user_id = ?) \
             ORDER BY r.created_at DESC, r.id ASC"
        ))
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(room_from_row).collect()
    }

    async fn is_member(&self, room_id: &RoomId, user_id: &UserId) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM memberships WHERE room_id = ? AND user_id = ?")
            .bind(room_id.as_str())
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn add_membership(&self, membership: Membership) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let room = sqlx::query("SELECT 1 FROM rooms WHERE id = ?")
            .bind(membership.room_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if room.is_none() {
            return Err(RepositoryError::NotFound(format!(
                "room {}",
                membership.room_id
            )));
        }
        let result = sqlx::query(
            "INSERT OR IGNORE INTO memberships (room_id, user_id, joined_at) VALUES (?, ?, ?)",
        )
        .bind(membership.room_id.as_str())
        .bind(membership.user_id.as_str())
        .bind(membership.joined_at.value())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_membership(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM memberships WHERE room_id = ? AND user_id = ?")
            .bind(room_id.as_str())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_memberships(&self, room_id: &RoomId) -> Result<Vec<Membership>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT room_id, user_id, joined_at FROM memberships \
             WHERE room_id = ? ORDER BY joined_at, rowid",
        )
        .bind(room_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn insert_join_request(&self, request: JoinRequest) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let member = sqlx::query("SELECT 1 FROM memberships WHERE room_id = ? AND user_id = ?")
            .bind(request.room_id.as_str())
            .bind(request.requester.id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if member.is_some() {
            return Err(RepositoryError::Conflict(
                "already a member of this room".to_string(),
            ));
        }

        sqlx::query(&format!(
            "INSERT INTO join_requests ({JOIN_REQUEST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(request.id.to_string())
        .bind(request.room_id.as_str())
        .bind(request.requester.id.as_str())
        .bind(request.requester.name.as_str())
        .bind(request.requester.avatar.as_str())
        .bind(request.message.as_ref().map(|m| m.as_str()))
        .bind(request.status.as_str())
        .bind(request.created_at.value())
        .execute(&mut *tx)
        .await
        .map_err(|e| match RepositoryError::from(e) {
            RepositoryError::Conflict(_) => {
                RepositoryError::Conflict("a join request is already pending".to_string())
            }
            other => other,
        })?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_join_request(
        &self,
        id: &JoinRequestId,
    ) -> Result<Option<JoinRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(join_request_from_row).transpose()
    }

    async fn list_pending_join_requests(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<JoinRequest>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests \
             WHERE room_id = ? AND status = 'pending' ORDER BY created_at"
        ))
        .bind(room_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(join_request_from_row).collect()
    }

    async fn resolve_join_request(
        &self,
        id: &JoinRequestId,
        decision: Decision,
        decided_at: Timestamp,
    ) -> Result<JoinRequest, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {JOIN_REQUEST_COLUMNS} FROM join_requests WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("join request {id}")))?;
        let mut request = join_request_from_row(&row)?;
        request
            .decide(decision)
            .map_err(|e| RepositoryError::PreconditionFailed(e.to_string()))?;

        let updated = sqlx::query(
            "UPDATE join_requests SET status = ?, decided_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(request.status.as_str())
        .bind(decided_at.value())
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(RepositoryError::PreconditionFailed(
                "join request is no longer pending".to_string(),
            ));
        }

        if decision == Decision::Approve {
            sqlx::query(
                "INSERT OR IGNORE INTO memberships (room_id, user_id, joined_at) VALUES (?, ?, ?)",
            )
            .bind(request.room_id.as_str())
            .bind(request.requester.id.as_str())
            .bind(decided_at.value())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(request)
    }
}
