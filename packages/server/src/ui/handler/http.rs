//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    domain::{Room, UserId, Visibility},
    infrastructure::dto::{
        http::{
            CreateJoinRequest, CreateRoomRequest, DecisionRequest, JoinRequestDto,
            MembersResponse, MembershipDto, MessagesQuery, MessagesResponse, RemoveMemberResponse,
            RoomDto,
        },
        websocket::MessageDto,
    },
    ui::{
        error::ApiError,
        extract::{
            AuthenticatedUser, parse_channel, parse_join_request_id, parse_room_id, parse_user_id,
        },
        state::AppState,
    },
};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn room_dto(state: &AppState, room: Room, viewer: &UserId) -> RoomDto {
    let member_count = state.engine.member_count(Some(room.id.clone())).await;
    RoomDto::new(room, member_count, viewer)
}

/// Public rooms and the caller's private rooms, newest first
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<Vec<RoomDto>>, ApiError> {
    let rooms = state.engine.list_rooms(&identity.id).await?;
    let mut dtos = Vec::with_capacity(rooms.len());
    for room in rooms {
        dtos.push(room_dto(&state, room, &identity.id).await);
    }
    Ok(Json(dtos))
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomDto>), ApiError> {
    let room = state
        .engine
        .create_room(
            &identity.id,
            body.name,
            body.description,
            body.visibility.unwrap_or(Visibility::Public),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(room_dto(&state, room, &identity.id).await),
    ))
}

/// Get room detail by ID; private rooms are members only
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(room_id): Path<String>,
) -> Result<Json<RoomDto>, ApiError> {
    let room = state
        .engine
        .get_room(&identity.id, &parse_room_id(room_id)?)
        .await?;
    Ok(Json(room_dto(&state, room, &identity.id).await))
}

/// Live presence of a room
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(room_id): Path<String>,
) -> Result<Json<MembersResponse>, ApiError> {
    let room_id = parse_room_id(room_id)?;
    let members = state
        .engine
        .list_members(&identity.id, Some(room_id.clone()))
        .await?;
    let member_count = state.engine.member_count(Some(room_id.clone())).await;
    Ok(Json(MembersResponse::new(
        Some(room_id.into_string()),
        member_count,
        &members,
    )))
}

/// Durable roster, members only
pub async fn list_memberships(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<MembershipDto>>, ApiError> {
    let memberships = state
        .engine
        .list_memberships(&identity.id, &parse_room_id(room_id)?)
        .await?;
    Ok(Json(memberships.iter().map(MembershipDto::from).collect()))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path((room_id, user_id)): Path<(String, String)>,
) -> Result<Json<RemoveMemberResponse>, ApiError> {
    let removed = state
        .engine
        .remove_member(
            &identity.id,
            &parse_room_id(room_id)?,
            &parse_user_id(user_id)?,
        )
        .await?;
    Ok(Json(RemoveMemberResponse { removed }))
}

/// Pending join requests, creator only
pub async fn list_join_requests(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<JoinRequestDto>>, ApiError> {
    let requests = state
        .engine
        .list_join_requests(&identity.id, &parse_room_id(room_id)?)
        .await?;
    Ok(Json(requests.iter().map(JoinRequestDto::from).collect()))
}

pub async fn create_join_request(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(room_id): Path<String>,
    Json(body): Json<CreateJoinRequest>,
) -> Result<(StatusCode, Json<JoinRequestDto>), ApiError> {
    let request = state
        .engine
        .request_join(&identity, &parse_room_id(room_id)?, body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(JoinRequestDto::from(&request))))
}

pub async fn decide_join_request(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(request_id): Path<String>,
    Json(body): Json<DecisionRequest>,
) -> Result<Json<JoinRequestDto>, ApiError> {
    let request = state
        .engine
        .decide_join_request(
            &identity.id,
            &parse_join_request_id(&request_id)?,
            body.decision,
        )
        .await?;
    Ok(Json(JoinRequestDto::from(&request)))
}

/// Invite link preview
pub async fn resolve_invite(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<Json<RoomDto>, ApiError> {
    let room = state.engine.resolve_invite(code).await?;
    Ok(Json(room_dto(&state, room, &identity.id).await))
}

pub async fn accept_invite(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(code): Path<String>,
) -> Result<Json<RoomDto>, ApiError> {
    let room = state.engine.accept_invite(&identity.id, code).await?;
    Ok(Json(room_dto(&state, room, &identity.id).await))
}

/// Recent messages of a channel, oldest first
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let room_id = parse_channel(query.room_id)?;
    let messages = state
        .engine
        .list_recent_messages(&identity.id, room_id.clone(), query.limit)
        .await?;
    Ok(Json(MessagesResponse {
        room_id: room_id.map(|id| id.into_string()),
        messages: messages.iter().map(MessageDto::from).collect(),
    }))
}
