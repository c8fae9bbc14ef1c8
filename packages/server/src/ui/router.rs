//! Route table.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use super::{handler, state::AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handler::health_check))
        .route(
            "/api/rooms",
            get(handler::list_rooms).post(handler::create_room),
        )
        .route("/api/rooms/{room_id}", get(handler::get_room))
        .route("/api/rooms/{room_id}/members", get(handler::list_members))
        .route(
            "/api/rooms/{room_id}/members/{user_id}",
            delete(handler::remove_member),
        )
        .route(
            "/api/rooms/{room_id}/memberships",
            get(handler::list_memberships),
        )
        .route(
            "/api/rooms/{room_id}/join-requests",
            get(handler::list_join_requests).post(handler::create_join_request),
        )
        .route(
            "/api/join-requests/{request_id}/decision",
            post(handler::decide_join_request),
        )
        .route("/api/invites/{code}", get(handler::resolve_invite))
        .route("/api/invites/{code}/accept", post(handler::accept_invite))
        .route("/api/messages", get(handler::list_messages))
        .route("/ws", get(handler::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
