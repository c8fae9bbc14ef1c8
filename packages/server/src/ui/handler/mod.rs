//! Handler modules for HTTP and WebSocket endpoints.

pub mod http;
pub mod websocket;

// Re-export HTTP handlers
pub use http::{
    accept_invite, create_join_request, create_room, decide_join_request, get_room, health_check,
    list_join_requests, list_members, list_memberships, list_messages, list_rooms, remove_member,
    resolve_invite,
};

// Re-export WebSocket handlers
pub use websocket::websocket_handler;
