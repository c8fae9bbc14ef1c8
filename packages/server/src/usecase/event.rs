//! Events pushed to live connections.

use crate::domain::{Channel, ChatMessage, Identity, JoinRequest, RoomId, RoomName};

/// Outbound event delivered through a connection's queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),
    MemberCount {
        channel: Channel,
        count: usize,
    },
    /// Private rooms only
    MemberListUpdate {
        channel: Channel,
        members: Vec<Identity>,
    },
    KickedFromRoom {
        room_id: RoomId,
    },
    /// Sent to the room creator
    JoinRequestReceived {
        room_name: RoomName,
        request: JoinRequest,
    },
    /// Sent to the requester
    JoinRequestStatus {
        room_name: RoomName,
        request: JoinRequest,
    },
}
