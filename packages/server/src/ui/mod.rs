//! WebSocket / HTTP transport (axum).

mod error;
mod extract;
mod handler;
mod router;
mod runner;
mod signal;
pub mod state;

pub use extract::{USER_AVATAR_HEADER, USER_ID_HEADER, USER_NAME_HEADER};
pub use router::create_router;
pub use runner::{run, serve};
