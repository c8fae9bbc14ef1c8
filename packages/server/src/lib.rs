//! Hiroba: real-time multi-room chat server.
//!
//! Layered as domain / usecase / infrastructure / ui. The usecase layer holds the
//! room directory, the connection registry, the message pipeline and the
//! write-behind persistence buffer; the ui layer exposes them over HTTP and WebSocket.

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

// Re-export entry points
pub use config::{ServerArgs, ServerSettings};
pub use error::ServerError;
pub use ui::{run as run_server, serve};
