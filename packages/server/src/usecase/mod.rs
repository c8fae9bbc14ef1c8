//! UseCase 層
//!
//! ビジネスロジックを実装するレイヤー。
//! UI 層から呼び出され、Domain 層を操作します。

pub mod chat_engine;
pub mod connection_registry;
pub mod error;
pub mod event;
pub mod message_pipeline;
pub mod persistence_buffer;
pub mod room_directory;

pub use chat_engine::{ChatEngine, HistoryLimits};
pub use connection_registry::{ConnectionRegistry, EventSender, JoinOutcome};
pub use error::ChatError;
pub use event::ChatEvent;
pub use message_pipeline::MessagePipeline;
pub use persistence_buffer::{FlushReport, PersistenceBuffer};
pub use room_directory::{Action, ChannelAccess, RoomDirectory};
