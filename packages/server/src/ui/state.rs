//! Shared application state.

use std::sync::Arc;

use crate::{config::ServerSettings, usecase::ChatEngine};

/// Shared application state
pub struct AppState {
    /// Core engine (rooms, presence, messages)
    pub engine: Arc<ChatEngine>,
    pub settings: ServerSettings,
}

impl AppState {
    pub fn new(engine: Arc<ChatEngine>, settings: ServerSettings) -> Self {
        Self { engine, settings }
    }
}
