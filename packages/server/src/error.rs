//! Start-up and serve errors of the server binary.

use thiserror::Error;

use crate::{domain::RepositoryError, usecase::ChatError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage initialisation failed: {0}")]
    Storage(#[from] RepositoryError),

    #[error("engine initialisation failed: {0}")]
    Engine(#[from] ChatError),
}
