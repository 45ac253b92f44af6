//! Advisor error types

use thiserror::Error;

use crate::engine::SessionState;

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Engine not available (state: {0:?})")]
    EngineUnavailable(SessionState),

    #[error("Engine handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] chess_core::SnapshotError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
