pub use chess_core;

pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod presenter;
pub mod scheduler;
pub mod source;
pub mod watcher;

pub use config::AdvisorConfig;
pub use error::AdvisorError;
pub use watcher::{AdvisorSettings, PositionWatcher};
