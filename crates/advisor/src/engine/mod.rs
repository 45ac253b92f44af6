//! UCI engine plumbing: wire format, child process and session lifecycle

pub mod process;
pub mod session;
pub mod uci;

pub use process::UciProcess;
pub use session::{
    EngineLauncher, EngineLink, EnginePeer, EngineSession, RequestHandle, SessionConfig,
    SessionEvent, SessionState, SessionWake,
};
pub use uci::{profile_options, EngineCommand, EngineEvent, EngineOption, LineParser, Score};
