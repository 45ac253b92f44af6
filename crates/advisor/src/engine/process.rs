//! UCI engine subprocess (async I/O)

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::session::{EngineLauncher, EngineLink};
use crate::engine::uci::{EngineCommand, EngineEvent, LineParser};
use crate::error::AdvisorError;

/// How long a quitting engine gets before it is killed.
const QUIT_GRACE: Duration = Duration::from_secs(1);

/// Launches the engine binary at `path` as a child process.
///
/// Each launch spawns a writer task that owns the child and its stdin, and a
/// reader task that turns stdout lines into [`EngineEvent`]s. Dropping the
/// link's command sender makes the writer send `quit` and reap the process.
pub struct UciProcess {
    path: String,
}

impl UciProcess {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
        }
    }
}

impl EngineLauncher for UciProcess {
    fn launch(&mut self) -> Result<EngineLink, AdvisorError> {
        let mut child = Command::new(&self.path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AdvisorError::Engine(format!("Failed to spawn {}: {e}", self.path)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AdvisorError::Engine("Engine stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdvisorError::Engine("Engine stdout not captured".into()))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_commands(child, stdin, command_rx));
        tokio::spawn(read_events(BufReader::new(stdout), event_tx));

        debug!(path = %self.path, "Engine process spawned");
        Ok(EngineLink::new(command_tx, event_rx))
    }
}

async fn write_commands(
    mut child: Child,
    mut stdin: ChildStdin,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
) {
    loop {
        let command = commands.recv().await.unwrap_or(EngineCommand::Quit);
        if let Err(e) = send(&mut stdin, &command.to_uci()).await {
            // The reader reports the termination.
            warn!(error = %e, "Failed to write to engine");
            return;
        }
        if command == EngineCommand::Quit {
            break;
        }
    }

    if tokio::time::timeout(QUIT_GRACE, child.wait()).await.is_err() {
        let _ = child.start_kill();
    }
}

/// Send a command to the engine
async fn send(stdin: &mut ChildStdin, cmd: &str) -> std::io::Result<()> {
    debug!(cmd, "engine <");
    stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
    stdin.flush().await
}

async fn read_events(
    mut stdout: BufReader<ChildStdout>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    let mut parser = LineParser::default();
    let mut line = String::new();

    let reason = loop {
        line.clear();
        match stdout.read_line(&mut line).await {
            Ok(0) => break "engine closed its output".to_string(),
            Ok(_) => {
                let trimmed = line.trim();
                debug!(line = trimmed, "engine >");
                if let Some(event) = parser.parse(trimmed) {
                    if events.send(event).is_err() {
                        // Session dropped the link
                        return;
                    }
                }
            }
            Err(e) => break format!("failed to read from engine: {e}"),
        }
    };

    let _ = events.send(EngineEvent::Fault(reason));
}
