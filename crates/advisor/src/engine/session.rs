//! Engine session lifecycle: handshake, readiness, crash detection and restart.
//!
//! The session never blocks on the engine. Commands go out through an
//! unbounded channel, and everything that comes back (engine events, the
//! handshake retry timer, the restart backoff timer) is awaited through
//! [`EngineSession::wait`] and applied by [`EngineSession::on_wake`]. The split
//! keeps `wait` cancel-safe so it can sit in a `select!` next to other timers.

use std::collections::VecDeque;
use std::time::Duration;

use chess_core::{PositionSnapshot, StrengthProfile};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::engine::uci::{EngineCommand, EngineEvent, EngineOption, Score};
use crate::error::AdvisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Starting,
    Ready,
    Busy,
    Faulted,
}

/// Identifies one search; the scheduler's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub u64);

/// Starts an engine and hands back the channels to talk to it.
pub trait EngineLauncher: Send {
    fn launch(&mut self) -> Result<EngineLink, AdvisorError>;
}

/// Session side of an engine connection.
pub struct EngineLink {
    commands: mpsc::UnboundedSender<EngineCommand>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

/// Engine side of an in-process connection.
pub struct EnginePeer {
    pub commands: mpsc::UnboundedReceiver<EngineCommand>,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineLink {
    pub fn new(
        commands: mpsc::UnboundedSender<EngineCommand>,
        events: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        Self { commands, events }
    }

    /// A connected link/peer pair for engines that live in the same process.
    pub fn pair() -> (EngineLink, EnginePeer) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            EngineLink::new(command_tx, event_rx),
            EnginePeer {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Readiness pokes sent before the handshake is declared failed
    pub handshake_retries: u32,
    pub handshake_interval: Duration,
    /// Delay before the single restart after a crash
    pub restart_backoff: Duration,
    /// Engine "Threads" option
    pub threads: u32,
    /// Consecutive timed-out searches after which the engine counts as hung
    pub stall_limit: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_retries: 5,
            handshake_interval: Duration::from_secs(1),
            restart_backoff: Duration::from_secs(3),
            threads: 1,
            stall_limit: 3,
        }
    }
}

/// Something the session was woken up by.
#[derive(Debug)]
pub enum SessionWake {
    Engine(EngineEvent),
    Disconnected,
    HandshakeTimer,
    RestartTimer,
    /// Too many searches timed out in a row
    Stalled,
}

/// What the rest of the advisor needs to know.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Ready,
    BestMove {
        handle: RequestHandle,
        best: Option<String>,
        ponder: Option<String>,
        score: Option<Score>,
    },
    /// The engine died; `failed` searches will never be answered.
    Crashed {
        reason: String,
        failed: Vec<RequestHandle>,
    },
    /// Permanent failure, no further restarts.
    HandshakeFailed { reason: String },
    Restarting,
}

pub struct EngineSession {
    launcher: Box<dyn EngineLauncher>,
    config: SessionConfig,
    state: SessionState,
    link: Option<EngineLink>,
    /// Static options, applied whenever the engine becomes ready
    options: Vec<EngineOption>,
    pokes_sent: u32,
    handshake_deadline: Option<Instant>,
    restart_deadline: Option<Instant>,
    /// Set from a crash until the restarted engine is ready
    recovering: bool,
    /// Searches sent and not yet answered, oldest first
    in_flight: VecDeque<RequestHandle>,
    /// Timed-out searches since the last answer
    timeouts: u32,
    stalled: bool,
}

impl EngineSession {
    pub fn new(launcher: Box<dyn EngineLauncher>, config: SessionConfig) -> Self {
        Self {
            launcher,
            config,
            state: SessionState::Uninitialized,
            link: None,
            options: Vec::new(),
            pokes_sent: 0,
            handshake_deadline: None,
            restart_deadline: None,
            recovering: false,
            in_flight: VecDeque::new(),
            timeouts: 0,
            stalled: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether searches can be sent right now.
    pub fn is_available(&self) -> bool {
        matches!(self.state, SessionState::Ready | SessionState::Busy)
    }

    /// Launch the engine and begin the handshake.
    pub fn start(&mut self) -> Result<(), AdvisorError> {
        if self.state != SessionState::Uninitialized {
            debug!(state = ?self.state, "Engine already started");
            return Ok(());
        }

        match self.launcher.launch() {
            Ok(link) => {
                self.link = Some(link);
                self.state = SessionState::Starting;
                self.pokes_sent = 0;
                self.handshake_deadline = Some(Instant::now() + self.config.handshake_interval);
                self.send(EngineCommand::Init);
                info!("Engine starting");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Faulted;
                self.recovering = false;
                error!(error = %e, "Engine launch failed");
                Err(AdvisorError::HandshakeFailed(e.to_string()))
            }
        }
    }

    /// Replace the static options; sent now if the engine is up, else on ready.
    pub fn configure(&mut self, options: Vec<EngineOption>) {
        if self.is_available() {
            for option in &options {
                self.send(option.to_command());
            }
        }
        self.options = options;
    }

    /// Reset the engine's game-specific state (hash, history).
    pub fn new_game(&mut self) {
        if self.is_available() {
            self.send(EngineCommand::NewGame);
        }
    }

    pub fn search(
        &mut self,
        handle: RequestHandle,
        snapshot: &PositionSnapshot,
        profile: &StrengthProfile,
    ) -> Result<RequestHandle, AdvisorError> {
        if !self.is_available() {
            return Err(AdvisorError::EngineUnavailable(self.state));
        }

        self.send(EngineCommand::SetPosition {
            fen: snapshot.fen().to_string(),
        });
        self.send(EngineCommand::Search {
            depth: profile.search_depth,
            movetime_ms: profile.time_cap_ms,
        });
        self.in_flight.push_back(handle);
        self.state = SessionState::Busy;
        Ok(handle)
    }

    /// Ask the engine to stop `handle`'s search. Its answer still arrives.
    pub fn abort(&mut self, handle: RequestHandle) {
        if self.state == SessionState::Busy && self.in_flight.back() == Some(&handle) {
            self.send(EngineCommand::Abort);
        }
    }

    /// The watchdog gave up on `handle`.
    ///
    /// After `stall_limit` of these without an answer in between, the engine
    /// is treated as crashed and restarted.
    pub fn timed_out(&mut self, handle: RequestHandle) {
        self.abort(handle);
        if self.link.is_none() {
            return;
        }
        self.timeouts += 1;
        if self.config.stall_limit > 0 && self.timeouts >= self.config.stall_limit {
            warn!(timeouts = self.timeouts, "Engine stopped answering");
            self.stalled = true;
        }
    }

    /// Quit the engine and cancel all timers.
    pub fn shutdown(&mut self) {
        if self.link.is_some() {
            self.send(EngineCommand::Quit);
        }
        self.link = None;
        self.handshake_deadline = None;
        self.restart_deadline = None;
        self.recovering = false;
        self.in_flight.clear();
        self.timeouts = 0;
        self.stalled = false;
        self.state = SessionState::Uninitialized;
    }

    /// Wait for the next engine event or session timer.
    ///
    /// Cancel-safe; pair every returned value with [`EngineSession::on_wake`].
    pub async fn wait(&mut self) -> SessionWake {
        if self.stalled {
            return SessionWake::Stalled;
        }
        let handshake = self.handshake_deadline;
        let restart = self.restart_deadline;
        let events = self.link.as_mut().map(|link| &mut link.events);

        tokio::select! {
            biased;
            event = next_event(events) => match event {
                Some(event) => SessionWake::Engine(event),
                None => SessionWake::Disconnected,
            },
            _ = sleep_until_deadline(handshake) => SessionWake::HandshakeTimer,
            _ = sleep_until_deadline(restart) => SessionWake::RestartTimer,
        }
    }

    pub fn on_wake(&mut self, wake: SessionWake) -> Option<SessionEvent> {
        match wake {
            SessionWake::Engine(EngineEvent::Ready) => self.on_ready(),
            SessionWake::Engine(EngineEvent::BestMove {
                best,
                ponder,
                score,
            }) => self.on_best_move(best, ponder, score),
            SessionWake::Engine(EngineEvent::Fault(reason)) => self.on_terminated(reason),
            SessionWake::Disconnected => self.on_terminated("engine connection closed".into()),
            SessionWake::HandshakeTimer => self.on_handshake_timer(),
            SessionWake::RestartTimer => self.on_restart_timer(),
            SessionWake::Stalled => {
                self.stalled = false;
                let reason = format!("no answer to {} searches in a row", self.timeouts);
                self.on_terminated(reason)
            }
        }
    }

    fn on_ready(&mut self) -> Option<SessionEvent> {
        if self.state != SessionState::Starting {
            // Answer to a surplus poke
            return None;
        }

        self.state = SessionState::Ready;
        self.handshake_deadline = None;
        self.recovering = false;
        for option in self.options.clone() {
            self.send(option.to_command());
        }
        info!(pokes = self.pokes_sent, "Engine ready");
        Some(SessionEvent::Ready)
    }

    fn on_best_move(
        &mut self,
        best: Option<String>,
        ponder: Option<String>,
        score: Option<Score>,
    ) -> Option<SessionEvent> {
        let Some(handle) = self.in_flight.pop_front() else {
            debug!(?best, "Ignoring unsolicited bestmove");
            return None;
        };
        self.timeouts = 0;
        if self.in_flight.is_empty() && self.state == SessionState::Busy {
            self.state = SessionState::Ready;
        }
        Some(SessionEvent::BestMove {
            handle,
            best,
            ponder,
            score,
        })
    }

    fn on_terminated(&mut self, reason: String) -> Option<SessionEvent> {
        if self.link.is_none() {
            return None;
        }

        self.link = None;
        self.handshake_deadline = None;
        self.timeouts = 0;
        self.state = SessionState::Faulted;
        let failed: Vec<RequestHandle> = self.in_flight.drain(..).collect();

        if self.recovering {
            self.recovering = false;
            error!(reason = %reason, "Engine failed again before the restart completed");
            return Some(SessionEvent::HandshakeFailed { reason });
        }

        self.recovering = true;
        self.restart_deadline = Some(Instant::now() + self.config.restart_backoff);
        warn!(
            reason = %reason,
            failed = failed.len(),
            backoff_ms = self.config.restart_backoff.as_millis() as u64,
            "Engine terminated, restart scheduled"
        );
        Some(SessionEvent::Crashed { reason, failed })
    }

    fn on_handshake_timer(&mut self) -> Option<SessionEvent> {
        if self.state != SessionState::Starting {
            self.handshake_deadline = None;
            return None;
        }

        if self.pokes_sent < self.config.handshake_retries {
            self.pokes_sent += 1;
            self.send(EngineCommand::Poke);
            self.handshake_deadline = Some(Instant::now() + self.config.handshake_interval);
            debug!(poke = self.pokes_sent, "Engine not ready yet, poking");
            return None;
        }

        let reason = format!("engine not ready after {} readiness checks", self.pokes_sent);
        self.handshake_deadline = None;
        self.link = None;
        self.state = SessionState::Faulted;
        self.recovering = false;
        error!(reason = %reason, "Engine handshake failed");
        Some(SessionEvent::HandshakeFailed { reason })
    }

    fn on_restart_timer(&mut self) -> Option<SessionEvent> {
        self.restart_deadline = None;
        if self.state != SessionState::Faulted {
            return None;
        }

        info!("Restarting engine");
        self.state = SessionState::Uninitialized;
        match self.start() {
            Ok(()) => Some(SessionEvent::Restarting),
            Err(e) => Some(SessionEvent::HandshakeFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn send(&self, command: EngineCommand) {
        if let Some(link) = &self.link {
            if link.commands.send(command).is_err() {
                debug!("Engine command channel closed");
            }
        }
    }
}

async fn next_event(
    events: Option<&mut mpsc::UnboundedReceiver<EngineEvent>>,
) -> Option<EngineEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
