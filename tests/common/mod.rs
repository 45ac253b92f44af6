#![allow(dead_code)]

use std::time::Duration;

use advisor::chess_core::{Color, PositionSnapshot};
use advisor::engine::{
    EngineCommand, EngineEvent, EngineLauncher, EngineLink, EnginePeer, EngineSession,
    SessionConfig,
};
use advisor::output::{MoveFilter, OutputBuffer, Suggestion};
use advisor::presenter::{DisplaySettings, Presenter};
use advisor::scheduler::{AnalysisScheduler, PrefetchConfig, WatchdogConfig};
use advisor::source::PositionSource;
use advisor::{AdvisorError, AdvisorSettings, PositionWatcher};
use tokio::sync::mpsc;

pub const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
pub const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
pub const AFTER_E4_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2";
pub const AFTER_NF3: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2";
pub const AFTER_NF3_NC6: &str =
    "r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3";

pub type TestWatcher = PositionWatcher<MemorySource, RecordingPresenter>;

pub fn snap(fen: &str) -> PositionSnapshot {
    PositionSnapshot::from_fen(fen).unwrap()
}

/// Hands every launched engine's far end to the test.
pub struct ScriptedLauncher {
    peers: mpsc::UnboundedSender<EnginePeer>,
    fail: bool,
}

impl EngineLauncher for ScriptedLauncher {
    fn launch(&mut self) -> Result<EngineLink, AdvisorError> {
        if self.fail {
            return Err(AdvisorError::Engine("engine binary missing".into()));
        }
        let (link, peer) = EngineLink::pair();
        let _ = self.peers.send(peer);
        Ok(link)
    }
}

pub fn scripted_launcher(fail: bool) -> (ScriptedLauncher, mpsc::UnboundedReceiver<EnginePeer>) {
    let (peers, peers_rx) = mpsc::unbounded_channel();
    (ScriptedLauncher { peers, fail }, peers_rx)
}

pub fn session_config() -> SessionConfig {
    SessionConfig {
        handshake_retries: 3,
        handshake_interval: Duration::from_millis(100),
        restart_backoff: Duration::from_millis(500),
        threads: 1,
        stall_limit: 3,
    }
}

#[derive(Default)]
pub struct MemorySource {
    pub snapshot: Option<PositionSnapshot>,
    pub color: Option<Color>,
}

impl MemorySource {
    pub fn show(&mut self, fen: &str) {
        self.snapshot = Some(snap(fen));
    }
}

impl PositionSource for MemorySource {
    fn snapshot(&mut self) -> Option<PositionSnapshot> {
        self.snapshot.clone()
    }

    fn local_color(&mut self) -> Option<Color> {
        self.color
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shown {
    Render(String),
    Clear,
    Failure(String),
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub calls: Vec<Shown>,
}

impl RecordingPresenter {
    pub fn renders(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Shown::Render(mv) => Some(mv.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn render(&mut self, suggestion: &Suggestion, _display: &DisplaySettings) {
        self.calls.push(Shown::Render(suggestion.mv.clone()));
    }

    fn clear(&mut self) {
        self.calls.push(Shown::Clear);
    }

    fn engine_failure(&mut self, message: &str) {
        self.calls.push(Shown::Failure(message.to_string()));
    }
}

pub fn settings(level: &str, prefetch: bool) -> AdvisorSettings {
    AdvisorSettings {
        level: level.to_string(),
        prefetch,
        ..AdvisorSettings::default()
    }
}

pub fn watcher_with(
    settings: AdvisorSettings,
    config: SessionConfig,
    fail_launch: bool,
    seed: u64,
) -> (TestWatcher, mpsc::UnboundedReceiver<EnginePeer>) {
    let (launcher, peers) = scripted_launcher(fail_launch);
    let session = EngineSession::new(Box::new(launcher), config);
    let scheduler = AnalysisScheduler::new(WatchdogConfig::default(), PrefetchConfig::default());
    let buffer = OutputBuffer::new(MoveFilter::seeded(seed));
    let source = MemorySource {
        snapshot: None,
        color: Some(Color::White),
    };
    let watcher = PositionWatcher::new(
        source,
        RecordingPresenter::default(),
        session,
        scheduler,
        buffer,
        settings,
    );
    (watcher, peers)
}

/// A watcher whose engine has completed its handshake.
pub async fn ready_watcher(
    settings: AdvisorSettings,
) -> (TestWatcher, EnginePeer, mpsc::UnboundedReceiver<EnginePeer>) {
    let (mut watcher, mut peers) = watcher_with(settings, session_config(), false, 42);
    watcher.start_engine().unwrap();
    let mut peer = peers.recv().await.unwrap();
    peer.events.send(EngineEvent::Ready).unwrap();
    pump(&mut watcher).await;
    drain(&mut peer);
    (watcher, peer, peers)
}

/// Handle one engine wake-up.
pub async fn pump(watcher: &mut TestWatcher) {
    let wake = watcher.session_mut().wait().await;
    if let Some(event) = watcher.session_mut().on_wake(wake) {
        watcher.on_session_event(event);
    }
}

pub fn drain(peer: &mut EnginePeer) -> Vec<EngineCommand> {
    let mut commands = Vec::new();
    while let Ok(command) = peer.commands.try_recv() {
        commands.push(command);
    }
    commands
}

pub fn count_searches(commands: &[EngineCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, EngineCommand::Search { .. }))
        .count()
}

pub fn count_aborts(commands: &[EngineCommand]) -> usize {
    commands
        .iter()
        .filter(|c| matches!(c, EngineCommand::Abort))
        .count()
}

pub fn answer(peer: &EnginePeer, best: &str, ponder: Option<&str>) {
    peer.events
        .send(EngineEvent::BestMove {
            best: Some(best.to_string()),
            ponder: ponder.map(str::to_string),
            score: None,
        })
        .unwrap();
}
