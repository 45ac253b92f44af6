//! Position polling and the advisor's orchestration loop.
//!
//! The watcher owns every other component. One task runs [`PositionWatcher::run`],
//! which multiplexes the poll ticker, engine wake-ups and the analysis watchdog,
//! so no state is shared between tasks.

use std::future::Future;
use std::time::Duration;

use chess_core::strength::{is_known_level, known_levels};
use chess_core::{resolve, Color, Mode, PositionSnapshot, StrengthProfile};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::session::sleep_until_deadline;
use crate::engine::{profile_options, EngineSession, SessionEvent};
use crate::error::AdvisorError;
use crate::output::{Offer, OutputBuffer};
use crate::presenter::{DisplaySettings, Presenter};
use crate::scheduler::{AnalysisScheduler, RequestKind};
use crate::source::PositionSource;

/// User-facing knobs, changeable at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisorSettings {
    pub level: String,
    pub mode: Mode,
    /// Analyse while the opponent is thinking
    pub prefetch: bool,
    pub display: DisplaySettings,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            level: chess_core::DEFAULT_LEVEL.to_string(),
            mode: Mode::Normal,
            prefetch: false,
            display: DisplaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NewGame,
    MoveMade,
    Unchanged,
}

/// Compare an observation with the previous one.
pub fn classify(previous: Option<&PositionSnapshot>, current: &PositionSnapshot) -> Transition {
    let was_initial = previous.is_some_and(|p| p.is_initial());
    if current.is_initial() && !was_initial {
        Transition::NewGame
    } else if previous != Some(current) {
        Transition::MoveMade
    } else {
        Transition::Unchanged
    }
}

pub struct PositionWatcher<S, P> {
    source: S,
    presenter: P,
    session: EngineSession,
    scheduler: AnalysisScheduler,
    buffer: OutputBuffer,
    settings: AdvisorSettings,
    profile: StrengthProfile,
    epoch: u64,
    previous: Option<PositionSnapshot>,
    local_color: Option<Color>,
}

impl<S: PositionSource, P: Presenter> PositionWatcher<S, P> {
    pub fn new(
        source: S,
        presenter: P,
        mut session: EngineSession,
        scheduler: AnalysisScheduler,
        buffer: OutputBuffer,
        settings: AdvisorSettings,
    ) -> Self {
        let profile = resolve_logged(&settings);
        session.configure(profile_options(&profile, session.config().threads));

        Self {
            source,
            presenter,
            session,
            scheduler,
            buffer,
            settings,
            profile,
            epoch: 0,
            previous: None,
            local_color: None,
        }
    }

    /// Launch the engine. A launch failure is shown to the user.
    pub fn start_engine(&mut self) -> Result<(), AdvisorError> {
        self.session.start().inspect_err(|e| {
            self.presenter.engine_failure(&e.to_string());
        })
    }

    /// Switch level, mode, prefetch or display settings.
    pub fn apply_settings(&mut self, settings: AdvisorSettings) {
        self.profile = resolve_logged(&settings);
        let options = profile_options(&self.profile, self.session.config().threads);
        self.session.configure(options);
        info!(
            level = %settings.level,
            mode = %settings.mode,
            prefetch = settings.prefetch,
            "Settings applied"
        );
        self.settings = settings;
    }

    /// Poll the source once and act on what changed.
    pub fn tick(&mut self) {
        let Some((snapshot, color)) = self.source.observe() else {
            debug!("Position unavailable, skipping tick");
            return;
        };

        match classify(self.previous.as_ref(), &snapshot) {
            Transition::NewGame => self.on_new_game(),
            Transition::MoveMade => self.on_move_made(&snapshot, color),
            Transition::Unchanged => {}
        }

        self.settle(&snapshot, color);
        self.previous = Some(snapshot);
        self.local_color = Some(color);
    }

    pub fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Ready => {
                if let Some((snapshot, color)) = self.last_observation() {
                    self.settle(&snapshot, color);
                }
            }
            SessionEvent::BestMove {
                handle,
                best,
                ponder,
                score,
            } => {
                let Some(request) = self.scheduler.complete(handle) else {
                    return;
                };
                if request.epoch != self.epoch {
                    debug!(sequence = request.sequence, "Discarding result from a previous game");
                    return;
                }
                let offer = self.buffer.offer(&request, best, ponder, score);
                debug!(sequence = request.sequence, ?offer, "Analysis finished");
                if offer == Offer::Held {
                    if let Some((snapshot, color)) = self.last_observation() {
                        self.promote(&snapshot, color);
                    }
                }
            }
            SessionEvent::Crashed { failed, .. } => {
                self.scheduler.fail(&failed);
            }
            SessionEvent::HandshakeFailed { reason } => {
                self.scheduler.cancel(&mut self.session);
                self.presenter.engine_failure(&reason);
            }
            SessionEvent::Restarting => {
                debug!("Waiting for restarted engine");
            }
        }
    }

    pub fn on_watchdog(&mut self, sequence: u64) {
        self.scheduler.expire(&mut self.session, sequence);
    }

    /// Run until `shutdown` resolves, then stop the engine.
    pub async fn run<F>(&mut self, poll_interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(poll_ms = poll_interval.as_millis() as u64, "Watching position");
        loop {
            let watchdog = self.scheduler.watchdog_deadline();

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                wake = self.session.wait() => {
                    if let Some(event) = self.session.on_wake(wake) {
                        self.on_session_event(event);
                    }
                }
                _ = sleep_until_deadline(watchdog.map(|(_, deadline)| deadline)) => {
                    if let Some((sequence, _)) = watchdog {
                        self.on_watchdog(sequence);
                    }
                }
                _ = ticker.tick() => self.tick(),
            }
        }

        self.scheduler.cancel(&mut self.session);
        self.session.shutdown();
    }

    fn on_new_game(&mut self) {
        self.epoch += 1;
        info!(epoch = self.epoch, "New game");
        self.scheduler.cancel(&mut self.session);
        self.buffer.reset();
        self.presenter.clear();
        self.session.new_game();
    }

    fn on_move_made(&mut self, snapshot: &PositionSnapshot, color: Color) {
        if self.buffer.discard_stale(snapshot) {
            self.presenter.clear();
        }

        let players_turn = snapshot.side_to_move() == color;
        if players_turn
            && !self.buffer.has_pending_for(snapshot)
            && !self.buffer.is_suppressed(snapshot, self.epoch)
        {
            self.issue(snapshot, RequestKind::Primary);
        } else if !players_turn && self.settings.prefetch {
            self.issue(snapshot, RequestKind::Prefetch);
        } else {
            self.scheduler.cancel(&mut self.session);
        }
    }

    /// Per-tick duties regardless of the transition.
    fn settle(&mut self, snapshot: &PositionSnapshot, color: Color) {
        if snapshot.side_to_move() != color {
            if self.buffer.clear_display() {
                self.presenter.clear();
            }
            return;
        }

        self.promote(snapshot, color);
        if self.buffer.is_idle()
            && self.scheduler.is_free()
            && !self.buffer.is_suppressed(snapshot, self.epoch)
            && self.session.is_available()
        {
            self.issue(snapshot, RequestKind::Primary);
        }
    }

    fn promote(&mut self, snapshot: &PositionSnapshot, color: Color) {
        if let Some(result) = self.buffer.promote(self.epoch, snapshot, color) {
            info!(mv = %result.suggestion.mv, sequence = result.sequence, "Showing suggestion");
            self.presenter.render(&result.suggestion, &self.settings.display);
        }
    }

    fn issue(&mut self, snapshot: &PositionSnapshot, kind: RequestKind) {
        let issued = self.scheduler.request(
            &mut self.session,
            snapshot,
            self.epoch,
            &self.profile,
            kind,
        );
        if let Err(e) = issued {
            debug!(error = %e, ?kind, "Analysis not issued");
        }
    }

    fn last_observation(&self) -> Option<(PositionSnapshot, Color)> {
        Some((self.previous.clone()?, self.local_color?))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn settings(&self) -> &AdvisorSettings {
        &self.settings
    }

    pub fn profile(&self) -> &StrengthProfile {
        &self.profile
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut EngineSession {
        &mut self.session
    }

    pub fn scheduler(&self) -> &AnalysisScheduler {
        &self.scheduler
    }

    pub fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }
}

fn resolve_logged(settings: &AdvisorSettings) -> StrengthProfile {
    if !is_known_level(&settings.level) {
        warn!(
            level = %settings.level,
            fallback = chess_core::DEFAULT_LEVEL,
            known = ?known_levels().collect::<Vec<_>>(),
            "Unknown level, using default"
        );
    }
    resolve(&settings.level, settings.mode)
}
