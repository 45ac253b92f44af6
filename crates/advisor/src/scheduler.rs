//! Single-slot analysis scheduling with a watchdog

use std::time::Duration;

use chess_core::{PositionSnapshot, StrengthProfile};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::engine::{EngineSession, RequestHandle};
use crate::error::AdvisorError;

/// How long a search may run before the slot is forcibly freed.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    pub base: Duration,
    /// Depths above this get `per_depth` extra time each
    pub depth_threshold: u8,
    pub per_depth: Duration,
    /// Added on top of an explicit time cap
    pub safety_margin: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            depth_threshold: 12,
            per_depth: Duration::from_secs(2),
            safety_margin: Duration::from_secs(5),
        }
    }
}

impl WatchdogConfig {
    pub fn duration(&self, profile: &StrengthProfile) -> Duration {
        match profile.time_cap_ms {
            Some(cap) => Duration::from_millis(cap) + self.safety_margin,
            None => {
                let extra = profile.search_depth.saturating_sub(self.depth_threshold);
                self.base + self.per_depth * u32::from(extra)
            }
        }
    }
}

/// Derivation of the cheaper profile used while the opponent thinks.
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    pub depth_offset: u8,
    pub depth_floor: u8,
    pub time_cap_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            depth_offset: 4,
            depth_floor: 2,
            time_cap_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Player to move, result is shown
    Primary,
    /// Opponent to move, result predicts the next position
    Prefetch,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub snapshot: PositionSnapshot,
    pub epoch: u64,
    pub profile: StrengthProfile,
    pub kind: RequestKind,
    pub sequence: u64,
}

struct Outstanding {
    request: AnalysisRequest,
    deadline: Instant,
}

/// Owns the one request slot. Every search goes through here.
pub struct AnalysisScheduler {
    watchdog: WatchdogConfig,
    prefetch: PrefetchConfig,
    last_sequence: u64,
    outstanding: Option<Outstanding>,
}

impl AnalysisScheduler {
    pub fn new(watchdog: WatchdogConfig, prefetch: PrefetchConfig) -> Self {
        Self {
            watchdog,
            prefetch,
            last_sequence: 0,
            outstanding: None,
        }
    }

    /// Issue a search, preempting whatever is outstanding.
    pub fn request(
        &mut self,
        session: &mut EngineSession,
        snapshot: &PositionSnapshot,
        epoch: u64,
        profile: &StrengthProfile,
        kind: RequestKind,
    ) -> Result<u64, AdvisorError> {
        if let Some(previous) = self.outstanding.take() {
            debug!(
                sequence = previous.request.sequence,
                kind = ?previous.request.kind,
                "Preempting outstanding analysis"
            );
            session.abort(RequestHandle(previous.request.sequence));
        }

        let profile = match kind {
            RequestKind::Primary => profile.clone(),
            RequestKind::Prefetch => profile.for_prefetch(
                self.prefetch.depth_offset,
                self.prefetch.depth_floor,
                self.prefetch.time_cap_ms,
            ),
        };

        self.last_sequence += 1;
        let sequence = self.last_sequence;
        session.search(RequestHandle(sequence), snapshot, &profile)?;

        let deadline = Instant::now() + self.watchdog.duration(&profile);
        debug!(
            sequence,
            epoch,
            kind = ?kind,
            depth = profile.search_depth,
            fen = snapshot.fen(),
            "Analysis requested"
        );
        self.outstanding = Some(Outstanding {
            request: AnalysisRequest {
                snapshot: snapshot.clone(),
                epoch,
                profile,
                kind,
                sequence,
            },
            deadline,
        });
        Ok(sequence)
    }

    pub fn is_free(&self) -> bool {
        self.outstanding.is_none()
    }

    pub fn outstanding(&self) -> Option<&AnalysisRequest> {
        self.outstanding.as_ref().map(|o| &o.request)
    }

    /// Sequence and deadline of the outstanding request's watchdog.
    pub fn watchdog_deadline(&self) -> Option<(u64, Instant)> {
        self.outstanding
            .as_ref()
            .map(|o| (o.request.sequence, o.deadline))
    }

    /// Watchdog fired for `sequence`. Returns whether the slot was freed.
    pub fn expire(&mut self, session: &mut EngineSession, sequence: u64) -> bool {
        match &self.outstanding {
            Some(o) if o.request.sequence == sequence => {
                warn!(
                    sequence,
                    kind = ?o.request.kind,
                    depth = o.request.profile.search_depth,
                    "Analysis timed out, abandoning it"
                );
                session.timed_out(RequestHandle(sequence));
                self.outstanding = None;
                true
            }
            _ => {
                debug!(sequence, "Ignoring stale watchdog");
                false
            }
        }
    }

    /// Accept the engine's answer for `handle` if it is the outstanding one.
    pub fn complete(&mut self, handle: RequestHandle) -> Option<AnalysisRequest> {
        match &self.outstanding {
            Some(o) if o.request.sequence == handle.0 => {
                self.outstanding.take().map(|o| o.request)
            }
            _ => {
                debug!(sequence = handle.0, "Discarding stale analysis result");
                None
            }
        }
    }

    /// The engine lost these searches; free the slot if ours is among them.
    pub fn fail(&mut self, handles: &[RequestHandle]) -> Option<AnalysisRequest> {
        let ours = self
            .outstanding
            .as_ref()
            .is_some_and(|o| handles.contains(&RequestHandle(o.request.sequence)));
        if !ours {
            return None;
        }

        let request = self.outstanding.take().map(|o| o.request)?;
        warn!(sequence = request.sequence, "Analysis lost with the engine");
        Some(request)
    }

    /// Abort and forget the outstanding request.
    pub fn cancel(&mut self, session: &mut EngineSession) {
        if let Some(o) = self.outstanding.take() {
            debug!(sequence = o.request.sequence, "Analysis cancelled");
            session.abort(RequestHandle(o.request.sequence));
        }
    }
}
