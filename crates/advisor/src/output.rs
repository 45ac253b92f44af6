//! Human-like suppression and turn-gated visibility of engine results.

use chess_core::{Color, PositionSnapshot};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::engine::Score;
use crate::scheduler::{AnalysisRequest, RequestKind};

/// A move worth showing.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    /// UCI notation
    pub mv: String,
    pub score: Option<Score>,
}

/// Randomly withholds results to imitate a weaker player.
pub struct MoveFilter {
    rng: StdRng,
}

impl MoveFilter {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// One uniform draw; false means the result is withheld.
    pub fn admit(&mut self, error_rate: f64) -> bool {
        let sample: f64 = self.rng.gen();
        sample >= error_rate
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub suggestion: Suggestion,
    /// The position this suggestion is meant for
    pub target: PositionSnapshot,
    pub epoch: u64,
    pub sequence: u64,
}

/// What happened to an engine answer offered to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Held,
    Suppressed,
    /// Nothing usable in the answer
    Empty,
}

pub struct OutputBuffer {
    filter: MoveFilter,
    pending: Option<AnalysisResult>,
    displayed: Option<AnalysisResult>,
    /// Snapshot (and epoch) that gets nothing shown, withheld or empty
    suppressed: Option<(PositionSnapshot, u64)>,
}

impl OutputBuffer {
    pub fn new(filter: MoveFilter) -> Self {
        Self {
            filter,
            pending: None,
            displayed: None,
            suppressed: None,
        }
    }

    /// Turn a completed request's answer into the pending result.
    ///
    /// A primary answer suggests `best` for the analysed position. A prefetch
    /// answer was computed with the opponent to move, so it suggests `ponder`
    /// for the position reached after the opponent plays `best`.
    pub fn offer(
        &mut self,
        request: &AnalysisRequest,
        best: Option<String>,
        ponder: Option<String>,
        score: Option<Score>,
    ) -> Offer {
        let candidate = match request.kind {
            RequestKind::Primary => best.map(|mv| (mv, request.snapshot.clone(), score)),
            // The reported score is for the opponent's move
            RequestKind::Prefetch => best
                .and_then(|reply| request.snapshot.after(&reply))
                .zip(ponder)
                .map(|(target, mv)| (mv, target, None)),
        };

        let Some((mv, target, score)) = candidate else {
            debug!(sequence = request.sequence, kind = ?request.kind, "No usable move in result");
            if request.kind == RequestKind::Primary {
                // Nothing to suggest here, e.g. the game is over
                self.suppressed = Some((request.snapshot.clone(), request.epoch));
            }
            return Offer::Empty;
        };

        if !self.filter.admit(request.profile.error_rate) {
            debug!(sequence = request.sequence, mv = %mv, "Result suppressed");
            self.suppressed = Some((target, request.epoch));
            return Offer::Suppressed;
        }

        self.pending = Some(AnalysisResult {
            suggestion: Suggestion { mv, score },
            target,
            epoch: request.epoch,
            sequence: request.sequence,
        });
        Offer::Held
    }

    /// Move the pending result to the display if it applies right now.
    pub fn promote(
        &mut self,
        epoch: u64,
        current: &PositionSnapshot,
        local_color: Color,
    ) -> Option<&AnalysisResult> {
        if self.displayed.is_some() || current.side_to_move() != local_color {
            return None;
        }
        let applies = self
            .pending
            .as_ref()
            .is_some_and(|p| p.epoch == epoch && p.target == *current);
        if !applies {
            return None;
        }

        self.displayed = self.pending.take();
        self.displayed.as_ref()
    }

    /// Returns whether something was on display.
    pub fn clear_display(&mut self) -> bool {
        self.displayed.take().is_some()
    }

    /// Drop everything that does not belong to `current`.
    ///
    /// Returns whether a displayed result was dropped.
    pub fn discard_stale(&mut self, current: &PositionSnapshot) -> bool {
        if self.pending.as_ref().is_some_and(|p| p.target != *current) {
            self.pending = None;
        }
        if self
            .suppressed
            .as_ref()
            .is_some_and(|(snapshot, _)| snapshot != current)
        {
            self.suppressed = None;
        }
        if self.displayed.as_ref().is_some_and(|d| d.target != *current) {
            self.displayed = None;
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.pending = None;
        self.displayed = None;
        self.suppressed = None;
    }

    pub fn is_suppressed(&self, snapshot: &PositionSnapshot, epoch: u64) -> bool {
        self.suppressed
            .as_ref()
            .is_some_and(|(blocked, blocked_epoch)| blocked == snapshot && *blocked_epoch == epoch)
    }

    pub fn has_pending_for(&self, snapshot: &PositionSnapshot) -> bool {
        self.pending.as_ref().is_some_and(|p| p.target == *snapshot)
    }

    pub fn pending(&self) -> Option<&AnalysisResult> {
        self.pending.as_ref()
    }

    pub fn displayed(&self) -> Option<&AnalysisResult> {
        self.displayed.as_ref()
    }

    /// Nothing pending and nothing on display.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none() && self.displayed.is_none()
    }
}
