//! UCI command encoding and engine output parsing

use chess_core::StrengthProfile;
use serde::Serialize;

/// Commands sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Protocol handshake, followed by a readiness query
    Init,
    /// Repeated readiness query while waiting for the handshake
    Poke,
    Configure { name: String, value: String },
    NewGame,
    SetPosition { fen: String },
    Search { depth: u8, movetime_ms: Option<u64> },
    Abort,
    Quit,
}

impl EngineCommand {
    /// The command as written to the engine's stdin (may span several lines).
    pub fn to_uci(&self) -> String {
        match self {
            EngineCommand::Init => "uci\nisready".to_string(),
            EngineCommand::Poke => "isready".to_string(),
            EngineCommand::Configure { name, value } => {
                format!("setoption name {name} value {value}")
            }
            EngineCommand::NewGame => "ucinewgame".to_string(),
            EngineCommand::SetPosition { fen } => format!("position fen {fen}"),
            EngineCommand::Search { depth, movetime_ms } => match movetime_ms {
                Some(ms) => format!("go depth {depth} movetime {ms}"),
                None => format!("go depth {depth}"),
            },
            EngineCommand::Abort => "stop".to_string(),
            EngineCommand::Quit => "quit".to_string(),
        }
    }
}

/// Engine evaluation from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawns
    Cp(i32),
    /// Mate in N moves (negative = getting mated)
    Mate(i32),
}

/// Events produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Ready,
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
        score: Option<Score>,
    },
    Fault(String),
}

/// A `setoption` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOption {
    pub name: String,
    pub value: String,
}

impl EngineOption {
    pub fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn to_command(&self) -> EngineCommand {
        EngineCommand::Configure {
            name: self.name.clone(),
            value: self.value.clone(),
        }
    }
}

/// Static engine options for a profile.
pub fn profile_options(profile: &StrengthProfile, threads: u32) -> Vec<EngineOption> {
    let mut options = vec![
        EngineOption::new("Threads", threads),
        EngineOption::new("Hash", profile.hash_mb),
        EngineOption::new("Skill Level", profile.skill_level),
        EngineOption::new("UCI_LimitStrength", profile.limit_strength),
    ];
    if let Some(elo) = profile.target_elo.filter(|_| profile.limit_strength) {
        options.push(EngineOption::new("UCI_Elo", elo));
    }
    if let Some(contempt) = profile.contempt {
        options.push(EngineOption::new("Contempt", contempt));
    }
    options
}

/// Turns engine output lines into events.
///
/// Remembers the last reported score so it can be attached to the
/// `bestmove` line that ends the search.
#[derive(Debug, Default)]
pub struct LineParser {
    last_score: Option<Score>,
}

impl LineParser {
    pub fn parse(&mut self, line: &str) -> Option<EngineEvent> {
        let trimmed = line.trim();

        if trimmed == "readyok" {
            Some(EngineEvent::Ready)
        } else if trimmed.starts_with("info") && trimmed.contains(" score ") {
            if let Some(score) = parse_score(trimmed) {
                self.last_score = Some(score);
            }
            None
        } else if trimmed.starts_with("bestmove") {
            let (best, ponder) = parse_bestmove(trimmed);
            Some(EngineEvent::BestMove {
                best,
                ponder,
                score: self.last_score.take(),
            })
        } else {
            None
        }
    }
}

/// The "score cp <n>" or "score mate <n>" part of an info line.
fn parse_score(line: &str) -> Option<Score> {
    let mut tokens = line.split_whitespace().skip_while(|token| *token != "score").skip(1);
    let kind = tokens.next()?;
    let value = tokens.next()?.parse().ok()?;
    match kind {
        "cp" => Some(Score::Cp(value)),
        "mate" => Some(Score::Mate(value)),
        _ => None,
    }
}

/// Parse "bestmove <move> [ponder <move>]"; "(none)" means no legal move.
fn parse_bestmove(line: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let best = parts
        .get(1)
        .filter(|mv| **mv != "(none)")
        .map(|mv| mv.to_string());
    let ponder = parts
        .iter()
        .position(|part| *part == "ponder")
        .and_then(|i| parts.get(i + 1))
        .map(|mv| mv.to_string());
    (best, ponder)
}
