//! Strength levels and the search parameters they resolve to.

use std::fmt;
use std::str::FromStr;

/// Level used whenever a requested level is not in the table.
pub const DEFAULT_LEVEL: &str = "novice";

/// Contempt applied in combat mode.
const COMBAT_CONTEMPT: i32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    /// Full strength, fast replies, no deliberate mistakes.
    Combat,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "combat" => Ok(Mode::Combat),
            other => Err(format!("Unknown mode '{other}'")),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => f.write_str("normal"),
            Mode::Combat => f.write_str("combat"),
        }
    }
}

/// Resolved search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthProfile {
    /// Engine skill level (0-20)
    pub skill_level: u8,
    pub search_depth: u8,
    pub limit_strength: bool,
    /// Target rating, only set when `limit_strength` is on
    pub target_elo: Option<u16>,
    /// Probability of withholding a result
    pub error_rate: f64,
    pub hash_mb: u32,
    pub time_cap_ms: Option<u64>,
    /// Anticipated draw bias, sent to the engine as contempt
    pub contempt: Option<i32>,
}

impl StrengthProfile {
    /// Cheaper profile for speculative searches during the opponent's turn.
    ///
    /// Depth becomes `max(depth_floor, depth - depth_offset)` without ever
    /// exceeding the original depth.
    pub fn for_prefetch(&self, depth_offset: u8, depth_floor: u8, time_cap_ms: u64) -> Self {
        let depth = self
            .search_depth
            .saturating_sub(depth_offset)
            .max(depth_floor)
            .min(self.search_depth);
        let time_cap_ms = match self.time_cap_ms {
            Some(cap) => cap.min(time_cap_ms),
            None => time_cap_ms,
        };

        Self {
            search_depth: depth,
            time_cap_ms: Some(time_cap_ms),
            ..self.clone()
        }
    }
}

struct LevelEntry {
    name: &'static str,
    skill_level: u8,
    search_depth: u8,
    target_elo: Option<u16>,
    error_rate: f64,
    hash_mb: u32,
    combat_time_cap_ms: u64,
}

/// Lowest level first; the first entry is the default.
const LEVELS: &[LevelEntry] = &[
    LevelEntry { name: "novice", skill_level: 0, search_depth: 2, target_elo: Some(1350), error_rate: 0.35, hash_mb: 16, combat_time_cap_ms: 300 },
    LevelEntry { name: "casual", skill_level: 3, search_depth: 4, target_elo: Some(1500), error_rate: 0.25, hash_mb: 16, combat_time_cap_ms: 400 },
    LevelEntry { name: "club", skill_level: 6, search_depth: 6, target_elo: Some(1700), error_rate: 0.15, hash_mb: 32, combat_time_cap_ms: 600 },
    LevelEntry { name: "strong", skill_level: 10, search_depth: 9, target_elo: Some(2000), error_rate: 0.08, hash_mb: 64, combat_time_cap_ms: 800 },
    LevelEntry { name: "expert", skill_level: 15, search_depth: 12, target_elo: Some(2400), error_rate: 0.03, hash_mb: 128, combat_time_cap_ms: 1000 },
    LevelEntry { name: "master", skill_level: 20, search_depth: 16, target_elo: None, error_rate: 0.0, hash_mb: 256, combat_time_cap_ms: 1500 },
];

/// Names of all levels, weakest first.
pub fn known_levels() -> impl Iterator<Item = &'static str> {
    LEVELS.iter().map(|entry| entry.name)
}

pub fn is_known_level(level: &str) -> bool {
    find_level(level).is_some()
}

fn find_level(level: &str) -> Option<&'static LevelEntry> {
    let level = level.trim();
    LEVELS
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(level))
}

/// Resolve a level name and mode into a profile.
///
/// Unknown levels resolve to [`DEFAULT_LEVEL`] in both modes.
pub fn resolve(level: &str, mode: Mode) -> StrengthProfile {
    let entry = find_level(level).unwrap_or(&LEVELS[0]);

    match mode {
        Mode::Normal => StrengthProfile {
            skill_level: entry.skill_level,
            search_depth: entry.search_depth,
            limit_strength: entry.target_elo.is_some(),
            target_elo: entry.target_elo,
            error_rate: entry.error_rate,
            hash_mb: entry.hash_mb,
            time_cap_ms: None,
            contempt: None,
        },
        Mode::Combat => StrengthProfile {
            skill_level: entry.skill_level,
            search_depth: entry.search_depth,
            limit_strength: false,
            target_elo: None,
            error_rate: 0.0,
            hash_mb: entry.hash_mb,
            time_cap_ms: Some(entry.combat_time_cap_ms),
            contempt: Some(COMBAT_CONTEMPT),
        },
    }
}
