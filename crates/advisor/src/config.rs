//! Advisor configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chess_core::Mode;

use crate::engine::SessionConfig;
use crate::error::AdvisorError;
use crate::presenter::DisplaySettings;
use crate::scheduler::{PrefetchConfig, WatchdogConfig};
use crate::watcher::AdvisorSettings;

#[derive(Clone, Debug)]
pub struct AdvisorConfig {
    /// Path to the UCI engine binary
    pub stockfish_path: String,

    /// JSON file the position source re-reads on every poll
    pub snapshot_path: String,

    pub level: String,
    pub mode: Mode,

    /// Analyse during the opponent's turn
    pub prefetch: bool,

    /// Forwarded untouched to the presenter
    pub display_mode: String,
    pub display_color: String,

    pub poll_interval: Duration,

    /// Engine "Threads" option
    pub engine_threads: u32,

    pub handshake_retries: u32,
    pub handshake_interval: Duration,
    pub restart_backoff: Duration,
    pub stall_limit: u32,

    pub watchdog_base: Duration,
    pub watchdog_depth_threshold: u8,
    pub watchdog_per_depth: Duration,
    pub watchdog_margin: Duration,

    pub prefetch_depth_offset: u8,
    pub prefetch_depth_floor: u8,
    pub prefetch_time_cap_ms: u64,
}

impl AdvisorConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, AdvisorError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AdvisorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: u64| Duration::from_millis(parsed(key).unwrap_or(default));

        let mode = match lookup("ADVISOR_MODE") {
            Some(value) => value
                .parse()
                .map_err(|_| AdvisorError::Config("ADVISOR_MODE must be 'normal' or 'combat'"))?,
            None => Mode::Normal,
        };

        let poll_interval = millis("POLL_INTERVAL_MS", 250);
        if poll_interval.is_zero() {
            return Err(AdvisorError::Config("POLL_INTERVAL_MS must be positive"));
        }

        Ok(Self {
            stockfish_path: lookup("STOCKFISH_PATH")
                .unwrap_or_else(|| "/usr/local/bin/stockfish".to_string()),
            snapshot_path: lookup("SNAPSHOT_PATH").unwrap_or_else(|| "position.json".to_string()),
            level: lookup("ADVISOR_LEVEL").unwrap_or_else(|| chess_core::DEFAULT_LEVEL.to_string()),
            mode,
            prefetch: lookup("ADVISOR_PREFETCH")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            display_mode: lookup("DISPLAY_MODE").unwrap_or_else(|| "arrow".to_string()),
            display_color: lookup("DISPLAY_COLOR").unwrap_or_else(|| "#15781b".to_string()),
            poll_interval,
            engine_threads: parse_or(&lookup, "ENGINE_THREADS", 1),
            handshake_retries: parse_or(&lookup, "HANDSHAKE_RETRIES", 5),
            handshake_interval: millis("HANDSHAKE_INTERVAL_MS", 1000),
            restart_backoff: millis("RESTART_BACKOFF_MS", 3000),
            stall_limit: parse_or(&lookup, "ENGINE_STALL_LIMIT", 3),
            watchdog_base: millis("WATCHDOG_BASE_MS", 10_000),
            watchdog_depth_threshold: parse_or(&lookup, "WATCHDOG_DEPTH_THRESHOLD", 12),
            watchdog_per_depth: millis("WATCHDOG_PER_DEPTH_MS", 2000),
            watchdog_margin: millis("WATCHDOG_MARGIN_MS", 5000),
            prefetch_depth_offset: parse_or(&lookup, "PREFETCH_DEPTH_OFFSET", 4),
            prefetch_depth_floor: parse_or(&lookup, "PREFETCH_DEPTH_FLOOR", 2),
            prefetch_time_cap_ms: parse_or(&lookup, "PREFETCH_TIME_CAP_MS", 1000),
        })
    }

    pub fn settings(&self) -> AdvisorSettings {
        AdvisorSettings {
            level: self.level.clone(),
            mode: self.mode,
            prefetch: self.prefetch,
            display: DisplaySettings {
                mode: self.display_mode.clone(),
                color: self.display_color.clone(),
            },
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_retries: self.handshake_retries,
            handshake_interval: self.handshake_interval,
            restart_backoff: self.restart_backoff,
            threads: self.engine_threads,
            stall_limit: self.stall_limit,
        }
    }

    pub fn watchdog(&self) -> WatchdogConfig {
        WatchdogConfig {
            base: self.watchdog_base,
            depth_threshold: self.watchdog_depth_threshold,
            per_depth: self.watchdog_per_depth,
            safety_margin: self.watchdog_margin,
        }
    }

    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            depth_offset: self.prefetch_depth_offset,
            depth_floor: self.prefetch_depth_floor,
            time_cap_ms: self.prefetch_time_cap_ms,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
