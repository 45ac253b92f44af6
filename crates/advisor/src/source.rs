//! Position sources

use std::fs;
use std::path::{Path, PathBuf};

use chess_core::{parse_color, Color, PositionSnapshot};
use serde::Deserialize;
use tracing::debug;

use crate::error::AdvisorError;

/// Observes the game being played. `None` means "not observable right now".
pub trait PositionSource {
    fn snapshot(&mut self) -> Option<PositionSnapshot>;
    fn local_color(&mut self) -> Option<Color>;

    /// Both observations for one tick.
    fn observe(&mut self) -> Option<(PositionSnapshot, Color)> {
        let snapshot = self.snapshot()?;
        let color = self.local_color()?;
        Some((snapshot, color))
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotFile {
    fen: String,
    color: String,
}

/// Re-reads a JSON file (`{"fen": "...", "color": "white"}`) on every poll.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<SnapshotFile, AdvisorError> {
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn read_snapshot(&self) -> Result<PositionSnapshot, AdvisorError> {
        let file = self.read()?;
        Ok(PositionSnapshot::from_fen(&file.fen)?)
    }

    fn read_color(&self) -> Result<Color, AdvisorError> {
        let file = self.read()?;
        parse_color(&file.color).ok_or(AdvisorError::Config("color must be white or black"))
    }
}

fn observable<T>(path: &Path, result: Result<T, AdvisorError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Position not observable");
            None
        }
    }
}

impl PositionSource for FileSource {
    fn snapshot(&mut self) -> Option<PositionSnapshot> {
        observable(&self.path, self.read_snapshot())
    }

    fn local_color(&mut self) -> Option<Color> {
        observable(&self.path, self.read_color())
    }

    /// One read per tick, so the pair is consistent.
    fn observe(&mut self) -> Option<(PositionSnapshot, Color)> {
        let result = self.read().and_then(|file| {
            let snapshot = PositionSnapshot::from_fen(&file.fen)?;
            let color = parse_color(&file.color)
                .ok_or(AdvisorError::Config("color must be white or black"))?;
            Ok((snapshot, color))
        });
        observable(&self.path, result)
    }
}
