//! Where suggestions end up

use std::io::Write;

use serde::Serialize;
use tracing::warn;

use crate::engine::Score;
use crate::output::Suggestion;

/// Display settings, forwarded to the presenter untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySettings {
    pub mode: String,
    pub color: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            mode: "arrow".to_string(),
            color: "#15781b".to_string(),
        }
    }
}

pub trait Presenter {
    fn render(&mut self, suggestion: &Suggestion, display: &DisplaySettings);
    fn clear(&mut self);
    /// The engine is gone for good.
    fn engine_failure(&mut self, message: &str);
}

/// Presenter → consumer messages
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PresenterMessage<'a> {
    Render {
        #[serde(rename = "move")]
        mv: &'a str,
        score: Option<Score>,
        mode: &'a str,
        color: &'a str,
    },
    Clear,
    EngineFailure {
        message: &'a str,
    },
}

/// Writes one JSON object per line.
pub struct ConsolePresenter<W: Write> {
    out: W,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, msg: &PresenterMessage<'_>) {
        let result = serde_json::to_writer(&mut self.out, msg)
            .map_err(std::io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"))
            .and_then(|_| self.out.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write presenter output");
        }
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn render(&mut self, suggestion: &Suggestion, display: &DisplaySettings) {
        self.emit(&PresenterMessage::Render {
            mv: &suggestion.mv,
            score: suggestion.score,
            mode: &display.mode,
            color: &display.color,
        });
    }

    fn clear(&mut self) {
        self.emit(&PresenterMessage::Clear);
    }

    fn engine_failure(&mut self, message: &str) {
        self.emit(&PresenterMessage::EngineFailure { message });
    }
}
