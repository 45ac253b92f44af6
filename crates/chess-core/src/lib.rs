pub use shakmaty::Color;

pub mod snapshot;
pub mod strength;

pub use snapshot::{parse_color, PositionSnapshot, SnapshotError};
pub use strength::{resolve, Mode, StrengthProfile, DEFAULT_LEVEL};
