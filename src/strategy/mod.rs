//! Move selection and end-of-game hooks
//!
//! - `traits` - `Thinker` and `GameObserver` seams used by the game loop
//! - `random` - built-in thinkers
//! - `observer` - game-count limit

pub mod observer;
pub mod random;
pub mod traits;

pub use observer::GameLimitObserver;
pub use random::{FirstMoveThinker, RandomThinker};
pub use traits::{GameObserver, Thinker};

#[cfg(test)]
pub use traits::{MockGameObserver, MockThinker};

use std::str::FromStr;
use std::sync::Arc;

/// Built-in thinker selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkerKind {
    #[default]
    Random,
    First,
}

impl ThinkerKind {
    pub fn build(self) -> Arc<dyn Thinker> {
        match self {
            ThinkerKind::Random => Arc::new(RandomThinker::new()),
            ThinkerKind::First => Arc::new(FirstMoveThinker::new()),
        }
    }
}

impl FromStr for ThinkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(ThinkerKind::Random),
            "first" => Ok(ThinkerKind::First),
            other => Err(format!("unknown thinker '{}'; expected random|first", other)),
        }
    }
}
