//! Controller Configuration

use crate::domain::TeamId;

/// Document id of the shared game state
pub const DEFAULT_GAME_DOC_ID: &str = "game:checkers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Team this bot votes for
    pub team: TeamId,
    pub game_doc_id: String,
}

impl ControllerConfig {
    pub fn new(team: TeamId) -> Self {
        Self {
            team,
            game_doc_id: DEFAULT_GAME_DOC_ID.to_string(),
        }
    }

    pub fn with_game_doc_id(mut self, id: impl Into<String>) -> Self {
        self.game_doc_id = id.into();
        self
    }
}
