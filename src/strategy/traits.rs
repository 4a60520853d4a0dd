//! Decision seams
//!
//! The move-selection algorithm and the end-of-game hook are supplied from
//! outside the game loop.

use async_trait::async_trait;

use crate::domain::{GameStateSnapshot, TeamId, ValidMove};

/// Picks a move for our team from a snapshot.
///
/// `think` only runs when it is our team's turn and may take as long as it
/// needs; the game loop never interrupts it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Thinker: Send + Sync {
    /// Called once before the first decision
    fn start(&self, _our_team: TeamId) {}

    /// `None` means no vote is submitted this turn
    async fn think(&self, snapshot: &GameStateSnapshot) -> Option<ValidMove>;

    /// Called once after the last decision has returned
    fn stop(&self) {}
}

/// Notified when a game concludes
#[cfg_attr(test, mockall::automock)]
pub trait GameObserver: Send + Sync {
    /// Return `true` to stop the bot
    fn game_finished(&self, snapshot: &GameStateSnapshot) -> bool;
}
