use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::traits::GameObserver;
use crate::domain::GameStateSnapshot;

/// Stops the bot once a number of games have finished
#[derive(Debug)]
pub struct GameLimitObserver {
    max_games: u64,
    finished: AtomicU64,
}

impl GameLimitObserver {
    pub fn new(max_games: u64) -> Self {
        Self {
            max_games,
            finished: AtomicU64::new(0),
        }
    }

    pub fn games_finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }
}

impl GameObserver for GameLimitObserver {
    fn game_finished(&self, snapshot: &GameStateSnapshot) -> bool {
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            game = snapshot.game_number,
            winner = ?snapshot.winning_team,
            finished,
            limit = self.max_games,
            "Game finished"
        );
        finished >= self.max_games
    }
}
