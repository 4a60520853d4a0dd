//! Built-in thinkers

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::RwLock;
use tracing::{debug, info, warn};

use super::traits::Thinker;
use crate::domain::{GameStateSnapshot, TeamId, ValidMove};

/// Plays a uniformly random legal move
#[derive(Debug, Default)]
pub struct RandomThinker {
    team: RwLock<Option<TeamId>>,
}

impl RandomThinker {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Plays the first legal move in document order
#[derive(Debug, Default)]
pub struct FirstMoveThinker {
    team: RwLock<Option<TeamId>>,
}

impl FirstMoveThinker {
    pub fn new() -> Self {
        Self::default()
    }
}

fn remember(slot: &RwLock<Option<TeamId>>, team: TeamId) {
    if let Ok(mut current) = slot.write() {
        *current = Some(team);
    }
}

/// Legal moves for the team we play, or the active team if `start` was skipped
fn candidate_moves(slot: &RwLock<Option<TeamId>>, snapshot: &GameStateSnapshot) -> Vec<ValidMove> {
    let team = slot
        .read()
        .ok()
        .and_then(|t| *t)
        .unwrap_or(snapshot.active_team);

    if team != snapshot.active_team {
        warn!(team = %team, active = %snapshot.active_team, "Asked to think out of turn");
        return Vec::new();
    }
    snapshot.valid_moves_for(team)
}

#[async_trait]
impl Thinker for RandomThinker {
    fn start(&self, our_team: TeamId) {
        info!(team = %our_team, "Random thinker started");
        remember(&self.team, our_team);
    }

    async fn think(&self, snapshot: &GameStateSnapshot) -> Option<ValidMove> {
        let moves = candidate_moves(&self.team, snapshot);
        let chosen = moves.choose(&mut rand::thread_rng()).cloned();
        debug!(
            turn = snapshot.turn_number,
            candidates = moves.len(),
            chosen = ?chosen.as_ref().map(|m| m.square_sequence()),
            "Random move picked"
        );
        chosen
    }

    fn stop(&self) {
        info!("Random thinker stopped");
    }
}

#[async_trait]
impl Thinker for FirstMoveThinker {
    fn start(&self, our_team: TeamId) {
        remember(&self.team, our_team);
    }

    async fn think(&self, snapshot: &GameStateSnapshot) -> Option<ValidMove> {
        candidate_moves(&self.team, snapshot).into_iter().next()
    }
}
