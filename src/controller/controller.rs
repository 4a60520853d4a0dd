//! Game loop
//!
//! One task owns all controller state and serializes three event sources with
//! `select!`: change batches, the decision result and the vote-write result.
//! Thinking and writing run on their own tasks. The `TurnPermit` they carry
//! is what keeps a second decision from starting, and shutdown waits for it.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::coordination::{
    GracefulShutdown, ShutdownPhase, ShutdownSignal, TurnCoordinator, TurnPermit,
};
use crate::domain::{ChangeNotification, GameStateSnapshot, LoopState, ValidMove};
use crate::error::Result;
use crate::feed::{ChangeFeedConsumer, FeedSettings};
use crate::services::{UserRecordSynchronizer, VoteSubmitter};
use crate::store::{fetch_required, ChangeFeed, DocumentStore};
use crate::strategy::{GameObserver, Thinker};

use super::config::ControllerConfig;

/// Counters reported when the loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub batches: u64,
    pub snapshots: u64,
    pub decisions: u64,
    pub declined: u64,
    pub votes: u64,
}

struct DecisionOutcome {
    permit: TurnPermit,
    snapshot: Arc<GameStateSnapshot>,
    chosen: Option<ValidMove>,
}

struct SubmissionOutcome {
    permit: TurnPermit,
    result: Result<String>,
}

pub struct GameLoopController {
    config: ControllerConfig,
    store: Arc<dyn DocumentStore>,
    thinker: Arc<dyn Thinker>,
    submitter: Arc<VoteSubmitter>,
    user_sync: Arc<UserRecordSynchronizer>,
    observer: Option<Arc<dyn GameObserver>>,
    turns: Arc<TurnCoordinator>,
    shutdown: Arc<GracefulShutdown>,

    state: LoopState,
    snapshot: Option<Arc<GameStateSnapshot>>,
    last_seen_rev: Option<String>,
    last_game_number: Option<u64>,
    pending_decision: Option<oneshot::Receiver<DecisionOutcome>>,
    pending_submission: Option<oneshot::Receiver<SubmissionOutcome>>,
    stats: LoopStats,
}

impl GameLoopController {
    pub fn new(
        config: ControllerConfig,
        store: Arc<dyn DocumentStore>,
        thinker: Arc<dyn Thinker>,
        submitter: Arc<VoteSubmitter>,
        user_sync: Arc<UserRecordSynchronizer>,
    ) -> Self {
        Self {
            config,
            store,
            thinker,
            submitter,
            user_sync,
            observer: None,
            turns: Arc::new(TurnCoordinator::new()),
            shutdown: Arc::new(GracefulShutdown::with_defaults()),
            state: LoopState::Idle,
            snapshot: None,
            last_seen_rev: None,
            last_game_number: None,
            pending_decision: None,
            pending_submission: None,
            stats: LoopStats::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn GameObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_shutdown(mut self, shutdown: Arc<GracefulShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Handle for requesting shutdown from outside the loop
    pub fn shutdown_handle(&self) -> Arc<GracefulShutdown> {
        self.shutdown.clone()
    }

    pub fn turn_coordinator(&self) -> Arc<TurnCoordinator> {
        self.turns.clone()
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Most recently evaluated snapshot
    pub fn snapshot(&self) -> Option<Arc<GameStateSnapshot>> {
        self.snapshot.clone()
    }

    /// Subscribe to `feed` from its current sequence and run until shutdown
    pub async fn start(self, feed: Arc<dyn ChangeFeed>, settings: FeedSettings) -> Result<LoopStats> {
        let since = feed.latest_sequence().await?;
        let (feed_rx, feed_handle) =
            ChangeFeedConsumer::spawn(feed, since, settings, self.shutdown.token());

        let result = self.run(feed_rx).await;

        // Every exit from `run` has requested shutdown, so the feed task is ending.
        if let Err(e) = feed_handle.await {
            warn!("Change feed task failed: {}", e);
        }
        result
    }

    /// Evaluate the current game state, then react to batches until shutdown
    pub async fn run(self, feed_rx: mpsc::Receiver<Result<ChangeNotification>>) -> Result<LoopStats> {
        let span = info_span!(
            "game_loop",
            team = %self.config.team,
            game_doc = %self.config.game_doc_id
        );
        self.event_loop(feed_rx).instrument(span).await
    }

    async fn event_loop(
        mut self,
        mut feed_rx: mpsc::Receiver<Result<ChangeNotification>>,
    ) -> Result<LoopStats> {
        info!("Game loop starting");
        self.thinker.start(self.config.team);
        let mut token = self.shutdown.token();

        let mut failure = self.bootstrap().await.err();

        while failure.is_none() {
            self.settle();

            let step = tokio::select! {
                biased;

                signal = token.wait_for_shutdown() => {
                    info!(%signal, "Shutdown observed, leaving game loop");
                    break;
                }

                outcome = wait_slot(&mut self.pending_submission) => {
                    self.pending_submission = None;
                    self.on_submission(outcome)
                }

                outcome = wait_slot(&mut self.pending_decision) => {
                    self.pending_decision = None;
                    self.on_decision(outcome)
                }

                item = feed_rx.recv() => match item {
                    Some(Ok(batch)) => self.on_batch(batch).await,
                    Some(Err(e)) => Err(e),
                    None => {
                        info!("Change feed closed");
                        self.request_shutdown(ShutdownSignal::FeedClosed);
                        Ok(())
                    }
                },
            };

            if let Err(e) = step {
                error!(error = %e, "Fatal error in game loop");
                failure = Some(e);
            }
        }

        if failure.is_some() {
            self.request_shutdown(ShutdownSignal::Fatal);
        }
        self.drain(feed_rx).await;

        match failure {
            Some(e) => Err(e),
            None => Ok(self.stats),
        }
    }

    /// Act on the game as it stands, without waiting for the next change
    async fn bootstrap(&mut self) -> Result<()> {
        self.set_state(LoopState::Evaluating);
        let snapshot: GameStateSnapshot =
            fetch_required(self.store.as_ref(), &self.config.game_doc_id).await?;

        info!(
            game = snapshot.game_number,
            turn = snapshot.turn_number,
            rev = %snapshot.revision,
            "Initial game state"
        );
        self.last_seen_rev = Some(snapshot.revision.clone());
        self.evaluate(snapshot).await
    }

    async fn on_batch(&mut self, batch: ChangeNotification) -> Result<()> {
        self.set_state(LoopState::Evaluating);
        self.stats.batches += 1;

        let Some(revision) = batch.latest_revision_of(&self.config.game_doc_id) else {
            debug!(entries = batch.entries.len(), "No game document change in batch");
            return Ok(());
        };
        if self.last_seen_rev.as_deref() == Some(revision) {
            debug!(rev = %revision, "Game document revision already seen");
            return Ok(());
        }
        let revision = revision.to_string();

        let snapshot: GameStateSnapshot =
            fetch_required(self.store.as_ref(), &self.config.game_doc_id).await?;

        // The fetch may have returned something newer than the batch announced.
        self.last_seen_rev = Some(if snapshot.revision.is_empty() {
            revision
        } else {
            snapshot.revision.clone()
        });
        self.evaluate(snapshot).await
    }

    async fn evaluate(&mut self, snapshot: GameStateSnapshot) -> Result<()> {
        self.stats.snapshots += 1;
        let snapshot = Arc::new(snapshot);
        self.snapshot = Some(snapshot.clone());

        debug!(
            game = snapshot.game_number,
            turn = snapshot.turn_number,
            active = %snapshot.active_team,
            "Evaluating snapshot"
        );

        // Only a winner arriving together with a new game number is reported;
        // a game followed to its end keeps the number already recorded.
        let new_game = self.last_game_number != Some(snapshot.game_number);
        if let Some(winner) = snapshot.winning_team {
            if new_game {
                info!(game = snapshot.game_number, winner = %winner, "Game finished");

                if let Some(observer) = &self.observer {
                    if observer.game_finished(&snapshot) {
                        self.request_shutdown(ShutdownSignal::GameLimit);
                        return Ok(());
                    }
                }
            }
        }

        if new_game {
            self.user_sync.sync(snapshot.game_number).await?;
            self.last_game_number = Some(snapshot.game_number);
        }

        if snapshot.is_finished() {
            return Ok(());
        }
        if snapshot.active_team != self.config.team {
            debug!(active = %snapshot.active_team, "Not our turn");
            return Ok(());
        }

        match self.turns.try_acquire() {
            Some(permit) => self.spawn_decision(snapshot, permit),
            None => debug!("Decision already in flight"),
        }
        Ok(())
    }

    fn spawn_decision(&mut self, snapshot: Arc<GameStateSnapshot>, permit: TurnPermit) {
        self.stats.decisions += 1;
        info!(turn = snapshot.turn_number, "Decision started");

        let (tx, rx) = oneshot::channel();
        let thinker = self.thinker.clone();
        let span = info_span!(
            "decision",
            game = snapshot.game_number,
            turn = snapshot.turn_number
        );

        tokio::spawn(
            async move {
                let chosen = thinker.think(&snapshot).await;
                let outcome = DecisionOutcome {
                    permit,
                    snapshot,
                    chosen,
                };
                if tx.send(outcome).is_err() {
                    debug!("Decision finished after shutdown, result discarded");
                }
            }
            .instrument(span),
        );
        self.pending_decision = Some(rx);
    }

    fn on_decision(
        &mut self,
        outcome: std::result::Result<DecisionOutcome, oneshot::error::RecvError>,
    ) -> Result<()> {
        self.set_state(LoopState::Evaluating);

        let DecisionOutcome {
            permit,
            snapshot,
            chosen,
        } = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("Decision task ended without a result");
                return Ok(());
            }
        };

        let Some(mv) = chosen else {
            self.stats.declined += 1;
            info!(turn = snapshot.turn_number, "Thinker declined to move");
            return Ok(());
        };

        info!(
            turn = snapshot.turn_number,
            piece = mv.piece_id,
            squares = ?mv.square_sequence(),
            jump = mv.is_jump(),
            "Decision made"
        );
        self.spawn_submission(snapshot, mv, permit);
        Ok(())
    }

    fn spawn_submission(&mut self, snapshot: Arc<GameStateSnapshot>, mv: ValidMove, permit: TurnPermit) {
        let (tx, rx) = oneshot::channel();
        let submitter = self.submitter.clone();
        let span = info_span!("vote", turn = snapshot.turn_number);

        tokio::spawn(
            async move {
                let result = compose_and_submit(&submitter, &snapshot, &mv).await;
                let _ = tx.send(SubmissionOutcome { permit, result });
            }
            .instrument(span),
        );
        self.pending_submission = Some(rx);
    }

    fn on_submission(
        &mut self,
        outcome: std::result::Result<SubmissionOutcome, oneshot::error::RecvError>,
    ) -> Result<()> {
        self.set_state(LoopState::Evaluating);

        let Ok(SubmissionOutcome { permit, result }) = outcome else {
            error!("Vote task ended without a result");
            return Ok(());
        };
        drop(permit);

        match result {
            Ok(revision) => {
                self.stats.votes += 1;
                debug!(rev = %revision, "Vote stored");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "Vote not stored");
                Ok(())
            }
        }
    }

    async fn drain(&mut self, feed_rx: mpsc::Receiver<Result<ChangeNotification>>) {
        self.shutdown.set_phase(ShutdownPhase::StoppingIntake);
        drop(feed_rx);

        self.shutdown.set_phase(ShutdownPhase::DiscardingPending);
        if self.pending_decision.take().is_some() {
            info!("Decision in flight; its result will be discarded");
        }
        if let Some(rx) = self.pending_submission.take() {
            info!("Vote write in flight; letting it finish");
            if let Err(e) = self.on_submission(rx.await) {
                error!(error = %e, "Vote write failed during shutdown");
            }
        }

        self.shutdown.set_phase(ShutdownPhase::AwaitingDecision);
        self.shutdown.drain_decision(&self.turns).await;

        self.shutdown.set_phase(ShutdownPhase::StoppingThinker);
        self.thinker.stop();

        self.shutdown.set_phase(ShutdownPhase::Complete);
        self.set_state(LoopState::Terminated);
        info!(
            batches = self.stats.batches,
            decisions = self.stats.decisions,
            votes = self.stats.votes,
            "Game loop stopped"
        );
    }

    /// Resting state implied by what is still in flight
    fn settle(&mut self) {
        let next = if self.pending_submission.is_some() {
            LoopState::Submitting
        } else if self.pending_decision.is_some() {
            LoopState::AwaitingDecision
        } else {
            LoopState::AwaitingChange
        };
        self.set_state(next);
    }

    fn set_state(&mut self, next: LoopState) {
        if next == self.state {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Unexpected loop state transition");
        }
        debug!(from = %self.state, to = %next, "Loop state");
        self.state = next;
    }

    fn request_shutdown(&self, signal: ShutdownSignal) {
        if !self.shutdown.is_shutdown_requested() {
            self.shutdown.request_shutdown(signal);
        }
    }
}

async fn compose_and_submit(
    submitter: &VoteSubmitter,
    snapshot: &GameStateSnapshot,
    mv: &ValidMove,
) -> Result<String> {
    let vote = submitter.compose_vote(snapshot, mv).await?;
    submitter.submit(vote).await
}

/// Resolve with the slot's result, or never if the slot is empty
async fn wait_slot<T>(
    slot: &mut Option<oneshot::Receiver<T>>,
) -> std::result::Result<T, oneshot::error::RecvError> {
    match slot {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}
