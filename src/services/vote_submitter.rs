//! Vote submission
//!
//! Each participant owns exactly one vote document, `vote:<participant>`,
//! which is created on the first turn and edited on every later one. Writes
//! race other processes only through the store's revision check.

use rand::Rng;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::{GameStateSnapshot, OutgoingVote, ValidMove};
use crate::error::{BotError, Result};
use crate::store::{fetch_lenient, to_document, DocumentStore};

#[derive(Debug, Clone)]
pub struct VoteSubmitterConfig {
    /// Upper bound of the random pause before writing
    pub max_delay: Duration,
    /// Conflicting writes tolerated before giving up
    pub max_attempts: u32,
}

impl Default for VoteSubmitterConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_millis(2_000),
            max_attempts: 5,
        }
    }
}

pub struct VoteSubmitter {
    store: Arc<dyn DocumentStore>,
    vote_id: String,
    config: VoteSubmitterConfig,
    /// Revision from our last successful write
    revision: Mutex<String>,
}

impl VoteSubmitter {
    pub fn new(store: Arc<dyn DocumentStore>, participant_id: &str, config: VoteSubmitterConfig) -> Self {
        Self {
            store,
            vote_id: OutgoingVote::id_for_participant(participant_id),
            config,
            revision: Mutex::new(String::new()),
        }
    }

    pub fn vote_id(&self) -> &str {
        &self.vote_id
    }

    /// Revision held from the last successful write, empty before the first one
    pub fn held_revision(&self) -> String {
        self.revision
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn hold_revision(&self, revision: &str) {
        let mut held = self
            .revision
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *held = revision.to_string();
    }

    /// Build this turn's vote on top of whatever vote document already exists.
    ///
    /// A missing or malformed prior vote is not an error; the revision then
    /// falls back to the one held from our last write.
    pub async fn compose_vote(&self, snapshot: &GameStateSnapshot, mv: &ValidMove) -> Result<OutgoingVote> {
        let prior: Option<OutgoingVote> = fetch_lenient(self.store.as_ref(), &self.vote_id).await?;

        let revision = prior
            .map(|vote| vote.revision)
            .filter(|rev| !rev.is_empty())
            .unwrap_or_else(|| self.held_revision());

        Ok(OutgoingVote {
            id: self.vote_id.clone(),
            revision,
            turn_number: snapshot.turn_number,
            piece_id: mv.piece_id,
            team_id: snapshot.active_team,
            game_number: snapshot.game_number,
            square_sequence: mv.square_sequence(),
        })
    }

    /// Persist a vote after a random pause.
    ///
    /// Creates the document when the vote has no revision yet, edits it
    /// otherwise. A conflict re-reads the current revision and retries up to
    /// `max_attempts` writes in total.
    #[instrument(skip(self, vote), fields(vote_id = %vote.id, turn = vote.turn_number))]
    pub async fn submit(&self, mut vote: OutgoingVote) -> Result<String> {
        if vote.destinations().is_empty() {
            warn!(piece = vote.piece_id, "Submitting vote with no destination squares");
        }

        let delay_ms = rand::thread_rng().gen_range(0..=delay_bound_ms(self.config.max_delay));
        debug!(delay_ms, "Pausing before vote write");
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        let attempts = self.config.max_attempts.max(1);
        for attempt in 1..=attempts {
            let document = to_document(&vote)?;
            let written = if vote.is_persisted() {
                self.store.edit(&vote.id, &vote.revision, document).await
            } else {
                self.store.insert(document).await.map(|created| created.revision)
            };

            match written {
                Ok(revision) => {
                    self.hold_revision(&revision);
                    info!(
                        rev = %revision,
                        piece = vote.piece_id,
                        squares = ?vote.square_sequence,
                        attempt,
                        "Vote submitted"
                    );
                    return Ok(revision);
                }
                Err(e) if e.is_conflict() => {
                    warn!(attempt, max_attempts = attempts, "Vote write conflicted, re-reading");
                    vote.revision = self.current_revision(&vote.id).await?;
                }
                Err(e) => return Err(e),
            }
        }

        Err(BotError::ContentionExhausted {
            id: vote.id,
            attempts,
        })
    }

    /// Revision of the stored vote, read raw so a malformed body is still overwritten
    async fn current_revision(&self, id: &str) -> Result<String> {
        let current = self.store.retrieve(id).await?;
        Ok(current
            .as_ref()
            .and_then(|doc| doc.get("_rev"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Upper bound of the pre-write pause in whole milliseconds, saturating
fn delay_bound_ms(max_delay: Duration) -> u64 {
    u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::domain::game::SAMPLE_GAME;
    use crate::domain::TeamId;
    use crate::store::{DocumentRevision, MockDocumentStore};
    use mockall::predicate::{always, eq};
    use serde_json::json;

    fn instant() -> VoteSubmitterConfig {
        VoteSubmitterConfig {
            max_delay: Duration::ZERO,
            max_attempts: 3,
        }
    }

    fn red_move() -> (GameStateSnapshot, ValidMove) {
        let snapshot: GameStateSnapshot = serde_json::from_str(SAMPLE_GAME).unwrap();
        let mv = snapshot.valid_moves_for(TeamId::Red).remove(0);
        (snapshot, mv)
    }

    #[tokio::test]
    async fn test_first_vote_is_inserted() {
        let mut store = MockDocumentStore::new();
        store.expect_retrieve().with(eq("vote:abc")).times(1).returning(|_| Ok(None));
        store.expect_edit().never();
        store.expect_insert().times(1).returning(|doc| {
            assert_eq!(doc["_id"], "vote:abc");
            assert!(doc.get("_rev").is_none());
            assert_eq!(doc["locations"], json!([7, 11]));
            assert_eq!(doc["piece"], 6);
            Ok(DocumentRevision {
                id: "vote:abc".into(),
                revision: "1-a".into(),
            })
        });

        let submitter = VoteSubmitter::new(Arc::new(store), "user:abc", instant());
        let (snapshot, mv) = red_move();
        let vote = submitter.compose_vote(&snapshot, &mv).await.unwrap();
        assert!(!vote.is_persisted());

        assert_eq!(submitter.submit(vote).await.unwrap(), "1-a");
        assert_eq!(submitter.held_revision(), "1-a");
    }

    #[tokio::test]
    async fn test_existing_vote_is_edited() {
        let mut store = MockDocumentStore::new();
        store.expect_retrieve().times(1).returning(|_| {
            Ok(Some(json!({
                "_id": "vote:abc", "_rev": "4-d",
                "turn": 3, "piece": 2, "team": 0, "game": 1, "locations": [9, 13]
            })))
        });
        store.expect_insert().never();
        store
            .expect_edit()
            .with(eq("vote:abc"), eq("4-d"), always())
            .times(1)
            .returning(|_, _, doc| {
                assert_eq!(doc["turn"], 1);
                Ok("5-e".into())
            });

        let submitter = VoteSubmitter::new(Arc::new(store), "abc", instant());
        let (snapshot, mv) = red_move();
        let vote = submitter.compose_vote(&snapshot, &mv).await.unwrap();
        assert_eq!(vote.revision, "4-d");
        assert_eq!(vote.square_sequence, vec![7, 11]);

        assert_eq!(submitter.submit(vote).await.unwrap(), "5-e");
    }

    #[tokio::test]
    async fn test_malformed_prior_vote_is_ignored() {
        let mut store = MockDocumentStore::new();
        store
            .expect_retrieve()
            .returning(|_| Ok(Some(json!({"_id": "vote:abc", "_rev": "2-b", "team": "green"}))));

        let submitter = VoteSubmitter::new(Arc::new(store), "abc", instant());
        let (snapshot, mv) = red_move();
        let vote = submitter.compose_vote(&snapshot, &mv).await.unwrap();
        assert!(vote.revision.is_empty());
    }

    #[tokio::test]
    async fn test_conflict_adopts_latest_revision() {
        let mut store = MockDocumentStore::new();
        store
            .expect_insert()
            .times(1)
            .returning(|_| Err(BotError::Conflict { id: "vote:abc".into() }));
        store
            .expect_retrieve()
            .times(1)
            .returning(|_| Ok(Some(json!({"_id": "vote:abc", "_rev": "7-z"}))));
        store
            .expect_edit()
            .with(eq("vote:abc"), eq("7-z"), always())
            .times(1)
            .returning(|_, _, _| Ok("8-y".into()));

        let submitter = VoteSubmitter::new(Arc::new(store), "abc", instant());
        let (snapshot, mv) = red_move();
        let vote = OutgoingVote {
            id: submitter.vote_id().to_string(),
            revision: String::new(),
            turn_number: snapshot.turn_number,
            piece_id: mv.piece_id,
            team_id: TeamId::Red,
            game_number: snapshot.game_number,
            square_sequence: mv.square_sequence(),
        };

        assert_eq!(submitter.submit(vote).await.unwrap(), "8-y");
    }

    #[tokio::test]
    async fn test_contention_exhausted() {
        let mut store = MockDocumentStore::new();
        store
            .expect_edit()
            .times(3)
            .returning(|id, _, _| Err(BotError::Conflict { id: id.to_string() }));
        store
            .expect_retrieve()
            .times(3)
            .returning(|_| Ok(Some(json!({"_id": "vote:abc", "_rev": "9-q"}))));

        let submitter = VoteSubmitter::new(Arc::new(store), "abc", instant());
        let vote = OutgoingVote {
            id: "vote:abc".into(),
            revision: "8-p".into(),
            turn_number: 4,
            piece_id: 0,
            team_id: TeamId::Blue,
            game_number: 1,
            square_sequence: vec![21, 17],
        };

        let err = submitter.submit(vote).await.unwrap_err();
        assert!(matches!(err, BotError::ContentionExhausted { attempts: 3, .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_vanished_vote_is_recreated() {
        let store = Arc::new(MemoryStore::new());
        let submitter = VoteSubmitter::new(store.clone(), "abc", instant());
        let vote = OutgoingVote {
            id: submitter.vote_id().to_string(),
            revision: "6-gone".into(),
            turn_number: 9,
            piece_id: 3,
            team_id: TeamId::Red,
            game_number: 2,
            square_sequence: vec![10, 14],
        };

        let revision = submitter.submit(vote).await.unwrap();
        assert!(revision.starts_with("1-"));
        assert_eq!(store.edit_count(), 1);
        assert_eq!(store.insert_count(), 1);

        let stored = store.retrieve("vote:abc").await.unwrap().unwrap();
        assert_eq!(stored["locations"], json!([10, 14]));
    }

    #[test]
    fn test_delay_bound_saturates() {
        assert_eq!(delay_bound_ms(Duration::from_secs(2)), 2_000);
        assert_eq!(delay_bound_ms(Duration::ZERO), 0);
        assert_eq!(delay_bound_ms(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_empty_destinations_still_submitted() {
        let mut store = MockDocumentStore::new();
        store.expect_insert().times(1).returning(|doc| {
            assert_eq!(doc["locations"], json!([12]));
            Ok(DocumentRevision {
                id: "vote:abc".into(),
                revision: "1-a".into(),
            })
        });

        let submitter = VoteSubmitter::new(Arc::new(store), "abc", instant());
        let vote = OutgoingVote {
            id: "vote:abc".into(),
            revision: String::new(),
            turn_number: 2,
            piece_id: 11,
            team_id: TeamId::Red,
            game_number: 1,
            square_sequence: vec![12],
        };
        assert!(submitter.submit(vote).await.is_ok());
    }
}
