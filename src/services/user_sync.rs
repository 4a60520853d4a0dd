//! Participant record upkeep
//!
//! The game server counts participants per team from `user:` documents and
//! expects each one to carry the number of the game it is playing.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::{TeamId, UserRecord};
use crate::error::{BotError, Result};
use crate::store::{fetch_required, to_document, DocumentStore};

pub const DEFAULT_MAX_SYNC_ATTEMPTS: u32 = 5;

pub struct UserRecordSynchronizer {
    store: Arc<dyn DocumentStore>,
    participant_id: String,
    record: Mutex<UserRecord>,
    max_attempts: u32,
}

impl UserRecordSynchronizer {
    /// Wrap a record that already exists in the store
    pub fn new(store: Arc<dyn DocumentStore>, record: UserRecord, max_attempts: u32) -> Self {
        Self {
            store,
            participant_id: record.id.clone(),
            record: Mutex::new(record),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Create a fresh participant record for `team`
    pub async fn register(store: Arc<dyn DocumentStore>, team: TeamId, max_attempts: u32) -> Result<Self> {
        let mut record = UserRecord::new(team);
        let created = store.insert(to_document(&record)?).await?;
        record.revision = created.revision;

        info!(user_id = %record.id, team = %team, "Registered participant");
        Ok(Self::new(store, record, max_attempts))
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub async fn record(&self) -> UserRecord {
        self.record.lock().await.clone()
    }

    /// Point the record at `game_number`.
    ///
    /// No store call when the number is already current. Otherwise writes
    /// with compare-and-swap, re-reading on each conflict.
    #[instrument(skip(self), fields(user_id = %self.participant_id))]
    pub async fn sync(&self, game_number: u64) -> Result<()> {
        let mut record = self.record.lock().await;
        if record.game_number == game_number {
            debug!("Participant record already current");
            return Ok(());
        }

        for attempt in 1..=self.max_attempts {
            let mut desired = record.clone();
            desired.game_number = game_number;

            match self
                .store
                .edit(&record.id, &record.revision, to_document(&desired)?)
                .await
            {
                Ok(revision) => {
                    desired.revision = revision;
                    *record = desired;
                    info!(attempt, "Participant record moved to game {}", game_number);
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    warn!(attempt, max_attempts = self.max_attempts, "Participant record conflicted, re-reading");
                    let latest: UserRecord = fetch_required(self.store.as_ref(), &record.id).await?;
                    record.revision = latest.revision;
                    record.game_number = latest.game_number;
                }
                Err(e) => return Err(e),
            }
        }

        Err(BotError::ContentionExhausted {
            id: record.id.clone(),
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentRevision, MockDocumentStore};
    use mockall::predicate::{always, eq};
    use serde_json::json;

    fn registered(game_number: u64) -> UserRecord {
        UserRecord {
            id: "user:42".into(),
            revision: "1-a".into(),
            team_id: TeamId::Red,
            game_number,
        }
    }

    #[tokio::test]
    async fn test_register_inserts_record() {
        let mut store = MockDocumentStore::new();
        store.expect_insert().times(1).returning(|doc| {
            assert_eq!(doc["team"], 1);
            Ok(DocumentRevision {
                id: doc["_id"].as_str().unwrap().to_string(),
                revision: "1-r".into(),
            })
        });

        let sync = UserRecordSynchronizer::register(Arc::new(store), TeamId::Blue, 5)
            .await
            .unwrap();
        assert!(sync.participant_id().starts_with("user:"));
        assert_eq!(sync.record().await.revision, "1-r");
    }

    #[tokio::test]
    async fn test_unchanged_game_makes_no_calls() {
        // Any call on a mock without expectations panics
        let store = MockDocumentStore::new();
        let sync = UserRecordSynchronizer::new(Arc::new(store), registered(3), 5);
        sync.sync(3).await.unwrap();
    }

    #[tokio::test]
    async fn test_conflicts_retry_until_written() {
        const CONFLICTS: usize = 3;

        let mut store = MockDocumentStore::new();
        let mut writes = 0;
        store
            .expect_edit()
            .with(eq("user:42"), always(), always())
            .times(CONFLICTS + 1)
            .returning(move |id, _, doc| {
                writes += 1;
                assert_eq!(doc["game"], 4);
                if writes <= CONFLICTS {
                    Err(BotError::Conflict { id: id.to_string() })
                } else {
                    Ok(format!("{}-final", writes + 1))
                }
            });
        let mut reads = 0;
        store.expect_retrieve().times(CONFLICTS).returning(move |_| {
            reads += 1;
            Ok(Some(json!({"_id": "user:42", "_rev": format!("{}-x", reads + 1), "team": 0, "game": 3})))
        });

        let sync = UserRecordSynchronizer::new(Arc::new(store), registered(3), 5);
        sync.sync(4).await.unwrap();

        let record = sync.record().await;
        assert_eq!(record.game_number, 4);
        assert_eq!(record.revision, "5-final");
    }

    #[tokio::test]
    async fn test_exhaustion_is_fatal() {
        let mut store = MockDocumentStore::new();
        store
            .expect_edit()
            .times(DEFAULT_MAX_SYNC_ATTEMPTS as usize)
            .returning(|id, _, _| Err(BotError::Conflict { id: id.to_string() }));
        store
            .expect_retrieve()
            .returning(|_| Ok(Some(json!({"_id": "user:42", "_rev": "9-x", "team": 0, "game": 3}))));

        let sync = UserRecordSynchronizer::new(Arc::new(store), registered(3), DEFAULT_MAX_SYNC_ATTEMPTS);
        let err = sync.sync(4).await.unwrap_err();
        assert!(matches!(err, BotError::ContentionExhausted { attempts: 5, .. }));
        assert!(err.is_fatal());
        assert_eq!(sync.record().await.game_number, 3);
    }

    #[tokio::test]
    async fn test_missing_record_is_fatal() {
        let mut store = MockDocumentStore::new();
        store
            .expect_edit()
            .times(1)
            .returning(|id, _, _| Err(BotError::Conflict { id: id.to_string() }));
        store.expect_retrieve().times(1).returning(|_| Ok(None));

        let sync = UserRecordSynchronizer::new(Arc::new(store), registered(1), 5);
        let err = sync.sync(2).await.unwrap_err();
        assert!(matches!(err, BotError::MissingDocument(_)));
    }
}
