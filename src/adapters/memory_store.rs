//! In-process document store with a change feed.
//!
//! Follows CouchDB semantics closely enough to drive the game loop without a
//! server: revisions are `<generation>-<hex>`, stale edits conflict, and the
//! change feed reports each document once at its latest revision.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{ChangeEntry, ChangeNotification};
use crate::error::Result;
use crate::store::traits::conflict;
use crate::store::{ChangeFeed, DocumentRevision, DocumentStore, FeedMode, FeedOptions};

#[derive(Debug, Clone)]
struct StoredDocument {
    generation: u64,
    revision: String,
    body: Value,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    docs: HashMap<String, StoredDocument>,
    update_seq: u64,
}

impl Inner {
    fn write(&mut self, id: &str, mut body: Value) -> String {
        let generation = self.docs.get(id).map(|d| d.generation + 1).unwrap_or(1);
        self.update_seq += 1;
        let revision = format!("{}-{:x}", generation, self.update_seq);

        if let Value::Object(map) = &mut body {
            map.insert("_id".into(), Value::String(id.to_string()));
            map.insert("_rev".into(), Value::String(revision.clone()));
        }

        self.docs.insert(
            id.to_string(),
            StoredDocument {
                generation,
                revision: revision.clone(),
                body,
                seq: self.update_seq,
            },
        );
        revision
    }

    fn changes_since(&self, since: u64) -> Vec<(u64, ChangeEntry)> {
        let mut rows: Vec<(u64, ChangeEntry)> = self
            .docs
            .iter()
            .filter(|(_, doc)| doc.seq > since)
            .map(|(id, doc)| {
                (
                    doc.seq,
                    ChangeEntry {
                        document_id: id.clone(),
                        revision: doc.revision.clone(),
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    changed: Notify,
    retrieves: AtomicUsize,
    inserts: AtomicUsize,
    edits: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a document unconditionally, as the game server would
    pub async fn put(&self, id: &str, body: Value) -> String {
        let revision = self.inner.lock().await.write(id, body);
        self.changed.notify_waiters();
        revision
    }

    pub async fn current_revision(&self, id: &str) -> Option<String> {
        self.inner
            .lock()
            .await
            .docs
            .get(id)
            .map(|d| d.revision.clone())
    }

    pub fn retrieve_count(&self) -> usize {
        self.retrieves.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn edit_count(&self) -> usize {
        self.edits.load(Ordering::SeqCst)
    }

    async fn batch_since(&self, since: &str) -> ChangeNotification {
        let cursor = since.trim().parse::<u64>().unwrap_or(0);
        let inner = self.inner.lock().await;
        let rows = inner.changes_since(cursor);

        ChangeNotification {
            since: since.to_string(),
            last_sequence: Some(inner.update_seq.to_string()),
            entries: rows.into_iter().map(|(_, entry)| entry).collect(),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn retrieve(&self, id: &str) -> Result<Option<Value>> {
        self.retrieves.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().await;
        Ok(inner.docs.get(id).map(|d| d.body.clone()))
    }

    async fn insert(&self, document: Value) -> Result<DocumentRevision> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let id = document
            .get("_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

        let revision = {
            let mut inner = self.inner.lock().await;
            if inner.docs.contains_key(&id) {
                return Err(conflict(&id));
            }
            inner.write(&id, document)
        };
        self.changed.notify_waiters();

        debug!(doc_id = %id, rev = %revision, "Document created");
        Ok(DocumentRevision { id, revision })
    }

    async fn edit(&self, id: &str, revision: &str, document: Value) -> Result<String> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        let new_revision = {
            let mut inner = self.inner.lock().await;
            match inner.docs.get(id) {
                // CouchDB answers 409 for an edit of a missing document too
                None => return Err(conflict(id)),
                Some(current) if current.revision != revision => return Err(conflict(id)),
                Some(_) => inner.write(id, document),
            }
        };
        self.changed.notify_waiters();
        Ok(new_revision)
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn latest_sequence(&self) -> Result<String> {
        Ok(self.inner.lock().await.update_seq.to_string())
    }

    async fn changes(&self, since: &str, options: &FeedOptions) -> Result<ChangeNotification> {
        if options.mode == FeedMode::Poll {
            return Ok(self.batch_since(since).await);
        }

        let deadline = Instant::now() + Duration::from_millis(options.longpoll_timeout_ms);
        loop {
            // Register before checking so a write in between is not missed.
            let notified = self.changed.notified();

            let batch = self.batch_since(since).await;
            if !batch.is_empty() {
                return Ok(batch);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(batch);
            }
        }
    }
}
