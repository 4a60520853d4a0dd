//! Document store and change feed seams
//!
//! The traits are transport-agnostic; `adapters` provides the HTTP and
//! in-memory implementations. The helpers below add typed access on top of
//! the raw JSON documents.

pub mod traits;

pub use traits::{ChangeFeed, DocumentRevision, DocumentStore, FeedMode, FeedOptions};

#[cfg(test)]
pub use traits::{MockChangeFeed, MockDocumentStore};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{BotError, Result};

/// Fetch and decode a document; `Ok(None)` when it does not exist
pub async fn fetch<T: DeserializeOwned>(store: &dyn DocumentStore, id: &str) -> Result<Option<T>> {
    match store.retrieve(id).await? {
        Some(value) => decode(id, value).map(Some),
        None => Ok(None),
    }
}

/// Fetch a document that must exist
pub async fn fetch_required<T: DeserializeOwned>(store: &dyn DocumentStore, id: &str) -> Result<T> {
    fetch(store, id)
        .await?
        .ok_or_else(|| BotError::MissingDocument(id.to_string()))
}

/// Fetch a document, treating a malformed one as absent
pub async fn fetch_lenient<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<T>> {
    match fetch(store, id).await {
        Err(BotError::Decoding { id, reason }) => {
            warn!(doc_id = %id, %reason, "Ignoring malformed document");
            Ok(None)
        }
        other => other,
    }
}

pub fn decode<T: DeserializeOwned>(id: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| BotError::Decoding {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

pub fn to_document<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserRecord;
    use serde_json::json;

    #[tokio::test]
    async fn test_fetch_lenient_treats_malformed_as_absent() {
        let mut store = MockDocumentStore::new();
        store
            .expect_retrieve()
            .returning(|_| Ok(Some(json!({"_id": "user:1", "team": "purple"}))));

        let strict = fetch::<UserRecord>(&store, "user:1").await;
        assert!(matches!(strict, Err(BotError::Decoding { .. })));

        let lenient = fetch_lenient::<UserRecord>(&store, "user:1").await.unwrap();
        assert!(lenient.is_none());
    }

    #[tokio::test]
    async fn test_fetch_required_reports_missing() {
        let mut store = MockDocumentStore::new();
        store.expect_retrieve().returning(|_| Ok(None));

        let result = fetch_required::<UserRecord>(&store, "user:404").await;
        assert!(matches!(result, Err(BotError::MissingDocument(id)) if id == "user:404"));
    }
}
