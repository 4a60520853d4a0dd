use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::ChangeNotification;
use crate::error::{BotError, Result};

/// How the change feed waits for new data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    /// Plain read, then sleep for the poll interval
    #[serde(alias = "normal")]
    Poll,
    /// Server holds the request open until there is data
    Longpoll,
}

impl Default for FeedMode {
    fn default() -> Self {
        Self::Longpoll
    }
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "normal",
            Self::Longpoll => "longpoll",
        }
    }
}

impl fmt::Display for FeedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "poll" | "normal" => Ok(Self::Poll),
            "longpoll" => Ok(Self::Longpoll),
            other => Err(format!("invalid feed '{}'; expected longpoll|poll", other)),
        }
    }
}

/// Per-request feed options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    pub mode: FeedMode,
    /// Upper bound a longpoll request is held open by the server
    pub longpoll_timeout_ms: u64,
    /// Keep-alive interval requested from the server
    pub heartbeat_ms: u64,
    /// Maximum rows per batch, 0 = unlimited
    pub limit: usize,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            mode: FeedMode::Longpoll,
            longpoll_timeout_ms: 60_000,
            heartbeat_ms: 30_000,
            limit: 0,
        }
    }
}

/// Identity of a freshly written document
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocumentRevision {
    pub id: String,
    #[serde(alias = "rev")]
    pub revision: String,
}

/// CRUD access to the shared document store.
///
/// Documents travel as raw JSON so implementations stay object-safe; typed
/// access goes through [`super::fetch`] and friends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document; `Ok(None)` when it does not exist
    async fn retrieve(&self, id: &str) -> Result<Option<Value>>;

    /// Create a document. The id is taken from `_id` when present.
    async fn insert(&self, document: Value) -> Result<DocumentRevision>;

    /// Replace a document at a known revision.
    ///
    /// Returns the new revision, or `BotError::Conflict` when `revision` is
    /// no longer current.
    async fn edit(&self, id: &str, revision: &str, document: Value) -> Result<String>;
}

/// Read side of the store's change notifications
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Sequence of the most recent change, used as the starting cursor
    async fn latest_sequence(&self) -> Result<String>;

    /// Read one batch of changes after `since`
    async fn changes(&self, since: &str, options: &FeedOptions) -> Result<ChangeNotification>;
}

pub(crate) fn conflict(id: &str) -> BotError {
    BotError::Conflict { id: id.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_mode_parsing() {
        assert_eq!("longpoll".parse::<FeedMode>().unwrap(), FeedMode::Longpoll);
        assert_eq!("normal".parse::<FeedMode>().unwrap(), FeedMode::Poll);
        assert_eq!("POLL".parse::<FeedMode>().unwrap(), FeedMode::Poll);
        assert!("continuous".parse::<FeedMode>().is_err());
        assert_eq!(FeedMode::Poll.to_string(), "normal");
    }
}
