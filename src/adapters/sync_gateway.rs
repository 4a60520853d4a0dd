//! Sync Gateway / CouchDB REST adapter
//!
//! Implements the document store and change feed over the CouchDB-compatible
//! HTTP API: `GET/PUT /{db}/{id}`, `POST /{db}/`, `GET /{db}/_changes` and
//! `GET /{db}/` for the current update sequence.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::domain::{ChangeNotification, ChangesEnvelope};
use crate::error::{BotError, Result};
use crate::store::traits::conflict;
use crate::store::{ChangeFeed, DocumentRevision, DocumentStore, FeedMode, FeedOptions};

/// Slack added on top of the server-side longpoll timeout before the client gives up
const LONGPOLL_CLIENT_SLACK: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct DatabaseInfo {
    #[serde(default, deserialize_with = "crate::domain::changes::deserialize_sequence")]
    update_seq: Option<String>,
}

#[derive(Clone)]
pub struct SyncGatewayClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

impl SyncGatewayClient {
    /// `base_url` is the database URL, e.g. `http://localhost:4984/checkers`
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| BotError::Validation(format!("invalid store URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BotError::Validation(format!(
                "store URL must be http(s), got '{}'",
                base_url
            )));
        }

        // No client-wide timeout: longpoll requests set their own.
        let http = Client::builder()
            .user_agent("checkers-bot/0.1")
            .build()
            .map_err(|e| BotError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(id))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Response> {
        let mut req = self.http.request(method, url).timeout(timeout);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }
        Ok(req.send().await?)
    }

    async fn transport_error(method: &str, url: &str, resp: Response) -> BotError {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        BotError::Transport(format!(
            "{} {} failed: status={} body={}",
            method, url, status, text
        ))
    }
}

#[async_trait]
impl DocumentStore for SyncGatewayClient {
    #[instrument(skip(self), level = "debug")]
    async fn retrieve(&self, id: &str) -> Result<Option<Value>> {
        let url = self.doc_url(id);
        let resp = self
            .send(Method::GET, &url, &[], None, self.request_timeout)
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let text = resp.text().await?;
                let value = serde_json::from_str(&text).map_err(|e| BotError::Decoding {
                    id: id.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            _ => Err(Self::transport_error("GET", &url, resp).await),
        }
    }

    #[instrument(skip(self, document), level = "debug")]
    async fn insert(&self, document: Value) -> Result<DocumentRevision> {
        let id = document.get("_id").and_then(Value::as_str).map(str::to_string);

        let (method, url) = match &id {
            Some(id) => (Method::PUT, self.doc_url(id)),
            None => (Method::POST, format!("{}/", self.base_url)),
        };
        let resp = self
            .send(method.clone(), &url, &[], Some(&document), self.request_timeout)
            .await?;

        match resp.status() {
            StatusCode::CONFLICT => Err(conflict(id.as_deref().unwrap_or_default())),
            status if status.is_success() => {
                let created: DocumentRevision = resp.json().await?;
                debug!(doc_id = %created.id, rev = %created.revision, "Document created");
                Ok(created)
            }
            _ => Err(Self::transport_error(method.as_str(), &url, resp).await),
        }
    }

    #[instrument(skip(self, document), level = "debug")]
    async fn edit(&self, id: &str, revision: &str, mut document: Value) -> Result<String> {
        if let Value::Object(map) = &mut document {
            map.insert("_id".into(), Value::String(id.to_string()));
            map.insert("_rev".into(), Value::String(revision.to_string()));
        } else {
            return Err(BotError::Validation(format!(
                "document {} must be a JSON object",
                id
            )));
        }

        let url = self.doc_url(id);
        let resp = self
            .send(Method::PUT, &url, &[], Some(&document), self.request_timeout)
            .await?;

        match resp.status() {
            StatusCode::CONFLICT => {
                debug!(doc_id = %id, rev = %revision, "Edit rejected: stale revision");
                Err(conflict(id))
            }
            status if status.is_success() => {
                let updated: DocumentRevision = resp.json().await?;
                Ok(updated.revision)
            }
            _ => Err(Self::transport_error("PUT", &url, resp).await),
        }
    }
}

#[async_trait]
impl ChangeFeed for SyncGatewayClient {
    async fn latest_sequence(&self) -> Result<String> {
        let url = format!("{}/", self.base_url);
        let resp = self
            .send(Method::GET, &url, &[], None, self.request_timeout)
            .await?;
        if !resp.status().is_success() {
            return Err(Self::transport_error("GET", &url, resp).await);
        }

        let info: DatabaseInfo = resp.json().await?;
        Ok(info.update_seq.unwrap_or_else(|| {
            warn!("Database info has no update_seq, starting feed from 0");
            "0".to_string()
        }))
    }

    #[instrument(skip(self, options), fields(feed = %options.mode), level = "debug")]
    async fn changes(&self, since: &str, options: &FeedOptions) -> Result<ChangeNotification> {
        let url = format!("{}/_changes", self.base_url);

        let mut query = vec![
            ("feed", options.mode.as_str().to_string()),
            ("since", since.to_string()),
            ("heartbeat", options.heartbeat_ms.to_string()),
        ];
        if options.limit > 0 {
            query.push(("limit", options.limit.to_string()));
        }

        let timeout = match options.mode {
            FeedMode::Longpoll => {
                query.push(("timeout", options.longpoll_timeout_ms.to_string()));
                Duration::from_millis(options.longpoll_timeout_ms) + LONGPOLL_CLIENT_SLACK
            }
            FeedMode::Poll => self.request_timeout,
        };

        let resp = self.send(Method::GET, &url, &query, None, timeout).await?;
        if !resp.status().is_success() {
            return Err(Self::transport_error("GET", &url, resp).await);
        }

        let text = resp.text().await?;
        let envelope: ChangesEnvelope = serde_json::from_str(&text).map_err(|e| {
            BotError::Decoding {
                id: "_changes".to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(ChangeNotification::from_envelope(since, envelope))
    }
}
