//! Feed task
//!
//! Owns the subscription stream and a bounded hand-off to the game loop. When
//! the buffer is full the batch is held back and merged with later reads, so
//! a slow consumer costs latency but never entries.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::coordination::ShutdownToken;
use crate::domain::ChangeNotification;
use crate::error::Result;
use crate::store::{ChangeFeed, FeedOptions};

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub options: FeedOptions,
    /// Delay between reads in poll mode
    pub poll_interval: Duration,
    /// Batches buffered between the feed task and the game loop
    pub buffer_size: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            options: FeedOptions::default(),
            poll_interval: Duration::from_millis(1_000),
            buffer_size: 16,
        }
    }
}

pub struct ChangeFeedConsumer;

impl ChangeFeedConsumer {
    /// Start reading from `since` until shutdown is requested.
    ///
    /// Empty batches are not forwarded. A transport failure is forwarded as
    /// the last item before the channel closes.
    pub fn spawn(
        feed: Arc<dyn ChangeFeed>,
        since: String,
        settings: FeedSettings,
        shutdown: ShutdownToken,
    ) -> (mpsc::Receiver<Result<ChangeNotification>>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.buffer_size.max(1));
        let handle = tokio::spawn(run(feed, since, settings, tx, shutdown));
        (rx, handle)
    }
}

async fn run(
    feed: Arc<dyn ChangeFeed>,
    since: String,
    settings: FeedSettings,
    tx: mpsc::Sender<Result<ChangeNotification>>,
    mut shutdown: ShutdownToken,
) {
    info!(since = %since, mode = %settings.options.mode, "Change feed started");

    let stream = super::subscribe(feed, since, settings.options, settings.poll_interval);
    futures::pin_mut!(stream);

    let mut backlog: Option<ChangeNotification> = None;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.wait_for_shutdown() => {
                // Dropping the stream abandons any long-poll in progress.
                info!("Change feed stopping");
                break;
            }

            permit = tx.reserve(), if backlog.is_some() => {
                match (permit, backlog.take()) {
                    (Ok(permit), Some(batch)) => {
                        debug!(entries = batch.entries.len(), "Delivered coalesced batch");
                        permit.send(Ok(batch));
                    }
                    (Ok(_), None) => {}
                    (Err(_), _) => {
                        debug!("Game loop gone, change feed stopping");
                        break;
                    }
                }
            }

            next = stream.next() => match next {
                None => break,
                Some(Err(e)) => {
                    error!(error = %e, "Change feed failed");
                    tokio::select! {
                        _ = shutdown.wait_for_shutdown() => {}
                        _ = tx.send(Err(e)) => {}
                    }
                    break;
                }
                Some(Ok(batch)) => {
                    let was_coalescing = backlog.is_some();
                    let batch = match backlog.take() {
                        Some(mut pending) => {
                            pending.merge(batch);
                            pending
                        }
                        None => batch,
                    };
                    if batch.is_empty() {
                        continue;
                    }

                    match tx.try_send(Ok(batch)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(item)) => {
                            if !was_coalescing {
                                warn!("Game loop busy, coalescing change batches");
                            }
                            backlog = item.ok();
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!("Game loop gone, change feed stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    info!("Change feed stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::coordination::{GracefulShutdown, ShutdownSignal};
    use crate::error::BotError;
    use crate::store::{FeedMode, MockChangeFeed};
    use serde_json::json;
    use tokio::time::timeout;

    fn poll_settings(buffer_size: usize) -> FeedSettings {
        FeedSettings {
            options: FeedOptions {
                mode: FeedMode::Poll,
                ..FeedOptions::default()
            },
            poll_interval: Duration::from_millis(2),
            buffer_size,
        }
    }

    #[tokio::test]
    async fn test_full_buffer_coalesces_without_loss() {
        let store = Arc::new(MemoryStore::new());
        let shutdown = GracefulShutdown::with_defaults();
        let (mut rx, handle) =
            ChangeFeedConsumer::spawn(store.clone(), "0".into(), poll_settings(1), shutdown.token());

        let first_rev = store.put("game:checkers", json!({"turn": 1})).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.put("user:1", json!({})).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        let last_rev = store.put("game:checkers", json!({"turn": 2})).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let first = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap().unwrap();
        assert_eq!(first.latest_revision_of("game:checkers"), Some(first_rev.as_str()));

        let merged = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap().unwrap();
        assert!(merged.latest_revision_of("user:1").is_some());
        assert_eq!(merged.latest_revision_of("game:checkers"), Some(last_rev.as_str()));
        assert_eq!(merged.next_cursor(), "3");

        shutdown.request_shutdown(ShutdownSignal::Interrupted);
        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_transport_error_is_last_item() {
        let mut feed = MockChangeFeed::new();
        feed.expect_changes()
            .times(1)
            .returning(|_, _| Err(BotError::Transport("503".into())));

        let shutdown = GracefulShutdown::with_defaults();
        let (mut rx, handle) =
            ChangeFeedConsumer::spawn(Arc::new(feed), "0".into(), poll_settings(4), shutdown.token());

        assert!(matches!(rx.recv().await, Some(Err(BotError::Transport(_)))));
        assert!(rx.recv().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_abandons_longpoll() {
        let store = Arc::new(MemoryStore::new());
        let shutdown = GracefulShutdown::with_defaults();
        let settings = FeedSettings {
            options: FeedOptions {
                mode: FeedMode::Longpoll,
                longpoll_timeout_ms: 60_000,
                ..FeedOptions::default()
            },
            ..FeedSettings::default()
        };
        let (mut rx, handle) =
            ChangeFeedConsumer::spawn(store, "0".into(), settings, shutdown.token());

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.request_shutdown(ShutdownSignal::Interrupted);

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
    }
}
