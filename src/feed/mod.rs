//! Change feed subscription
//!
//! [`subscribe`] turns a [`ChangeFeed`] into a lazy stream of batches;
//! [`ChangeFeedConsumer`] runs that stream on its own task and hands batches
//! to the game loop without ever blocking on it.

pub mod consumer;

pub use consumer::{ChangeFeedConsumer, FeedSettings};

use futures::stream::{self, Stream};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::ChangeNotification;
use crate::error::Result;
use crate::store::{ChangeFeed, FeedMode, FeedOptions};

struct Subscription {
    feed: Arc<dyn ChangeFeed>,
    cursor: String,
    options: FeedOptions,
    poll_interval: Duration,
    first_read: bool,
}

/// Read batches starting at `since`, forever.
///
/// The cursor advances with each batch's `last_seq` and is kept when the
/// server sends none. In poll mode reads are spaced by `poll_interval`. The
/// stream yields one `Err` on a transport failure and then ends.
pub fn subscribe(
    feed: Arc<dyn ChangeFeed>,
    since: impl Into<String>,
    options: FeedOptions,
    poll_interval: Duration,
) -> impl Stream<Item = Result<ChangeNotification>> + Send {
    let initial = Subscription {
        feed,
        cursor: since.into(),
        options,
        poll_interval,
        first_read: true,
    };

    stream::unfold(Some(initial), |state| async move {
        let mut sub = state?;

        if !sub.first_read && sub.options.mode == FeedMode::Poll {
            tokio::time::sleep(sub.poll_interval).await;
        }
        sub.first_read = false;

        match sub.feed.changes(&sub.cursor, &sub.options).await {
            Ok(batch) => {
                sub.cursor = batch.next_cursor();
                Some((Ok(batch), Some(sub)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}
