pub mod user_sync;
pub mod vote_submitter;

pub use user_sync::{UserRecordSynchronizer, DEFAULT_MAX_SYNC_ATTEMPTS};
pub use vote_submitter::{VoteSubmitter, VoteSubmitterConfig};
