//! Turn Coordinator
//!
//! Guarantees at most one decision computation per controller and doubles as
//! the shutdown barrier. The in-flight flag lives in a `watch` channel: its
//! lock serializes check-and-set, and its change notification wakes
//! `await_idle` without polling.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

pub struct TurnCoordinator {
    in_flight: watch::Sender<bool>,
}

impl TurnCoordinator {
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(false);
        Self { in_flight }
    }

    /// Claim the decision slot; `false` immediately if it is taken
    pub fn try_start(&self) -> bool {
        let started = self.in_flight.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        trace!(started, "Decision slot claim");
        started
    }

    /// Release the decision slot and wake anyone in `await_idle`
    pub fn finish(&self) {
        let released = self.in_flight.send_if_modified(|busy| std::mem::replace(busy, false));
        if released {
            debug!("Decision slot released");
        }
    }

    /// Wait until no decision is in flight
    pub async fn await_idle(&self) {
        let mut rx = self.in_flight.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    pub fn is_in_flight(&self) -> bool {
        *self.in_flight.borrow()
    }

    /// Claim the slot as a guard that releases it on drop
    pub fn try_acquire(self: &Arc<Self>) -> Option<TurnPermit> {
        if self.try_start() {
            Some(TurnPermit {
                coordinator: Arc::clone(self),
            })
        } else {
            None
        }
    }
}

impl Default for TurnCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by the decision task; dropping it calls `finish`
#[must_use = "dropping the permit releases the decision slot"]
pub struct TurnPermit {
    coordinator: Arc<TurnCoordinator>,
}

impl std::fmt::Debug for TurnPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPermit").finish_non_exhaustive()
    }
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.coordinator.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Barrier;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_try_start_never_queues() {
        let coordinator = TurnCoordinator::new();
        assert!(coordinator.try_start());
        assert!(coordinator.is_in_flight());
        assert!(!coordinator.try_start());

        coordinator.finish();
        assert!(!coordinator.is_in_flight());
        assert!(coordinator.try_start());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_try_start_exactly_one_wins() {
        for _ in 0..50 {
            let coordinator = Arc::new(TurnCoordinator::new());
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let coordinator = coordinator.clone();
                    let barrier = barrier.clone();
                    tokio::spawn(async move {
                        barrier.wait().await;
                        coordinator.try_start()
                    })
                })
                .collect();

            let mut wins = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    wins += 1;
                }
            }
            assert_eq!(wins, 1);
        }
    }

    #[test]
    fn test_await_idle_waits_for_finish() {
        let coordinator = TurnCoordinator::new();
        assert!(coordinator.try_start());

        let mut idle = task::spawn(coordinator.await_idle());
        assert_pending!(idle.poll());

        // A failed claim does not release the slot
        assert!(!coordinator.try_start());
        assert_pending!(idle.poll());

        coordinator.finish();
        assert!(idle.is_woken());
        assert_ready!(idle.poll());
    }

    #[test]
    fn test_await_idle_ready_when_idle() {
        let coordinator = TurnCoordinator::new();
        let mut idle = task::spawn(coordinator.await_idle());
        assert_ready!(idle.poll());
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let coordinator = Arc::new(TurnCoordinator::new());
        let permit = coordinator.try_acquire().unwrap();
        assert!(coordinator.try_acquire().is_none());

        drop(permit);
        assert!(!coordinator.is_in_flight());
        assert!(coordinator.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_permit_released_by_panicking_task() {
        let coordinator = Arc::new(TurnCoordinator::new());
        let permit = coordinator.try_acquire().unwrap();

        let result = tokio::spawn(async move {
            let _permit = permit;
            panic!("thinker blew up");
        })
        .await;

        assert!(result.is_err());
        coordinator.await_idle().await;
        assert!(!coordinator.is_in_flight());
    }
}
