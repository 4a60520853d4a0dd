//! Graceful Shutdown Handler
//!
//! Shutdown is cooperative. A request flips a watch flag that the change feed
//! and the game loop both observe; the loop then walks the drain phases and
//! waits for any in-flight decision without ever aborting it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::turn::TurnCoordinator;

/// Why the bot is stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / SIGTERM
    Interrupted,
    /// The game observer asked to stop
    GameLimit,
    /// Change feed ended
    FeedClosed,
    /// Unrecoverable store error
    Fatal,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Interrupted => write!(f, "interrupted"),
            ShutdownSignal::GameLimit => write!(f, "game_limit"),
            ShutdownSignal::FeedClosed => write!(f, "feed_closed"),
            ShutdownSignal::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// How often to report a decision that is still running (default: 5s)
    pub idle_report_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            idle_report_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    /// No further batches are evaluated
    StoppingIntake,
    /// Results not yet applied are dropped
    DiscardingPending,
    /// Waiting for the thinker to return
    AwaitingDecision,
    StoppingThinker,
    Complete,
}

impl std::fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::StoppingIntake => write!(f, "stopping_intake"),
            ShutdownPhase::DiscardingPending => write!(f, "discarding_pending"),
            ShutdownPhase::AwaitingDecision => write!(f, "awaiting_decision"),
            ShutdownPhase::StoppingThinker => write!(f, "stopping_thinker"),
            ShutdownPhase::Complete => write!(f, "complete"),
        }
    }
}

pub struct GracefulShutdown {
    config: ShutdownConfig,
    shutdown_requested: AtomicBool,
    phase: watch::Sender<ShutdownPhase>,
    signal: watch::Sender<Option<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new(config: ShutdownConfig) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        let (signal, _) = watch::channel(None);

        Self {
            config,
            shutdown_requested: AtomicBool::new(false),
            phase,
            signal,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ShutdownConfig::default())
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn current_phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// First request wins; later ones are logged and ignored
    pub fn request_shutdown(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal: {}", signal);
            return;
        }

        info!("Shutdown requested: {}", signal);
        self.signal.send_replace(Some(signal));
    }

    /// The signal that started shutdown, if any
    pub fn reason(&self) -> Option<ShutdownSignal> {
        *self.signal.borrow()
    }

    pub(crate) fn set_phase(&self, phase: ShutdownPhase) {
        self.phase.send_replace(phase);
        info!("Shutdown phase: {}", phase);
    }

    /// Wait for the in-flight decision to finish.
    ///
    /// Never times out: a thinker that does not return keeps the process
    /// alive, and this reports it periodically.
    pub async fn drain_decision(&self, turns: &TurnCoordinator) {
        let report_every = Duration::from_millis(self.config.idle_report_interval_ms.max(1));
        let start = std::time::Instant::now();

        let idle = turns.await_idle();
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = &mut idle => break,
                _ = tokio::time::sleep(report_every) => {
                    warn!(
                        waited_secs = start.elapsed().as_secs(),
                        "Still waiting for in-flight decision before shutdown"
                    );
                }
            }
        }
    }

    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            signal_rx: self.signal.subscribe(),
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Cloneable handle for tasks that stop on shutdown
#[derive(Clone)]
pub struct ShutdownToken {
    signal_rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownToken {
    pub fn is_shutdown_requested(&self) -> bool {
        self.signal_rx.borrow().is_some()
    }

    /// Resolve once shutdown is requested.
    ///
    /// A dropped coordinator counts as an interrupt.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        match self.signal_rx.wait_for(Option::is_some).await {
            Ok(signal) => signal.unwrap_or(ShutdownSignal::Interrupted),
            Err(_) => ShutdownSignal::Interrupted,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Forward OS signals into the shutdown coordinator
pub fn install_signal_handlers(shutdown: std::sync::Arc<GracefulShutdown>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.request_shutdown(ShutdownSignal::Interrupted);
    })
}
