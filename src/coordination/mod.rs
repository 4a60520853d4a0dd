//! Coordination Layer
//!
//! - Single-decision gate shared by the game loop and shutdown
//! - Graceful shutdown handling

pub mod shutdown;
pub mod turn;

pub use shutdown::{
    install_signal_handlers, shutdown_signal, GracefulShutdown, ShutdownConfig, ShutdownPhase,
    ShutdownSignal, ShutdownToken,
};
pub use turn::{TurnCoordinator, TurnPermit};
