pub mod adapters;
pub mod cli;
pub mod config;
pub mod controller;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod feed;
pub mod services;
pub mod store;
pub mod strategy;

pub use adapters::{MemoryStore, SyncGatewayClient};
pub use config::AppConfig;
pub use controller::{ControllerConfig, GameLoopController, LoopStats};
pub use coordination::{GracefulShutdown, ShutdownSignal, TurnCoordinator};
pub use domain::{GameStateSnapshot, LoopState, OutgoingVote, TeamId, UserRecord, ValidMove};
pub use error::{BotError, Result};
pub use store::{ChangeFeed, DocumentStore, FeedMode, FeedOptions};
pub use strategy::{GameObserver, Thinker, ThinkerKind};
