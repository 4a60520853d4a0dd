//! Game loop controller
//!
//! Turns change notifications into at most one decision per turn and drives
//! the resulting vote into the store.

pub mod config;
pub mod controller;

pub use config::{ControllerConfig, DEFAULT_GAME_DOC_ID};
pub use controller::{GameLoopController, LoopStats};
