use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::controller::{ControllerConfig, DEFAULT_GAME_DOC_ID};
use crate::domain::TeamId;
use crate::error::{BotError, Result};
use crate::feed::FeedSettings;
use crate::services::VoteSubmitterConfig;
use crate::store::{FeedMode, FeedOptions};
use crate::strategy::ThinkerKind;

pub const DEFAULT_SYNC_GATEWAY_URL: &str = "http://localhost:4984/checkers";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub vote: VoteConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Database URL, e.g. http://localhost:4984/checkers
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Id of the shared game document
    #[serde(default = "default_game_doc_id")]
    pub game_doc_id: String,
    /// Timeout for plain document requests
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            game_doc_id: default_game_doc_id(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_store_url() -> String {
    DEFAULT_SYNC_GATEWAY_URL.to_string()
}

fn default_game_doc_id() -> String {
    DEFAULT_GAME_DOC_ID.to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// longpoll | poll (alias: normal)
    #[serde(default)]
    pub mode: FeedMode,
    /// Pause between reads in poll mode
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long the server may hold a long-poll open
    #[serde(default = "default_longpoll_timeout_ms")]
    pub longpoll_timeout_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Batches buffered between the feed task and the game loop
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            mode: FeedMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            longpoll_timeout_ms: default_longpoll_timeout_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_longpoll_timeout_ms() -> u64 {
    60_000
}

fn default_heartbeat_ms() -> u64 {
    30_000
}

fn default_buffer_size() -> usize {
    16
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteConfig {
    /// Upper bound of the random pause before a vote is written
    #[serde(default = "default_vote_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            max_delay_ms: default_vote_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_vote_max_delay_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    #[serde(default = "default_max_attempts")]
    pub max_sync_attempts: u32,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            max_sync_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BotConfig {
    /// RED or BLUE; no default, must come from config or the command line
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub thinker: ThinkerKind,
    /// Stop after this many finished games
    #[serde(default)]
    pub max_games: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily log files; console only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("feed.mode", "longpoll")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("CHECKERS_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (CHECKERS__STORE__URL, etc.)
            .add_source(
                Environment::with_prefix("CHECKERS")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn team(&self) -> Result<TeamId> {
        match self.bot.team.as_deref() {
            Some(raw) => raw.parse().map_err(BotError::InvalidTeam),
            None => Err(BotError::InvalidTeam(
                "no team given; pass --team RED|BLUE".to_string(),
            )),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.store.request_timeout_ms)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            options: FeedOptions {
                mode: self.feed.mode,
                longpoll_timeout_ms: self.feed.longpoll_timeout_ms,
                heartbeat_ms: self.feed.heartbeat_ms,
                limit: 0,
            },
            poll_interval: Duration::from_millis(self.feed.poll_interval_ms),
            buffer_size: self.feed.buffer_size,
        }
    }

    pub fn vote_submitter_config(&self) -> VoteSubmitterConfig {
        VoteSubmitterConfig {
            max_delay: Duration::from_millis(self.vote.max_delay_ms),
            max_attempts: self.vote.max_attempts,
        }
    }

    pub fn controller_config(&self, team: TeamId) -> ControllerConfig {
        ControllerConfig::new(team).with_game_doc_id(self.store.game_doc_id.clone())
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.team() {
            errors.push(e.to_string());
        }

        if self.store.game_doc_id.trim().is_empty() {
            errors.push("store.game_doc_id must not be empty".to_string());
        }

        if self.feed.buffer_size == 0 {
            errors.push("feed.buffer_size must be at least 1".to_string());
        }

        if self.feed.mode == FeedMode::Poll && self.feed.poll_interval_ms == 0 {
            errors.push("feed.poll_interval_ms must be positive in poll mode".to_string());
        }

        if self.vote.max_attempts == 0 || self.user.max_sync_attempts == 0 {
            errors.push("retry attempts must be at least 1".to_string());
        }

        if self.bot.max_games == Some(0) {
            errors.push("bot.max_games must be at least 1 when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
