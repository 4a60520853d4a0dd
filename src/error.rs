use thiserror::Error;

/// Main error type for the checkers bot
#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed document {id}: {reason}")]
    Decoding { id: String, reason: String },

    // Document store errors
    #[error("Document not found: {0}")]
    MissingDocument(String),

    #[error("Revision conflict on document {id}")]
    Conflict { id: String },

    #[error("Gave up on document {id} after {attempts} conflicting writes")]
    ContentionExhausted { id: String, attempts: u32 },

    // Game setup errors
    #[error("Invalid team: {0}")]
    InvalidTeam(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Optimistic-concurrency mismatch that a re-read may resolve
    pub fn is_conflict(&self) -> bool {
        matches!(self, BotError::Conflict { .. })
    }

    /// Failures the game loop cannot reason past
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BotError::Conflict { .. } | BotError::Decoding { .. })
    }
}

/// Result type alias for BotError
pub type Result<T> = std::result::Result<T, BotError>;
