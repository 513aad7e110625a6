use thiserror::Error;

/// Errors surfaced by the grid engine and its adapters
#[derive(Debug, Error)]
pub enum GridError {
    /// Invalid grid bounds, base price or width. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Indicator inputs that cannot describe the same bars
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    #[error("price feed error: {0}")]
    Feed(String),

    #[error("order execution error: {0}")]
    Execution(String),

    #[error("state store error: {0}")]
    Store(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Settings(#[from] ::config::ConfigError),
}

impl GridError {
    /// Configuration errors mean the strategy cannot run at all
    pub fn is_fatal(&self) -> bool {
        matches!(self, GridError::Config(_) | GridError::Settings(_))
    }
}
