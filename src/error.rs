use thiserror::Error;

/// Errors surfaced by the library.
///
/// Feed and execution failures are contained by the monitor loop and only
/// show up as log events; the rest reach callers at setup time.
#[derive(Debug, Error)]
pub enum BotError {
    /// Price feed failed after all retry attempts
    #[error("price feed unavailable: {0}")]
    FeedUnavailable(String),

    /// Fewer candles than the largest configured window
    #[error("insufficient history: have {have} candles, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    /// Trade executor returned an error
    #[error("trade execution failed: {0}")]
    ExecutionFailure(String),

    #[error("position already open for {0}")]
    PositionAlreadyOpen(String),

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("trade log error: {0}")]
    TradeLog(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}
