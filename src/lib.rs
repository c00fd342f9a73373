// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod regime;

// Re-export commonly used types
pub use error::BotError;
pub use models::*;
pub use regime::{classify, ConditionTracker, MarketCondition, TrendStrength};

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
