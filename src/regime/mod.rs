// Market regime classification module
pub mod classifier;
pub mod table;
pub mod tracker;

pub use classifier::{classify, rank, trend_strength, Label, MarketCondition, Ranking, TrendStrength};
pub use tracker::{allowed_kinds, ConditionSnapshot, ConditionTracker};
