pub mod binance;
pub mod simulated;

pub use binance::BinanceClient;
pub use simulated::{RandomWalkFeed, WalkParams};
