// Technical indicators module
// Rolling means and candle pressure for regime classification

pub mod market_pressure;
pub mod moving_average;

pub use market_pressure::{calculate_market_pressure, MarketPressure};
pub use moving_average::{calculate_sma, MovingAverageSet, DEFAULT_WINDOWS};
