// Trade gating, execution and the monitor loop
pub mod executor;
pub mod gate;
pub mod loss_filter;
pub mod monitor;
pub mod price_feed;
pub mod scan;

pub use executor::{HttpExecutor, PaperExecutor, TradeExecutor};
pub use gate::{
    ControlSignal, ExecutionGate, ExitThresholds, OpenPosition, OpenRequest, PositionState,
    TradeAction, Transition,
};
pub use loss_filter::{LossFilter, TradeFingerprint};
pub use monitor::{
    ma_snapshot, ControlFlags, CycleOutcome, MonitorConfig, MonitorHandle, MonitorLoop,
    MonitorSummary,
};
pub use price_feed::{fetch_candles_with_retry, fetch_ticker_with_retry, PriceFeed, RetryPolicy};
pub use scan::{scan, IntervalReading, SCAN_INTERVALS};
