use regimebot::config::{FileSettingsStore, StaticSettings, TradeSettings};
use regimebot::execution::{
    LossFilter, MonitorConfig, MonitorLoop, PaperExecutor, PriceFeed, RetryPolicy,
};
use regimebot::persistence::{FanoutTradeLog, JsonlTradeLog, MemoryTradeLog, TradeSink};
use regimebot::*;
use chrono::Utc;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Each candle fetch moves to the next scripted price; tickers report it
struct ReplayFeed {
    candles: Vec<PricePoint>,
    script: Mutex<VecDeque<f64>>,
    current: Mutex<f64>,
}

impl ReplayFeed {
    fn new(closes: impl Iterator<Item = f64>, script: &[f64]) -> Self {
        let candles = closes
            .enumerate()
            .map(|(i, close)| PricePoint {
                timestamp: Utc::now() + chrono::Duration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1.0,
            })
            .collect();
        Self {
            candles,
            script: Mutex::new(script.iter().copied().collect()),
            current: Mutex::new(0.0),
        }
    }
}

impl PriceFeed for ReplayFeed {
    async fn fetch_candles(&self, _: &str, _: &str, limit: usize) -> Result<Vec<PricePoint>> {
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BotError::FeedUnavailable("replay finished".into()))?;
        *self.current.lock().unwrap() = next;

        let start = self.candles.len().saturating_sub(limit);
        Ok(self.candles[start..].to_vec())
    }

    async fn fetch_ticker(&self, _: &str) -> Result<Ticker> {
        let price = *self.current.lock().unwrap();
        Ok(Ticker {
            last_price: price,
            high_price: price,
            low_price: price,
        })
    }
}

fn fast_config(cycles: u64) -> MonitorConfig {
    MonitorConfig {
        symbol: "TESTUSDT".to_string(),
        cycle_interval: Duration::ZERO,
        pause_poll: Duration::from_millis(1),
        retry: RetryPolicy::new(1, Duration::ZERO),
        max_cycles: Some(cycles),
        ..MonitorConfig::default()
    }
}

fn bracket(return_percentage: f64, loss_risk_percentage: f64) -> StaticSettings {
    StaticSettings(TradeSettings {
        amount: 1.0,
        return_percentage,
        loss_risk_percentage,
        ..TradeSettings::default()
    })
}

#[tokio::test]
async fn test_long_trade_lifecycle_is_logged_to_every_sink() {
    let dir = tempfile::tempdir().unwrap();
    let jsonl_path = dir.path().join("trades.jsonl");

    let closes = (0..200).map(|i| 90.0 + i as f64 * 0.05);
    let feed = Arc::new(ReplayFeed::new(closes, &[110.0, 110.0, 111.0, 116.0]));
    let executor = PaperExecutor::new(feed.clone(), "TESTUSDT");
    let memory = Arc::new(MemoryTradeLog::new());
    let trade_log = FanoutTradeLog::new()
        .with_sink(TradeSink::Memory(memory.clone()))
        .with_sink(TradeSink::Jsonl(JsonlTradeLog::new(&jsonl_path)));

    let mut monitor = MonitorLoop::new(fast_config(4), feed, executor, trade_log, bracket(5.0, 2.0));
    let (_stop_tx, stop_rx) = watch::channel(false);
    let summary = monitor.run(stop_rx).await;

    assert_eq!(summary.cycles, 4);
    assert_eq!(summary.opened, 1);
    assert_eq!(summary.closed, 1);
    assert_eq!(summary.realized_pnl, 6.0);
    assert!(!monitor.gate().is_open());

    let records = memory.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].trade_type, TradeKind::MarketBuy);
    assert_eq!(records[0].fill_price, 110.0);
    assert_eq!(records[0].regime, MarketCondition::Bullish);
    assert_eq!(records[1].exit_reason, Some(ExitReason::Profit));

    let persisted: Vec<TradeRecord> = std::fs::read_to_string(&jsonl_path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(persisted, records);
}

#[tokio::test]
async fn test_short_trade_takes_profit_on_the_way_down() {
    let closes = (0..200).map(|i| 110.0 - i as f64 * 0.05);
    let feed = Arc::new(ReplayFeed::new(closes, &[90.0, 90.0, 88.0, 85.0]));
    let executor = PaperExecutor::new(feed.clone(), "TESTUSDT");
    let memory = Arc::new(MemoryTradeLog::new());

    let mut monitor =
        MonitorLoop::new(fast_config(4), feed, executor, memory.clone(), bracket(5.0, 2.0));
    let (_stop_tx, stop_rx) = watch::channel(false);
    let summary = monitor.run(stop_rx).await;

    assert_eq!(summary.opened, 1);
    assert_eq!(summary.closed, 1);
    assert_eq!(summary.realized_pnl, 5.0);

    let records = memory.records();
    assert_eq!(records[0].trade_type, TradeKind::MarketSell);
    assert_eq!(records[0].regime, MarketCondition::Bearish);
    assert_eq!(records[1].status, TradeStatus::Closed);
    assert_eq!(records[1].fill_price, 85.0);
}

#[tokio::test]
async fn test_limit_trade_without_price_never_opens() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(b"[trade]\ntrade_type = \"limit\"\n").unwrap();

    let closes = (0..200).map(|i| 90.0 + i as f64 * 0.05);
    let feed = Arc::new(ReplayFeed::new(closes, &[110.0; 3]));
    let executor = PaperExecutor::new(feed.clone(), "TESTUSDT");
    let memory = Arc::new(MemoryTradeLog::new());

    let mut monitor = MonitorLoop::new(
        fast_config(3),
        feed,
        executor,
        memory.clone(),
        FileSettingsStore::new(file.path()),
    );
    let (_stop_tx, stop_rx) = watch::channel(false);
    let summary = monitor.run(stop_rx).await;

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.opened, 0);
    assert!(memory.records().is_empty());
}

#[tokio::test]
async fn test_exhausted_feed_counts_as_skipped() {
    let closes = (0..200).map(|i| 90.0 + i as f64 * 0.05);
    let feed = Arc::new(ReplayFeed::new(closes, &[110.0]));
    let executor = PaperExecutor::new(feed.clone(), "TESTUSDT");

    let mut monitor = MonitorLoop::new(
        fast_config(3),
        feed,
        executor,
        Arc::new(MemoryTradeLog::new()),
        bracket(1.0, 1.0),
    );
    let (_stop_tx, stop_rx) = watch::channel(false);
    let summary = monitor.run(stop_rx).await;

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.skipped, 2);
    assert_eq!(monitor.tracker().snapshot().current, MarketCondition::Bullish);
}

#[tokio::test]
async fn test_losing_entry_stays_blocked_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let jsonl_path = dir.path().join("trades.jsonl");

    // first session: open at 110, stopped out at 107
    {
        let closes = (0..200).map(|i| 90.0 + i as f64 * 0.05);
        let feed = Arc::new(ReplayFeed::new(closes, &[110.0, 110.0, 107.0]));
        let executor = PaperExecutor::new(feed.clone(), "TESTUSDT");
        let mut monitor = MonitorLoop::new(
            fast_config(3),
            feed,
            executor,
            JsonlTradeLog::new(&jsonl_path),
            bracket(5.0, 2.0),
        );
        let (_stop_tx, stop_rx) = watch::channel(false);
        let summary = monitor.run(stop_rx).await;
        assert_eq!(summary.closed, 1);
        assert!(summary.realized_pnl < 0.0);
    }

    // second session rebuilds the filter from the same file
    let history = JsonlTradeLog::new(&jsonl_path).load_all().await.unwrap();
    assert_eq!(history.len(), 2);
    let restored = LossFilter::from_records(&history, "TESTUSDT", "1m");
    assert_eq!(restored.len(), 1);
    assert!(LossFilter::from_records(&history, "ETHUSDT", "1m").is_empty());

    let closes = (0..200).map(|i| 90.0 + i as f64 * 0.05);
    let feed = Arc::new(ReplayFeed::new(closes, &[110.0; 3]));
    let executor = PaperExecutor::new(feed.clone(), "TESTUSDT");
    let mut monitor = MonitorLoop::new(
        fast_config(3),
        feed,
        executor,
        JsonlTradeLog::new(&jsonl_path),
        bracket(5.0, 2.0),
    )
    .with_loss_filter(restored);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let summary = monitor.run(stop_rx).await;

    assert_eq!(summary.opened, 0);
    assert!(!monitor.gate().is_open());
    assert_eq!(JsonlTradeLog::new(&jsonl_path).load_all().await.unwrap().len(), 2);
}
