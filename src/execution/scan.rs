use super::monitor::ma_snapshot;
use super::price_feed::{fetch_candles_with_retry, fetch_ticker_with_retry, PriceFeed, RetryPolicy};
use crate::indicators::MovingAverageSet;
use crate::models::MaSnapshot;
use crate::regime::{classify, MarketCondition, TrendStrength};
use crate::Result;

/// Intervals covered by a full scan, shortest first
pub const SCAN_INTERVALS: [&str; 7] = ["1m", "5m", "15m", "30m", "1h", "4h", "1d"];

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalReading {
    pub interval: String,
    pub price: f64,
    pub condition: MarketCondition,
    pub strength: TrendStrength,
    pub mas: MaSnapshot,
}

/// Classify `symbol` on each interval against one ticker price
///
/// Intervals whose averages cannot all be computed are skipped. Fails only
/// if the ticker itself is unavailable.
pub async fn scan<F: PriceFeed>(
    feed: &F,
    retry: &RetryPolicy,
    symbol: &str,
    intervals: &[&str],
    windows: &[usize],
    limit: usize,
) -> Result<Vec<IntervalReading>> {
    let price = fetch_ticker_with_retry(feed, retry, symbol).await?.last_price;
    let mut readings = Vec::with_capacity(intervals.len());

    for &interval in intervals {
        let candles = match fetch_candles_with_retry(feed, retry, symbol, interval, limit).await {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!(symbol, interval, error = %e, "Skipping interval");
                continue;
            }
        };

        let averages = MovingAverageSet::compute(&candles, windows);
        let Some(mas) = ma_snapshot(&averages) else {
            tracing::warn!(symbol, interval, missing = ?averages.missing(), "Skipping interval due to missing MA values");
            continue;
        };

        let (condition, strength) = classify(price, mas.ma5, mas.ma7, mas.ma21, mas.ma200);
        tracing::info!(symbol, interval, %condition, ?strength, "Interval classified");

        readings.push(IntervalReading {
            interval: interval.to_string(),
            price,
            condition,
            strength,
            mas,
        });
    }

    Ok(readings)
}
