use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::error::BotError;
use crate::execution::PriceFeed;
use crate::models::{PricePoint, Ticker};
use crate::Result;

/// Walk parameters
#[derive(Debug, Clone, Copy)]
pub struct WalkParams {
    pub start_price: f64,
    /// Max relative move per candle
    pub volatility: f64,
    /// Relative drift per candle at the start
    pub drift: f64,
    /// Chance per candle that the drift changes sign
    pub flip_probability: f64,
    pub interval_minutes: i64,
}

impl Default for WalkParams {
    fn default() -> Self {
        Self {
            start_price: 100.0,
            volatility: 0.004,
            drift: 0.0008,
            flip_probability: 0.02,
            interval_minutes: 1,
        }
    }
}

struct WalkState {
    rng: StdRng,
    candles: Vec<PricePoint>,
    drift: f64,
    next_time: DateTime<Utc>,
}

/// Offline price feed driven by a seeded random walk
///
/// Every `fetch_candles` call closes one new candle; tickers report the
/// latest close without advancing.
pub struct RandomWalkFeed {
    params: WalkParams,
    state: Mutex<WalkState>,
}

impl RandomWalkFeed {
    /// Create a feed with `history` candles already generated
    pub fn new(seed: u64, params: WalkParams, history: usize) -> Self {
        let start = Utc::now() - Duration::minutes(history as i64 * params.interval_minutes);
        let mut state = WalkState {
            rng: StdRng::seed_from_u64(seed),
            candles: Vec::with_capacity(history),
            drift: params.drift,
            next_time: start,
        };

        for _ in 0..history {
            step(&mut state, &params);
        }

        Self {
            params,
            state: Mutex::new(state),
        }
    }

    /// Close one more candle
    pub fn advance(&self) -> Result<PricePoint> {
        let mut state = self.lock()?;
        Ok(step(&mut state, &self.params))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.candles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WalkState>> {
        self.state
            .lock()
            .map_err(|_| BotError::FeedUnavailable("random walk state poisoned".to_string()))
    }
}

fn step(state: &mut WalkState, params: &WalkParams) -> PricePoint {
    if state.rng.gen_bool(params.flip_probability.clamp(0.0, 1.0)) {
        state.drift = -state.drift;
    }

    let open = state
        .candles
        .last()
        .map(|c| c.close)
        .unwrap_or(params.start_price);
    let noise = state.rng.gen_range(-1.0..=1.0) * params.volatility;
    let close = (open * (1.0 + state.drift + noise)).max(0.01);

    let wick = state.rng.gen_range(0.0..=params.volatility) * open;
    let high = open.max(close) + wick;
    let low = (open.min(close) - wick).max(0.01);

    let candle = PricePoint {
        timestamp: state.next_time,
        open,
        high,
        low,
        close,
        volume: state.rng.gen_range(500.0..1500.0),
    };

    state.next_time += Duration::minutes(params.interval_minutes);
    state.candles.push(candle.clone());
    candle
}

impl PriceFeed for RandomWalkFeed {
    async fn fetch_candles(&self, _symbol: &str, _interval: &str, limit: usize) -> Result<Vec<PricePoint>> {
        let mut state = self.lock()?;
        step(&mut state, &self.params);

        let start = state.candles.len().saturating_sub(limit);
        Ok(state.candles[start..].to_vec())
    }

    async fn fetch_ticker(&self, _symbol: &str) -> Result<Ticker> {
        let state = self.lock()?;
        let recent = &state.candles[state.candles.len().saturating_sub(24)..];
        let last = recent
            .last()
            .ok_or_else(|| BotError::FeedUnavailable("random walk has no candles".to_string()))?;

        Ok(Ticker {
            last_price: last.close,
            high_price: recent.iter().map(|c| c.high).fold(f64::MIN, f64::max),
            low_price: recent.iter().map(|c| c.low).fold(f64::MAX, f64::min),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_walk() {
        let a = RandomWalkFeed::new(42, WalkParams::default(), 50);
        let b = RandomWalkFeed::new(42, WalkParams::default(), 50);
        assert_eq!(a.advance().unwrap().close, b.advance().unwrap().close);
    }

    #[test]
    fn test_candles_are_consistent() {
        let feed = RandomWalkFeed::new(7, WalkParams::default(), 300);
        let state = feed.state.lock().unwrap();

        for pair in state.candles.windows(2) {
            assert_eq!(pair[1].open, pair[0].close);
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
        for candle in &state.candles {
            assert!(candle.high >= candle.open.max(candle.close));
            assert!(candle.low <= candle.open.min(candle.close));
            assert!(candle.low > 0.0);
        }
    }

    #[test]
    fn test_empty_walk_has_no_ticker() {
        let feed = RandomWalkFeed::new(3, WalkParams::default(), 0);
        assert!(feed.is_empty());
        tokio_test::assert_err!(tokio_test::block_on(feed.fetch_ticker("SIM")));
    }

    #[tokio::test]
    async fn test_fetch_advances_and_limits() {
        let feed = RandomWalkFeed::new(1, WalkParams::default(), 210);

        let candles = feed.fetch_candles("SIM", "1m", 200).await.unwrap();
        assert_eq!(candles.len(), 200);
        assert_eq!(feed.len(), 211);

        let ticker = feed.fetch_ticker("SIM").await.unwrap();
        assert_eq!(ticker.last_price, candles[199].close);
        assert!(ticker.high_price >= ticker.last_price);
        assert_eq!(feed.len(), 211);
    }
}
