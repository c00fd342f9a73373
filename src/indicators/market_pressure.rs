/// Candle-range pressure over the most recent closed candles
///
/// Compares how large bullish candles are relative to bearish ones.

use crate::models::PricePoint;

const SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketPressure {
    /// Mean high-low range of candles that closed above their open
    pub bullish_avg: f64,
    /// Mean high-low range of the remaining candles
    pub bearish_avg: f64,
}

/// Average candle size split by direction
///
/// Looks at the last 10 candles but skips the newest one, which is still
/// forming. Returns zeros when fewer than 10 candles are available.
pub fn calculate_market_pressure(candles: &[PricePoint]) -> MarketPressure {
    if candles.len() < SAMPLE_SIZE {
        return MarketPressure::default();
    }

    let start = candles.len() - SAMPLE_SIZE;
    let sample = &candles[start..candles.len() - 1];

    let mut bullish = Vec::new();
    let mut bearish = Vec::new();
    for candle in sample {
        let size = candle.high - candle.low;
        if candle.close > candle.open {
            bullish.push(size);
        } else {
            bearish.push(size);
        }
    }

    MarketPressure {
        bullish_avg: mean(&bullish),
        bearish_avg: mean(&bearish),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> PricePoint {
        PricePoint {
            timestamp: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_insufficient_candles() {
        let candles = vec![candle(100.0, 102.0, 99.0, 101.0); 9];
        assert_eq!(calculate_market_pressure(&candles), MarketPressure::default());
    }

    #[test]
    fn test_splits_by_direction_and_skips_newest() {
        let mut candles = Vec::new();
        // 5 bullish with range 4, 4 bearish with range 2
        for _ in 0..5 {
            candles.push(candle(100.0, 104.0, 100.0, 103.0));
        }
        for _ in 0..4 {
            candles.push(candle(103.0, 103.0, 101.0, 101.0));
        }
        // Newest candle is huge but must be ignored
        candles.push(candle(100.0, 200.0, 50.0, 190.0));

        let pressure = calculate_market_pressure(&candles);
        assert_eq!(pressure.bullish_avg, 4.0);
        assert_eq!(pressure.bearish_avg, 2.0);
    }

    #[test]
    fn test_uses_only_last_ten() {
        let mut candles = vec![candle(100.0, 150.0, 50.0, 140.0); 20];
        for _ in 0..10 {
            candles.push(candle(101.0, 102.0, 100.0, 101.0));
        }

        let pressure = calculate_market_pressure(&candles);
        assert_eq!(pressure.bullish_avg, 0.0);
        assert_eq!(pressure.bearish_avg, 2.0);
    }
}
