use std::collections::BTreeMap;

use crate::models::PricePoint;

/// Default windows tracked by the monitor
pub const DEFAULT_WINDOWS: [usize; 5] = [5, 7, 21, 150, 200];

/// Calculate Simple Moving Average (SMA) over the last `period` prices
///
/// Returns None when there are fewer than `period` prices or the mean is not finite
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    let mean = sum / period as f64;
    mean.is_finite().then_some(mean)
}

/// Latest rolling mean per window size
///
/// Recomputed from scratch every cycle; a window maps to None while the
/// series is shorter than the window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovingAverageSet {
    values: BTreeMap<usize, Option<f64>>,
}

impl MovingAverageSet {
    /// Compute the closing-price SMA of the last `window` points for each window
    pub fn compute(points: &[PricePoint], windows: &[usize]) -> Self {
        let closes: Vec<f64> = points.iter().map(|p| p.close).collect();

        let values = windows
            .iter()
            .map(|&window| (window, calculate_sma(&closes, window)))
            .collect();

        Self { values }
    }

    /// Value for a window, None if absent or never requested
    pub fn get(&self, window: usize) -> Option<f64> {
        self.values.get(&window).copied().flatten()
    }

    /// True when every requested window has a value
    pub fn is_complete(&self) -> bool {
        self.values.values().all(Option::is_some)
    }

    /// Windows that could not be computed
    pub fn missing(&self) -> Vec<usize> {
        self.values
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(w, _)| *w)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Option<f64>)> + '_ {
        self.values.iter().map(|(w, v)| (*w, *v))
    }
}
