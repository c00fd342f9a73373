use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BotError;
use crate::models::{PricePoint, Ticker};
use crate::Result;

/// Market data source consumed by the monitor loop
pub trait PriceFeed: Send + Sync {
    /// Candles for `symbol`, oldest first
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PricePoint>>> + Send;

    fn fetch_ticker(&self, symbol: &str) -> impl Future<Output = Result<Ticker>> + Send;
}

impl<T: PriceFeed> PriceFeed for Arc<T> {
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<PricePoint>>> + Send {
        (**self).fetch_candles(symbol, interval, limit)
    }

    fn fetch_ticker(&self, symbol: &str) -> impl Future<Output = Result<Ticker>> + Send {
        (**self).fetch_ticker(symbol)
    }
}

/// Retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    async fn backoff(&self, what: &str, attempt: u32, error: &BotError) {
        tracing::warn!(
            "{} failed: {}, retrying in {:?} (attempt {}/{})",
            what,
            error,
            self.delay,
            attempt,
            self.attempts
        );
        tokio::time::sleep(self.delay).await;
    }

    fn exhausted(&self, what: &str, error: BotError) -> BotError {
        BotError::FeedUnavailable(format!(
            "{} failed after {} attempts: {}",
            what, self.attempts, error
        ))
    }
}

/// Fetch candles under the retry policy
///
/// The last error is reported as `FeedUnavailable`.
pub async fn fetch_candles_with_retry<F: PriceFeed>(
    feed: &F,
    policy: &RetryPolicy,
    symbol: &str,
    interval: &str,
    limit: usize,
) -> Result<Vec<PricePoint>> {
    let mut attempt = 1;
    loop {
        match feed.fetch_candles(symbol, interval, limit).await {
            Ok(candles) => return Ok(candles),
            Err(e) if attempt < policy.attempts => {
                policy.backoff("fetch candles", attempt, &e).await;
                attempt += 1;
            }
            Err(e) => return Err(policy.exhausted("fetch candles", e)),
        }
    }
}

/// Fetch the ticker under the retry policy
pub async fn fetch_ticker_with_retry<F: PriceFeed>(
    feed: &F,
    policy: &RetryPolicy,
    symbol: &str,
) -> Result<Ticker> {
    let mut attempt = 1;
    loop {
        match feed.fetch_ticker(symbol).await {
            Ok(ticker) => return Ok(ticker),
            Err(e) if attempt < policy.attempts => {
                policy.backoff("fetch ticker", attempt, &e).await;
                attempt += 1;
            }
            Err(e) => return Err(policy.exhausted("fetch ticker", e)),
        }
    }
}
