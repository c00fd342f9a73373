use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::BotError;
use crate::execution::PriceFeed;
use crate::models::{MarketType, PricePoint, Ticker};
use crate::Result;

const SPOT_HOST: &str = "https://api.binance.com";
const FUTURES_HOST: &str = "https://fapi.binance.com";
const RATE_LIMIT_RPS: u32 = 10; // well under the 1200 weight/min public limit

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Public market-data client for Binance spot and USD-M futures
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

/// Response from /ticker/24hr
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    high_price: String,
    low_price: String,
}

impl BinanceClient {
    pub fn new(market_type: MarketType) -> Result<Self> {
        let host = match market_type {
            MarketType::Spot => SPOT_HOST,
            MarketType::Futures => FUTURES_HOST,
        };
        Self::with_base_url(market_type, host)
    }

    /// Client against a custom host, e.g. a mock server
    pub fn with_base_url(market_type: MarketType, host: impl AsRef<str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        let prefix = match market_type {
            MarketType::Spot => "/api/v3",
            MarketType::Futures => "/fapi/v1",
        };

        let quota = Quota::per_second(NonZeroU32::new(RATE_LIMIT_RPS).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: format!("{}{}", host.as_ref().trim_end_matches('/'), prefix),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| BotError::FeedUnavailable(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::FeedUnavailable(format!(
                "Binance API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    pub async fn get_klines(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<PricePoint>> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .get("/klines", &query)
            .await?
            .json()
            .await
            .map_err(|e| BotError::FeedUnavailable(format!("invalid klines response: {}", e)))?;

        let candles = rows.iter().map(|row| parse_kline(row)).collect::<Result<Vec<_>>>()?;

        tracing::debug!(symbol, interval, count = candles.len(), "Fetched klines");
        Ok(candles)
    }

    pub async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let query = [("symbol", symbol.to_string())];
        let raw: Ticker24h = self
            .get("/ticker/24hr", &query)
            .await?
            .json()
            .await
            .map_err(|e| BotError::FeedUnavailable(format!("invalid ticker response: {}", e)))?;

        Ok(Ticker {
            last_price: parse_price(&raw.last_price, "lastPrice")?,
            high_price: parse_price(&raw.high_price, "highPrice")?,
            low_price: parse_price(&raw.low_price, "lowPrice")?,
        })
    }
}

impl PriceFeed for BinanceClient {
    async fn fetch_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<PricePoint>> {
        self.get_klines(symbol, interval, limit).await
    }

    async fn fetch_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.get_ticker(symbol).await
    }
}

/// Kline row: [open_time, open, high, low, close, volume, close_time, ...]
fn parse_kline(row: &[serde_json::Value]) -> Result<PricePoint> {
    if row.len() < 6 {
        return Err(BotError::FeedUnavailable(format!(
            "kline row has {} fields, expected at least 6",
            row.len()
        )));
    }

    let open_time = row[0]
        .as_i64()
        .ok_or_else(|| BotError::FeedUnavailable("kline open time is not an integer".to_string()))?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(open_time)
        .ok_or_else(|| BotError::FeedUnavailable(format!("kline open time {} out of range", open_time)))?;

    let field = |index: usize, name: &str| -> Result<f64> {
        match &row[index] {
            serde_json::Value::String(s) => parse_price(s, name),
            serde_json::Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| BotError::FeedUnavailable(format!("kline {} is not a float", name))),
            other => Err(BotError::FeedUnavailable(format!(
                "kline {} has unexpected value {}",
                name, other
            ))),
        }
    };

    Ok(PricePoint {
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}

fn parse_price(value: &str, name: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .map_err(|e| BotError::FeedUnavailable(format!("{} '{}' is not a number: {}", name, value, e)))
}
