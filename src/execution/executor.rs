use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::price_feed::PriceFeed;
use crate::error::BotError;
use crate::models::Direction;
use crate::Result;

/// Places and closes orders; returns the fill price
///
/// Calls are attempted once per signal. The gate never retries a failure.
pub trait TradeExecutor: Send + Sync {
    fn open(
        &self,
        direction: Direction,
        amount: f64,
        limit_price: Option<f64>,
    ) -> impl Future<Output = Result<f64>> + Send;

    /// Close the open position held in `direction`
    fn close(&self, direction: Direction) -> impl Future<Output = Result<f64>> + Send;
}

impl<T: TradeExecutor> TradeExecutor for Arc<T> {
    fn open(
        &self,
        direction: Direction,
        amount: f64,
        limit_price: Option<f64>,
    ) -> impl Future<Output = Result<f64>> + Send {
        (**self).open(direction, amount, limit_price)
    }

    fn close(&self, direction: Direction) -> impl Future<Output = Result<f64>> + Send {
        (**self).close(direction)
    }
}

/// Simulated fills at the feed's last price
///
/// Limit orders fill at their limit price.
pub struct PaperExecutor<F> {
    feed: F,
    symbol: String,
}

impl<F: PriceFeed> PaperExecutor<F> {
    pub fn new(feed: F, symbol: impl Into<String>) -> Self {
        Self {
            feed,
            symbol: symbol.into(),
        }
    }

    async fn last_price(&self) -> Result<f64> {
        let ticker = self
            .feed
            .fetch_ticker(&self.symbol)
            .await
            .map_err(|e| BotError::ExecutionFailure(format!("no fill price: {}", e)))?;
        Ok(ticker.last_price)
    }
}

impl<F: PriceFeed> TradeExecutor for PaperExecutor<F> {
    async fn open(&self, direction: Direction, amount: f64, limit_price: Option<f64>) -> Result<f64> {
        let fill = match limit_price {
            Some(limit) => limit,
            None => self.last_price().await?,
        };
        tracing::info!(symbol = %self.symbol, %direction, amount, fill, "Paper open filled");
        Ok(fill)
    }

    async fn close(&self, direction: Direction) -> Result<f64> {
        let fill = self.last_price().await?;
        tracing::info!(symbol = %self.symbol, %direction, fill, "Paper close filled");
        Ok(fill)
    }
}

#[derive(Debug, Serialize)]
struct OpenOrderRequest<'a> {
    symbol: &'a str,
    direction: Direction,
    amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_price: Option<f64>,
}

#[derive(Debug, Serialize)]
struct CloseOrderRequest<'a> {
    symbol: &'a str,
    direction: Direction,
}

#[derive(Debug, Deserialize)]
struct FillResponse {
    fill_price: f64,
}

/// Forwards orders to an external execution bridge over HTTP
#[derive(Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: String,
    symbol: String,
}

impl HttpExecutor {
    pub fn new(base_url: impl Into<String>, symbol: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol: symbol.into(),
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<f64> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BotError::ExecutionFailure(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::ExecutionFailure(format!(
                "bridge error ({}): {}",
                status, error_text
            )));
        }

        let fill: FillResponse = response
            .json()
            .await
            .map_err(|e| BotError::ExecutionFailure(format!("invalid fill response: {}", e)))?;

        if !fill.fill_price.is_finite() || fill.fill_price <= 0.0 {
            return Err(BotError::ExecutionFailure(format!(
                "bridge reported unusable fill price {}",
                fill.fill_price
            )));
        }

        Ok(fill.fill_price)
    }
}

impl TradeExecutor for HttpExecutor {
    async fn open(&self, direction: Direction, amount: f64, limit_price: Option<f64>) -> Result<f64> {
        let request = OpenOrderRequest {
            symbol: &self.symbol,
            direction,
            amount,
            limit_price,
        };
        self.post("/order/open", &request).await
    }

    async fn close(&self, direction: Direction) -> Result<f64> {
        let request = CloseOrderRequest {
            symbol: &self.symbol,
            direction,
        };
        self.post("/order/close", &request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PricePoint, Ticker};
    use mockito::Matcher;
    use serde_json::json;

    struct FixedFeed(f64);

    impl PriceFeed for FixedFeed {
        async fn fetch_candles(&self, _: &str, _: &str, _: usize) -> Result<Vec<PricePoint>> {
            Ok(Vec::new())
        }

        async fn fetch_ticker(&self, _: &str) -> Result<Ticker> {
            Ok(Ticker {
                last_price: self.0,
                high_price: self.0,
                low_price: self.0,
            })
        }
    }

    #[tokio::test]
    async fn test_paper_fills_at_last_price() {
        let executor = PaperExecutor::new(FixedFeed(250.0), "BTCUSDT");
        assert_eq!(executor.open(Direction::Buy, 1.0, None).await.unwrap(), 250.0);
        assert_eq!(executor.open(Direction::Sell, 1.0, Some(255.0)).await.unwrap(), 255.0);
        assert_eq!(executor.close(Direction::Buy).await.unwrap(), 250.0);
    }

    #[tokio::test]
    async fn test_http_open_posts_order() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/order/open")
            .match_body(Matcher::PartialJson(json!({
                "symbol": "BTCUSDT",
                "direction": "buy",
                "amount": 0.5
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"fill_price": 101.25}"#)
            .create_async()
            .await;

        let executor = HttpExecutor::new(server.url(), "BTCUSDT").unwrap();
        let fill = executor.open(Direction::Buy, 0.5, None).await.unwrap();

        assert_eq!(fill, 101.25);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_close_posts_direction() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/order/close")
            .match_body(Matcher::Json(json!({
                "symbol": "ETHUSDT",
                "direction": "sell"
            })))
            .with_status(200)
            .with_body(r#"{"fill_price": 99.0}"#)
            .create_async()
            .await;

        let executor = HttpExecutor::new(format!("{}/", server.url()), "ETHUSDT").unwrap();
        assert_eq!(executor.close(Direction::Sell).await.unwrap(), 99.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_is_execution_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/order/open")
            .with_status(503)
            .with_body("terminal offline")
            .create_async()
            .await;

        let executor = HttpExecutor::new(server.url(), "BTCUSDT").unwrap();
        let result = executor.open(Direction::Buy, 1.0, None).await;

        match result {
            Err(BotError::ExecutionFailure(msg)) => assert!(msg.contains("terminal offline")),
            other => panic!("expected execution failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_rejects_zero_fill() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/order/close")
            .with_status(200)
            .with_body(r#"{"fill_price": 0.0}"#)
            .create_async()
            .await;

        let executor = HttpExecutor::new(server.url(), "BTCUSDT").unwrap();
        tokio_test::assert_err!(executor.close(Direction::Buy).await);
    }
}
