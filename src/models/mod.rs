use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BotError;
use crate::regime::MarketCondition;

/// OHLCV candlestick as returned by the price feed (oldest first)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 24h ticker summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub last_price: f64,
    pub high_price: f64,
    pub low_price: f64,
}

/// Which venue the symbol trades on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    #[default]
    Spot,
    Futures,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
}

/// The four recognized trade kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    MarketBuy,
    LimitBuy,
    MarketSell,
    LimitSell,
}

impl TradeKind {
    pub fn new(direction: Direction, order_type: OrderType) -> Self {
        match (direction, order_type) {
            (Direction::Buy, OrderType::Market) => TradeKind::MarketBuy,
            (Direction::Buy, OrderType::Limit) => TradeKind::LimitBuy,
            (Direction::Sell, OrderType::Market) => TradeKind::MarketSell,
            (Direction::Sell, OrderType::Limit) => TradeKind::LimitSell,
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            TradeKind::MarketBuy | TradeKind::LimitBuy => Direction::Buy,
            TradeKind::MarketSell | TradeKind::LimitSell => Direction::Sell,
        }
    }

    pub fn is_limit(&self) -> bool {
        matches!(self, TradeKind::LimitBuy | TradeKind::LimitSell)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::MarketBuy => "market_buy",
            TradeKind::LimitBuy => "limit_buy",
            TradeKind::MarketSell => "market_sell",
            TradeKind::LimitSell => "limit_sell",
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeKind {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "market_buy" => Ok(TradeKind::MarketBuy),
            "limit_buy" => Ok(TradeKind::LimitBuy),
            "market_sell" => Ok(TradeKind::MarketSell),
            "limit_sell" => Ok(TradeKind::LimitSell),
            other => Err(BotError::InvalidSetting(format!(
                "unrecognized trade kind '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    Opened,
    Closed,
}

/// Which close threshold was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Profit,
    Loss,
}

/// Moving averages captured alongside a trade event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaSnapshot {
    pub ma5: f64,
    pub ma7: f64,
    pub ma21: f64,
    pub ma200: f64,
}

/// One open or close event, emitted to the trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: Uuid,
    pub symbol: String,
    /// Candle interval the monitor was sampling
    #[serde(default)]
    pub interval: String,
    pub trade_type: TradeKind,
    pub fill_price: f64,
    pub status: TradeStatus,
    pub regime: MarketCondition,
    pub ma5: f64,
    pub ma7: f64,
    pub ma21: f64,
    pub ma200: f64,
    pub timestamp: DateTime<Utc>,
    /// Set on Closed records only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
    /// Set on Closed records only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<f64>,
}
