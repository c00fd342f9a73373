use std::collections::{HashMap, HashSet};

use crate::models::{MaSnapshot, TradeKind, TradeRecord, TradeStatus};

/// Shape of the market at entry: trade kind plus each average's distance
/// from the price, in hundredths of a percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TradeFingerprint {
    pub kind: TradeKind,
    pub ma200: i64,
    pub ma21: i64,
    pub ma7: i64,
    pub ma5: i64,
}

impl TradeFingerprint {
    pub fn new(kind: TradeKind, price: f64, mas: &MaSnapshot) -> Self {
        Self {
            kind,
            ma200: distance(price, mas.ma200),
            ma21: distance(price, mas.ma21),
            ma7: distance(price, mas.ma7),
            ma5: distance(price, mas.ma5),
        }
    }
}

// Percent distance rounded to 2 dp, kept as an integer so it hashes exactly
fn distance(price: f64, ma: f64) -> i64 {
    if price == 0.0 {
        return 0;
    }
    ((ma - price) / price * 100.0 * 100.0).round() as i64
}

/// Remembers entry fingerprints of losing trades and blocks repeats
#[derive(Debug, Default)]
pub struct LossFilter {
    losses: HashSet<TradeFingerprint>,
}

impl LossFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a trade log
    ///
    /// Only trades on `symbol`/`interval` count. A trade is a loss when its
    /// Closed record has `realized_pnl <= 0`; the fingerprint comes from the
    /// matching Opened record's fill price and averages.
    pub fn from_records(records: &[TradeRecord], symbol: &str, interval: &str) -> Self {
        let relevant: Vec<&TradeRecord> = records
            .iter()
            .filter(|r| r.symbol == symbol && r.interval == interval)
            .collect();

        let opened: HashMap<_, _> = relevant
            .iter()
            .filter(|r| r.status == TradeStatus::Opened)
            .map(|r| (r.trade_id, *r))
            .collect();

        let mut filter = Self::new();
        for closed in relevant.iter().filter(|r| r.status == TradeStatus::Closed) {
            if !closed.realized_pnl.is_some_and(|pnl| pnl <= 0.0) {
                continue;
            }
            let Some(open) = opened.get(&closed.trade_id) else {
                tracing::debug!(trade_id = %closed.trade_id, "Losing close without an open record");
                continue;
            };
            let mas = MaSnapshot {
                ma5: open.ma5,
                ma7: open.ma7,
                ma21: open.ma21,
                ma200: open.ma200,
            };
            filter
                .losses
                .insert(TradeFingerprint::new(open.trade_type, open.fill_price, &mas));
        }

        tracing::info!(symbol, interval, losses = filter.len(), "Loss filter restored from trade log");
        filter
    }

    pub fn record_loss(&mut self, fingerprint: TradeFingerprint) {
        if self.losses.insert(fingerprint) {
            tracing::info!(?fingerprint, "Remembering losing entry");
        }
    }

    pub fn is_blocked(&self, fingerprint: &TradeFingerprint) -> bool {
        self.losses.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.losses.is_empty()
    }
}
