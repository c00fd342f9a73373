use std::sync::{Mutex, MutexGuard};

use super::MarketCondition;
use crate::models::TradeKind;

/// Current and previous regime, always read as a consistent pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionSnapshot {
    pub current: MarketCondition,
    pub previous: MarketCondition,
}

impl ConditionSnapshot {
    /// Regime observed on two consecutive samples
    pub fn is_persistent(&self) -> bool {
        self.current == self.previous
    }

    pub fn changed(&self) -> bool {
        !self.is_persistent()
    }

    /// Whether this pair confirms an entry in the current regime's direction
    ///
    /// A directional regime that persisted, or one of the confirmed reversals
    /// into it. Neutral never confirms.
    pub fn is_entry_signal(&self) -> bool {
        use MarketCondition::*;

        match (self.previous, self.current) {
            (_, Neutral) => false,
            (prev, cur) if prev == cur => true,
            (Shortbull, Bullish) | (Longbear, Bullish) => true,
            (Bearish, Shortbull) => true,
            (Longbear, Bearish) | (Shortbull, Bearish) => true,
            (Bullish, Longbear) => true,
            _ => false,
        }
    }
}

impl Default for ConditionSnapshot {
    fn default() -> Self {
        Self {
            current: MarketCondition::Neutral,
            previous: MarketCondition::Neutral,
        }
    }
}

/// Thread-safe holder of the regime snapshot
///
/// All reads and writes go through one mutex, so snapshots are linearizable.
#[derive(Debug, Default)]
pub struct ConditionTracker {
    snapshot: Mutex<ConditionSnapshot>,
}

impl ConditionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shift current into previous and store the new regime
    ///
    /// Returns the snapshot as it stands after the update.
    pub fn set_condition(&self, condition: MarketCondition) -> ConditionSnapshot {
        let mut snapshot = self.lock();
        tracing::debug!(
            current = %snapshot.current,
            previous = %snapshot.previous,
            "Condition before update"
        );

        snapshot.previous = snapshot.current;
        snapshot.current = condition;

        tracing::debug!(
            current = %snapshot.current,
            previous = %snapshot.previous,
            "Condition updated"
        );
        *snapshot
    }

    pub fn snapshot(&self) -> ConditionSnapshot {
        *self.lock()
    }

    /// Debounce gate for a trade request
    ///
    /// A persisted regime admits any recognized kind; otherwise the kind
    /// must match the current regime's direction. Either way the amount must
    /// be positive and limit kinds need a limit price.
    pub fn can_execute(&self, kind: TradeKind, amount: f64, limit_price: Option<f64>) -> bool {
        let snapshot = self.snapshot();

        let direction_ok = if snapshot.is_persistent() {
            tracing::debug!(regime = %snapshot.current, trade = %kind, "Regime persisted");
            true
        } else {
            let allowed = allowed_kinds(snapshot.current);
            if !allowed.contains(&kind) {
                tracing::debug!(
                    regime = %snapshot.current,
                    trade = %kind,
                    "Trade kind not allowed in current regime"
                );
                return false;
            }
            true
        };

        if !(amount > 0.0) {
            tracing::debug!(amount, "Trade amount must be greater than zero");
            return false;
        }

        if kind.is_limit() && limit_price.is_none() {
            tracing::debug!(trade = %kind, "Limit price required for limit trades");
            return false;
        }

        direction_ok
    }

    // A poisoned lock still holds a valid pair of Copy values
    fn lock(&self) -> MutexGuard<'_, ConditionSnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Trade kinds permitted by a regime regardless of persistence
pub fn allowed_kinds(condition: MarketCondition) -> &'static [TradeKind] {
    match condition {
        MarketCondition::Bullish | MarketCondition::Shortbull => {
            &[TradeKind::MarketBuy, TradeKind::LimitBuy]
        }
        MarketCondition::Bearish | MarketCondition::Longbear => {
            &[TradeKind::MarketSell, TradeKind::LimitSell]
        }
        MarketCondition::Neutral => &[],
    }
}
