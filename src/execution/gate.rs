/// Single-position execution gate
///
/// Owns the Idle/Open state for one symbol and brackets every executor call
/// with Pause/Resume on the monitor's control channel.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::executor::TradeExecutor;
use crate::error::BotError;
use crate::models::{Direction, ExitReason, MaSnapshot, TradeKind};
use crate::regime::MarketCondition;
use crate::Result;

/// Signals consumed by the monitor's listener task, in send order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Idle,
    Open,
}

/// Profit and loss price levels for an open position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitThresholds {
    pub direction: Direction,
    pub profit: f64,
    pub loss: f64,
}

impl ExitThresholds {
    pub fn new(direction: Direction, entry_price: f64, return_pct: f64, loss_pct: f64) -> Self {
        let (profit, loss) = match direction {
            Direction::Buy => (
                entry_price * (1.0 + return_pct / 100.0),
                entry_price * (1.0 - loss_pct / 100.0),
            ),
            Direction::Sell => (
                entry_price * (1.0 - return_pct / 100.0),
                entry_price * (1.0 + loss_pct / 100.0),
            ),
        };
        Self {
            direction,
            profit,
            loss,
        }
    }

    /// Which threshold, if any, `price` has reached
    pub fn evaluate(&self, price: f64) -> Option<ExitReason> {
        match self.direction {
            Direction::Buy if price >= self.profit => Some(ExitReason::Profit),
            Direction::Buy if price <= self.loss => Some(ExitReason::Loss),
            Direction::Sell if price <= self.profit => Some(ExitReason::Profit),
            Direction::Sell if price >= self.loss => Some(ExitReason::Loss),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub trade_id: Uuid,
    pub kind: TradeKind,
    pub amount: f64,
    pub entry_price: f64,
    pub opened_at: DateTime<Utc>,
    pub regime: MarketCondition,
    pub mas: MaSnapshot,
    pub thresholds: ExitThresholds,
}

impl OpenPosition {
    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    /// Per-unit P&L at `price`
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.direction() {
            Direction::Buy => price - self.entry_price,
            Direction::Sell => self.entry_price - price,
        }
    }
}

/// Everything needed to open a position
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub kind: TradeKind,
    pub amount: f64,
    pub limit_price: Option<f64>,
    pub return_percentage: f64,
    pub loss_risk_percentage: f64,
    pub regime: MarketCondition,
    pub mas: MaSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Open(OpenRequest),
    /// Close the current position because `reason` was crossed
    Close { reason: ExitReason },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Opened(OpenPosition),
    Closed {
        position: OpenPosition,
        fill_price: f64,
        reason: ExitReason,
        realized_pnl: f64,
        /// Profit if the realized P&L is positive, otherwise Loss
        outcome: ExitReason,
    },
    Blocked(String),
}

/// Sends Pause on creation and Resume on drop
struct PauseGuard<'a> {
    gate: &'a ExecutionGate,
}

impl<'a> PauseGuard<'a> {
    fn new(gate: &'a ExecutionGate) -> Self {
        gate.request_pause();
        Self { gate }
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.gate.request_resume();
    }
}

/// Held for the duration of one dispatch
struct DispatchClaim<'a>(&'a AtomicBool);

impl<'a> DispatchClaim<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DispatchClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ExecutionGate {
    position: Mutex<Option<OpenPosition>>,
    dispatching: AtomicBool,
    signals: mpsc::UnboundedSender<ControlSignal>,
}

impl ExecutionGate {
    /// New idle gate plus the receiving end of its control channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Self {
            position: Mutex::new(None),
            dispatching: AtomicBool::new(false),
            signals: tx,
        };
        (gate, rx)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    pub fn state(&self) -> PositionState {
        if self.is_open() {
            PositionState::Open
        } else {
            PositionState::Idle
        }
    }

    pub fn position(&self) -> Option<OpenPosition> {
        self.lock().clone()
    }

    /// Idle -> Open; fails if a position is already held
    pub fn mark_open(&self, position: OpenPosition) -> Result<()> {
        let mut slot = self.lock();
        if let Some(existing) = slot.as_ref() {
            return Err(BotError::PositionAlreadyOpen(existing.trade_id.to_string()));
        }
        *slot = Some(position);
        Ok(())
    }

    /// Open -> Idle, returning the position that was held
    pub fn mark_closed(&self) -> Option<OpenPosition> {
        self.lock().take()
    }

    /// Drop any held position without trading
    pub fn reset(&self) {
        if let Some(position) = self.lock().take() {
            tracing::warn!(trade_id = %position.trade_id, "Position reset without close");
        }
    }

    pub fn request_pause(&self) {
        self.send(ControlSignal::Pause);
    }

    pub fn request_resume(&self) {
        self.send(ControlSignal::Resume);
    }

    pub fn request_stop(&self) {
        self.send(ControlSignal::Stop);
    }

    /// Handle for sending signals from outside the gate
    pub fn signal_sender(&self) -> mpsc::UnboundedSender<ControlSignal> {
        self.signals.clone()
    }

    /// Run one open or close through the executor
    ///
    /// Pause goes out before the executor call and Resume after it on every
    /// path. Executor errors are returned with the position left unchanged.
    pub async fn dispatch<E: TradeExecutor>(
        &self,
        executor: &E,
        action: TradeAction,
    ) -> Result<Transition> {
        let Some(_claim) = DispatchClaim::acquire(&self.dispatching) else {
            return Ok(Transition::Blocked("dispatch already in flight".to_string()));
        };

        match action {
            TradeAction::Open(request) => self.dispatch_open(executor, request).await,
            TradeAction::Close { reason } => self.dispatch_close(executor, reason).await,
        }
    }

    async fn dispatch_open<E: TradeExecutor>(
        &self,
        executor: &E,
        request: OpenRequest,
    ) -> Result<Transition> {
        if let Some(existing) = self.position() {
            return Ok(Transition::Blocked(format!(
                "position {} already open",
                existing.trade_id
            )));
        }

        let direction = request.kind.direction();
        let _pause = PauseGuard::new(self);

        let fill_price = executor
            .open(direction, request.amount, request.limit_price)
            .await
            .map_err(|e| {
                tracing::error!(trade = %request.kind, error = %e, "Open trade failed");
                e
            })?;

        let position = OpenPosition {
            trade_id: Uuid::new_v4(),
            kind: request.kind,
            amount: request.amount,
            entry_price: fill_price,
            opened_at: Utc::now(),
            regime: request.regime,
            mas: request.mas,
            thresholds: ExitThresholds::new(
                direction,
                fill_price,
                request.return_percentage,
                request.loss_risk_percentage,
            ),
        };

        self.mark_open(position.clone())?;

        tracing::info!(
            trade_id = %position.trade_id,
            trade = %position.kind,
            fill = fill_price,
            profit_at = position.thresholds.profit,
            loss_at = position.thresholds.loss,
            "Position opened"
        );

        Ok(Transition::Opened(position))
    }

    async fn dispatch_close<E: TradeExecutor>(
        &self,
        executor: &E,
        reason: ExitReason,
    ) -> Result<Transition> {
        let Some(position) = self.position() else {
            return Ok(Transition::Blocked("no open position".to_string()));
        };

        let _pause = PauseGuard::new(self);

        let fill_price = executor.close(position.direction()).await.map_err(|e| {
            tracing::error!(trade_id = %position.trade_id, error = %e, "Close trade failed");
            e
        })?;

        self.mark_closed();

        let realized_pnl = position.pnl_at(fill_price);
        let outcome = if realized_pnl > 0.0 {
            ExitReason::Profit
        } else {
            ExitReason::Loss
        };

        tracing::info!(
            trade_id = %position.trade_id,
            trade = %position.kind,
            entry = position.entry_price,
            fill = fill_price,
            pnl = realized_pnl,
            ?reason,
            ?outcome,
            "Position closed"
        );

        Ok(Transition::Closed {
            position,
            fill_price,
            reason,
            realized_pnl,
            outcome,
        })
    }

    fn send(&self, signal: ControlSignal) {
        if self.signals.send(signal).is_err() {
            tracing::debug!(?signal, "Control channel closed, signal dropped");
        }
    }

    // Poisoning cannot leave the slot half-written
    fn lock(&self) -> MutexGuard<'_, Option<OpenPosition>> {
        self.position
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
