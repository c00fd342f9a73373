/// Monitor loop: poll, classify, debounce, dispatch
///
/// One long-lived loop task plus a signal-listener task that turns
/// ControlSignal values into the shared paused/stopped flags. Trade dispatch
/// runs inline, so the loop never samples while a trade is in flight.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use super::executor::TradeExecutor;
use super::gate::{ControlSignal, ExecutionGate, OpenPosition, OpenRequest, TradeAction, Transition};
use super::loss_filter::{LossFilter, TradeFingerprint};
use super::price_feed::{fetch_candles_with_retry, fetch_ticker_with_retry, PriceFeed, RetryPolicy};
use crate::config::{MonitorSettings, SettingsStore};
use crate::indicators::{calculate_market_pressure, MovingAverageSet, DEFAULT_WINDOWS};
use crate::models::{ExitReason, MaSnapshot, TradeKind, TradeRecord, TradeStatus};
use crate::persistence::TradeLog;
use crate::regime::{classify, ConditionTracker, MarketCondition, TrendStrength};

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub symbol: String,
    pub interval: String,
    pub windows: Vec<usize>,
    pub candle_limit: usize,
    pub cycle_interval: Duration,
    pub pause_poll: Duration,
    pub retry: RetryPolicy,
    /// Stop after this many sampling cycles; paused polls do not count
    pub max_cycles: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            windows: DEFAULT_WINDOWS.to_vec(),
            candle_limit: 200,
            cycle_interval: Duration::from_secs(1),
            pause_poll: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            max_cycles: None,
        }
    }
}

impl MonitorConfig {
    pub fn from_settings(settings: &MonitorSettings) -> Self {
        Self {
            symbol: settings.symbol.clone(),
            interval: settings.interval.clone(),
            windows: settings.windows.clone(),
            candle_limit: settings.candle_limit,
            cycle_interval: Duration::from_millis(settings.cycle_interval_ms),
            pause_poll: Duration::from_millis(settings.pause_poll_ms),
            retry: RetryPolicy::new(
                settings.retry_attempts,
                Duration::from_millis(settings.retry_delay_ms),
            ),
            max_cycles: None,
        }
    }

    fn largest_window(&self) -> usize {
        self.windows.iter().copied().max().unwrap_or(0)
    }
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Paused,
    FeedUnavailable,
    InsufficientHistory { have: usize, need: usize },
    /// Classified; nothing to trade
    Observed {
        condition: MarketCondition,
        strength: TrendStrength,
    },
    /// Position open, price between thresholds
    Holding { price: f64 },
    Opened(OpenPosition),
    Closed {
        trade_id: Uuid,
        reason: ExitReason,
        realized_pnl: f64,
    },
    Blocked(String),
    ExecutionFailed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorSummary {
    pub cycles: u64,
    pub opened: u64,
    pub closed: u64,
    pub skipped: u64,
    pub execution_failures: u64,
    pub realized_pnl: f64,
}

impl MonitorSummary {
    fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Opened(_) => self.opened += 1,
            CycleOutcome::Closed { realized_pnl, .. } => {
                self.closed += 1;
                self.realized_pnl += realized_pnl;
            }
            CycleOutcome::FeedUnavailable | CycleOutcome::InsufficientHistory { .. } => {
                self.skipped += 1
            }
            CycleOutcome::ExecutionFailed(_) => self.execution_failures += 1,
            _ => {}
        }
    }
}

/// Paused/stopped flags, set by the signal listener; `run` clears `stopped` on entry
#[derive(Debug, Default)]
pub struct ControlFlags {
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl ControlFlags {
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn apply(&self, signal: ControlSignal) {
        tracing::debug!(?signal, "Control signal");
        match signal {
            ControlSignal::Pause => self.paused.store(true, Ordering::Release),
            ControlSignal::Resume => self.paused.store(false, Ordering::Release),
            ControlSignal::Stop => self.stopped.store(true, Ordering::Release),
        }
    }
}

/// Drain control signals until shut down; hands the receiver back
async fn listen(
    mut signals: mpsc::UnboundedReceiver<ControlSignal>,
    flags: Arc<ControlFlags>,
    mut shutdown: oneshot::Receiver<()>,
) -> mpsc::UnboundedReceiver<ControlSignal> {
    loop {
        tokio::select! {
            biased;
            signal = signals.recv() => match signal {
                Some(signal) => flags.apply(signal),
                None => break,
            },
            _ = &mut shutdown => break,
        }
    }
    signals
}

pub struct MonitorLoop<F, E, L, S> {
    config: MonitorConfig,
    feed: F,
    executor: E,
    trade_log: L,
    settings: S,
    tracker: Arc<ConditionTracker>,
    gate: Arc<ExecutionGate>,
    flags: Arc<ControlFlags>,
    signals: Option<mpsc::UnboundedReceiver<ControlSignal>>,
    loss_filter: LossFilter,
}

impl<F, E, L, S> MonitorLoop<F, E, L, S>
where
    F: PriceFeed,
    E: TradeExecutor,
    L: TradeLog,
    S: SettingsStore,
{
    pub fn new(config: MonitorConfig, feed: F, executor: E, trade_log: L, settings: S) -> Self {
        let (gate, signals) = ExecutionGate::new();
        Self {
            config,
            feed,
            executor,
            trade_log,
            settings,
            tracker: Arc::new(ConditionTracker::new()),
            gate: Arc::new(gate),
            flags: Arc::new(ControlFlags::default()),
            signals: Some(signals),
            loss_filter: LossFilter::new(),
        }
    }

    /// Start from previously recorded losses instead of an empty filter
    pub fn with_loss_filter(mut self, loss_filter: LossFilter) -> Self {
        self.loss_filter = loss_filter;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn tracker(&self) -> Arc<ConditionTracker> {
        self.tracker.clone()
    }

    pub fn gate(&self) -> Arc<ExecutionGate> {
        self.gate.clone()
    }

    pub fn flags(&self) -> Arc<ControlFlags> {
        self.flags.clone()
    }

    pub fn loss_filter(&self) -> &LossFilter {
        &self.loss_filter
    }

    /// Run cycles until stopped or `max_cycles` is reached
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> MonitorSummary {
        let mut summary = MonitorSummary::default();
        self.flags.stopped.store(false, Ordering::Release);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let listener = self
            .signals
            .take()
            .map(|signals| tokio::spawn(listen(signals, self.flags.clone(), shutdown_rx)));

        tracing::info!(
            symbol = %self.config.symbol,
            interval = %self.config.interval,
            "Monitor started"
        );

        let mut stop_open = true;
        loop {
            if *stop.borrow() || self.flags.is_stopped() {
                tracing::info!("Stop signal received");
                break;
            }
            if self
                .config
                .max_cycles
                .is_some_and(|max| summary.cycles >= max)
            {
                tracing::info!(cycles = summary.cycles, "Cycle limit reached");
                break;
            }

            let outcome = self.run_cycle().await;
            let delay = if outcome == CycleOutcome::Paused {
                self.config.pause_poll
            } else {
                summary.record(&outcome);
                self.config.cycle_interval
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = stop.changed(), if stop_open => {
                    if changed.is_err() {
                        stop_open = false;
                    }
                }
            }
        }

        let _ = shutdown_tx.send(());
        if let Some(listener) = listener {
            match listener.await {
                Ok(signals) => self.signals = Some(signals),
                Err(e) => tracing::error!(error = %e, "Signal listener failed"),
            }
        }

        tracing::info!(
            cycles = summary.cycles,
            opened = summary.opened,
            closed = summary.closed,
            pnl = summary.realized_pnl,
            "Monitor stopped"
        );
        summary
    }

    /// One poll-classify-act pass
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.flags.is_paused() {
            tracing::debug!("Monitor paused, waiting for resume");
            return CycleOutcome::Paused;
        }

        let config = &self.config;
        let candles = match fetch_candles_with_retry(
            &self.feed,
            &config.retry,
            &config.symbol,
            &config.interval,
            config.candle_limit,
        )
        .await
        {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!(symbol = %config.symbol, error = %e, "Skipping cycle");
                return CycleOutcome::FeedUnavailable;
            }
        };

        let pressure = calculate_market_pressure(&candles);
        tracing::debug!(
            bullish_avg = pressure.bullish_avg,
            bearish_avg = pressure.bearish_avg,
            "Market pressure"
        );

        let averages = MovingAverageSet::compute(&candles, &config.windows);
        let Some(mas) = ma_snapshot(&averages) else {
            let need = config.largest_window();
            tracing::warn!(
                have = candles.len(),
                need,
                missing = ?averages.missing(),
                "Insufficient history, skipping cycle"
            );
            return CycleOutcome::InsufficientHistory {
                have: candles.len(),
                need,
            };
        };

        // A failed ticker skips the cycle rather than trading against 0.0
        let price = match fetch_ticker_with_retry(&self.feed, &config.retry, &config.symbol).await {
            Ok(ticker) if ticker.last_price.is_finite() && ticker.last_price > 0.0 => {
                ticker.last_price
            }
            Ok(ticker) => {
                tracing::warn!(price = ticker.last_price, "Unusable ticker price, skipping cycle");
                return CycleOutcome::FeedUnavailable;
            }
            Err(e) => {
                tracing::warn!(symbol = %config.symbol, error = %e, "Skipping cycle");
                return CycleOutcome::FeedUnavailable;
            }
        };

        let (condition, strength) = classify(price, mas.ma5, mas.ma7, mas.ma21, mas.ma200);
        let snapshot = self.tracker.set_condition(condition);

        tracing::debug!(
            price,
            ma5 = mas.ma5,
            ma7 = mas.ma7,
            ma21 = mas.ma21,
            ma200 = mas.ma200,
            %condition,
            ?strength,
            "Cycle classified"
        );
        if snapshot.changed() {
            tracing::info!(
                symbol = %config.symbol,
                previous = %snapshot.previous,
                current = %snapshot.current,
                ?strength,
                "Regime changed"
            );
        }

        if let Some(position) = self.gate.position() {
            return match position.thresholds.evaluate(price) {
                Some(reason) => self.close(position, reason, condition, mas).await,
                None => CycleOutcome::Holding { price },
            };
        }

        if !snapshot.is_entry_signal() {
            return CycleOutcome::Observed {
                condition,
                strength,
            };
        }
        let Some(direction) = condition.direction() else {
            return CycleOutcome::Observed {
                condition,
                strength,
            };
        };

        let trade = match self.settings.trade_settings() {
            Ok(trade) => trade,
            Err(e) => {
                tracing::warn!(error = %e, "Trade settings unavailable");
                return CycleOutcome::Blocked(format!("settings unavailable: {}", e));
            }
        };
        let kind = trade.kind_for(direction);

        if !self
            .tracker
            .can_execute(kind, trade.amount, trade.limit_price)
        {
            tracing::warn!(trade = %kind, regime = %condition, "Trade not permitted");
            return CycleOutcome::Blocked(format!("{} not permitted in {}", kind, condition));
        }

        let fingerprint = TradeFingerprint::new(kind, price, &mas);
        if self.loss_filter.is_blocked(&fingerprint) {
            tracing::warn!(trade = %kind, "Entry matches a previous losing trade");
            return CycleOutcome::Blocked("matches previous losing entry".to_string());
        }

        let request = OpenRequest {
            kind,
            amount: trade.amount,
            limit_price: trade.limit_price,
            return_percentage: trade.return_percentage,
            loss_risk_percentage: trade.loss_risk_percentage,
            regime: condition,
            mas,
        };

        tracing::info!(symbol = %self.config.symbol, trade = %kind, price, "Dispatching open");
        match self.gate.dispatch(&self.executor, TradeAction::Open(request)).await {
            Ok(Transition::Opened(position)) => {
                let record = self.trade_record(
                    position.trade_id,
                    position.kind,
                    position.entry_price,
                    TradeStatus::Opened,
                    condition,
                    &mas,
                );
                self.log_trade(record).await;
                CycleOutcome::Opened(position)
            }
            Ok(Transition::Blocked(reason)) => CycleOutcome::Blocked(reason),
            Ok(other) => CycleOutcome::Blocked(format!("unexpected transition {:?}", other)),
            Err(e) => CycleOutcome::ExecutionFailed(e.to_string()),
        }
    }

    async fn close(
        &mut self,
        position: OpenPosition,
        reason: ExitReason,
        condition: MarketCondition,
        mas: MaSnapshot,
    ) -> CycleOutcome {
        tracing::info!(
            trade_id = %position.trade_id,
            ?reason,
            "Close threshold crossed, dispatching close"
        );

        match self
            .gate
            .dispatch(&self.executor, TradeAction::Close { reason })
            .await
        {
            Ok(Transition::Closed {
                position,
                fill_price,
                reason,
                realized_pnl,
                outcome,
            }) => {
                if outcome == ExitReason::Loss {
                    self.loss_filter.record_loss(TradeFingerprint::new(
                        position.kind,
                        position.entry_price,
                        &position.mas,
                    ));
                }

                let mut record = self.trade_record(
                    position.trade_id,
                    position.kind,
                    fill_price,
                    TradeStatus::Closed,
                    condition,
                    &mas,
                );
                record.exit_reason = Some(reason);
                record.realized_pnl = Some(realized_pnl);
                self.log_trade(record).await;

                CycleOutcome::Closed {
                    trade_id: position.trade_id,
                    reason,
                    realized_pnl,
                }
            }
            Ok(Transition::Blocked(reason)) => CycleOutcome::Blocked(reason),
            Ok(other) => CycleOutcome::Blocked(format!("unexpected transition {:?}", other)),
            Err(e) => CycleOutcome::ExecutionFailed(e.to_string()),
        }
    }

    fn trade_record(
        &self,
        trade_id: Uuid,
        kind: TradeKind,
        fill_price: f64,
        status: TradeStatus,
        regime: MarketCondition,
        mas: &MaSnapshot,
    ) -> TradeRecord {
        TradeRecord {
            trade_id,
            symbol: self.config.symbol.clone(),
            interval: self.config.interval.clone(),
            trade_type: kind,
            fill_price,
            status,
            regime,
            ma5: mas.ma5,
            ma7: mas.ma7,
            ma21: mas.ma21,
            ma200: mas.ma200,
            timestamp: Utc::now(),
            exit_reason: None,
            realized_pnl: None,
        }
    }

    async fn log_trade(&self, record: TradeRecord) {
        if let Err(e) = self.trade_log.record(&record).await {
            tracing::warn!(trade_id = %record.trade_id, error = %e, "Failed to log trade");
        }
    }
}

impl<F, E, L, S> MonitorLoop<F, E, L, S>
where
    F: PriceFeed + 'static,
    E: TradeExecutor + 'static,
    L: TradeLog + 'static,
    S: SettingsStore + 'static,
{
    /// Start the loop on the runtime and return its lifecycle handle
    pub fn spawn(mut self) -> MonitorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let gate = self.gate();
        let tracker = self.tracker();

        let task = tokio::spawn(async move { self.run(stop_rx).await });

        MonitorHandle {
            stop: stop_tx,
            task,
            gate,
            tracker,
        }
    }
}

/// Owner's side of a spawned monitor
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<MonitorSummary>,
    gate: Arc<ExecutionGate>,
    tracker: Arc<ConditionTracker>,
}

impl MonitorHandle {
    /// Signal stop and wait for the current cycle to finish
    pub async fn stop(self) -> Result<MonitorSummary, JoinError> {
        let _ = self.stop.send(true);
        self.task.await
    }

    /// Wait for the loop to end by itself
    pub async fn join(self) -> Result<MonitorSummary, JoinError> {
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn gate(&self) -> Arc<ExecutionGate> {
        self.gate.clone()
    }

    pub fn tracker(&self) -> Arc<ConditionTracker> {
        self.tracker.clone()
    }
}

/// The four averages the classifier reads, if all are present
pub fn ma_snapshot(averages: &MovingAverageSet) -> Option<MaSnapshot> {
    if !averages.is_complete() {
        return None;
    }
    Some(MaSnapshot {
        ma5: averages.get(5)?,
        ma7: averages.get(7)?,
        ma21: averages.get(21)?,
        ma200: averages.get(200)?,
    })
}
