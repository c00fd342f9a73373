use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use regimebot::api::BinanceClient;
use regimebot::config::{
    ExecutorMode, FileSettingsStore, Settings, TradeLogSettings, DEFAULT_CONFIG_PATH,
};
use regimebot::execution::{
    scan, HttpExecutor, LossFilter, MonitorConfig, MonitorLoop, MonitorSummary, PaperExecutor,
    TradeExecutor, SCAN_INTERVALS,
};
use regimebot::persistence::{FanoutTradeLog, JsonlTradeLog, MemoryTradeLog, RedisTradeLog, TradeSink};
use regimebot::TradeRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "regimebot")]
#[command(about = "Moving-average regime monitor with a single-position trade gate")]
struct Cli {
    /// Settings file (TOML); missing file means defaults plus environment
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the configured symbol and trade regime entries
    Run {
        /// Stop after this many cycles (runs until Ctrl+C if not specified)
        #[arg(long)]
        max_cycles: Option<u64>,
    },
    /// Classify the symbol on every interval from 1m to 1d
    Scan {
        /// Override the configured symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    match cli.command.unwrap_or(Commands::Run { max_cycles: None }) {
        Commands::Run { max_cycles } => run(&cli.config, settings, max_cycles).await,
        Commands::Scan { symbol } => run_scan(settings, symbol).await,
    }
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("regimebot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Build the configured sinks and read back whatever they already hold
async fn build_trade_log(settings: &TradeLogSettings) -> (FanoutTradeLog, Vec<TradeRecord>) {
    let mut log = FanoutTradeLog::new();
    let mut history = Vec::new();

    if let Some(path) = &settings.jsonl_path {
        tracing::info!("Trade log: appending to {}", path.display());
        let jsonl = JsonlTradeLog::new(path);
        match jsonl.load_all().await {
            Ok(records) => history.extend(records),
            Err(e) => tracing::warn!("Failed to read trade history from {}: {}", path.display(), e),
        }
        log = log.with_sink(TradeSink::Jsonl(jsonl));
    }

    if let Some(url) = &settings.redis_url {
        match RedisTradeLog::connect(url, settings.redis_key.clone()).await {
            Ok(redis) => {
                match redis.load_all().await {
                    Ok(records) => history.extend(records),
                    Err(e) => tracing::warn!("Failed to read trade history from Redis: {}", e),
                }
                log = log.with_sink(TradeSink::Redis(redis));
            }
            Err(e) => tracing::warn!(
                "Failed to connect to Redis ({}), continuing without it",
                e
            ),
        }
    }

    if log.is_empty() {
        tracing::info!("No trade log configured, keeping records in memory");
        log = log.with_sink(TradeSink::Memory(Arc::new(MemoryTradeLog::new())));
    }

    (log, history)
}

// ============================================================================
// Commands
// ============================================================================

async fn run(config_path: &Path, settings: Settings, max_cycles: Option<u64>) -> Result<()> {
    let monitor = &settings.monitor;
    tracing::info!("🚀 RegimeBot starting");
    tracing::info!("  Symbol: {} ({:?})", monitor.symbol, monitor.market_type);
    tracing::info!("  Interval: {}", monitor.interval);
    tracing::info!("  Windows: {:?}", monitor.windows);
    tracing::info!("  Executor: {:?}", settings.executor.mode);

    let feed = BinanceClient::new(monitor.market_type)?;
    let (trade_log, history) = build_trade_log(&settings.trade_log).await;
    let loss_filter = LossFilter::from_records(&history, &monitor.symbol, &monitor.interval);
    let store = FileSettingsStore::new(config_path);

    let mut config = MonitorConfig::from_settings(monitor);
    config.max_cycles = max_cycles;

    let summary = match settings.executor.mode {
        ExecutorMode::Paper => {
            let executor = PaperExecutor::new(feed.clone(), monitor.symbol.clone());
            supervise(config, feed, executor, trade_log, store, loss_filter).await?
        }
        ExecutorMode::Http => {
            let base_url = settings
                .executor
                .base_url
                .clone()
                .context("executor.base_url is required in http mode")?;
            let executor = HttpExecutor::new(base_url, monitor.symbol.clone())?;
            supervise(config, feed, executor, trade_log, store, loss_filter).await?
        }
    };

    print_summary(&summary);
    tracing::info!("👋 RegimeBot stopped");
    Ok(())
}

/// Spawn the monitor and stop it on Ctrl+C or when it finishes by itself
async fn supervise<E: TradeExecutor + 'static>(
    config: MonitorConfig,
    feed: BinanceClient,
    executor: E,
    trade_log: FanoutTradeLog,
    store: FileSettingsStore,
    loss_filter: LossFilter,
) -> Result<MonitorSummary> {
    let handle = MonitorLoop::new(config, feed, executor, trade_log, store)
        .with_loss_filter(loss_filter)
        .spawn();
    let gate = handle.gate();

    tracing::info!("\nPress Ctrl+C to stop...\n");

    let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
    let mut poll = tokio::time::interval(std::time::Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("⚠️  Received Ctrl+C, shutting down...");
                if let Some(position) = gate.position() {
                    tracing::warn!(
                        trade_id = %position.trade_id,
                        entry = position.entry_price,
                        "Stopping with a position still open"
                    );
                }
                return handle.stop().await.context("Monitor task failed");
            }
            _ = poll.tick() => {
                if handle.is_finished() {
                    return handle.join().await.context("Monitor task failed");
                }
            }
        }
    }
}

async fn run_scan(settings: Settings, symbol: Option<String>) -> Result<()> {
    let monitor = &settings.monitor;
    let symbol = symbol.unwrap_or_else(|| monitor.symbol.clone());
    let feed = BinanceClient::new(monitor.market_type)?;
    let retry = MonitorConfig::from_settings(monitor).retry;

    let readings = scan(
        &feed,
        &retry,
        &symbol,
        &SCAN_INTERVALS,
        &monitor.windows,
        monitor.candle_limit,
    )
    .await
    .with_context(|| format!("Scan failed for {}", symbol))?;

    println!("\n{} ({:?})", symbol, monitor.market_type);
    println!(
        "{:<6} {:>12} {:<10} {:<8} {:>12} {:>12} {:>12} {:>12}",
        "Intvl", "Price", "Regime", "Trend", "MA5", "MA7", "MA21", "MA200"
    );
    println!("{}", "─".repeat(92));

    for reading in &readings {
        println!(
            "{:<6} {:>12.4} {:<10} {:<8} {:>12.4} {:>12.4} {:>12.4} {:>12.4}",
            reading.interval,
            reading.price,
            reading.condition.to_string(),
            format!("{:?}", reading.strength),
            reading.mas.ma5,
            reading.mas.ma7,
            reading.mas.ma21,
            reading.mas.ma200
        );
    }

    if readings.len() < SCAN_INTERVALS.len() {
        println!(
            "\n{} of {} intervals skipped (see log)",
            SCAN_INTERVALS.len() - readings.len(),
            SCAN_INTERVALS.len()
        );
    }

    Ok(())
}

fn print_summary(summary: &MonitorSummary) {
    println!("\n📊 Session summary");
    println!("  Cycles:   {}", summary.cycles);
    println!("  Skipped:  {}", summary.skipped);
    println!("  Opened:   {}", summary.opened);
    println!("  Closed:   {}", summary.closed);
    println!("  Failures: {}", summary.execution_failures);
    println!("  P&L/unit: {:.4}", summary.realized_pnl);
}
