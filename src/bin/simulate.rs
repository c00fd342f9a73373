use clap::Parser;
use regimebot::api::{RandomWalkFeed, WalkParams};
use regimebot::config::{StaticSettings, TradeSettings};
use regimebot::execution::{MonitorConfig, MonitorLoop, PaperExecutor, RetryPolicy};
use regimebot::persistence::MemoryTradeLog;
use regimebot::{TradeRecord, TradeStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Run the monitor offline against a seeded random walk
#[derive(Parser)]
#[command(name = "simulate")]
struct Args {
    /// RNG seed; same seed, same walk
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of monitor cycles (one new candle each)
    #[arg(long, default_value_t = 2000)]
    cycles: u64,

    /// Take-profit distance in percent
    #[arg(long, default_value_t = 1.0)]
    return_pct: f64,

    /// Stop-loss distance in percent
    #[arg(long, default_value_t = 1.0)]
    loss_pct: f64,

    /// Relative drift per candle
    #[arg(long, default_value_t = 0.0008)]
    drift: f64,
}

#[tokio::main]
async fn main() -> regimebot::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("regimebot=warn")
        .init();

    let args = Args::parse();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║            REGIMEBOT RANDOM-WALK SIMULATION           ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!("  Seed: {}  Cycles: {}  TP: {}%  SL: {}%", args.seed, args.cycles, args.return_pct, args.loss_pct);

    let params = WalkParams {
        drift: args.drift,
        ..WalkParams::default()
    };
    let feed = Arc::new(RandomWalkFeed::new(args.seed, params, 250));
    let executor = PaperExecutor::new(feed.clone(), "SIM");
    let trade_log = Arc::new(MemoryTradeLog::new());
    let settings = StaticSettings(TradeSettings {
        return_percentage: args.return_pct,
        loss_risk_percentage: args.loss_pct,
        ..TradeSettings::default()
    });

    let config = MonitorConfig {
        symbol: "SIM".to_string(),
        cycle_interval: Duration::ZERO,
        pause_poll: Duration::from_millis(10),
        retry: RetryPolicy::new(1, Duration::ZERO),
        max_cycles: Some(args.cycles),
        ..MonitorConfig::default()
    };

    let mut monitor = MonitorLoop::new(config, feed.clone(), executor, trade_log.clone(), settings);
    let (_stop_tx, stop_rx) = watch::channel(false);
    let summary = monitor.run(stop_rx).await;

    print_trades(&trade_log.records());

    let wins = trade_log
        .records()
        .iter()
        .filter(|r| r.status == TradeStatus::Closed && r.realized_pnl.is_some_and(|p| p > 0.0))
        .count();
    let win_rate = if summary.closed > 0 {
        wins as f64 / summary.closed as f64 * 100.0
    } else {
        0.0
    };

    println!("\n📊 Summary");
    println!("  Candles generated: {}", feed.len());
    println!("  Cycles:            {}", summary.cycles);
    println!("  Trades closed:     {}", summary.closed);
    println!("  Win rate:          {:.1}%", win_rate);
    println!("  Blocked repeats:   {}", monitor.loss_filter().len());
    println!("  P&L per unit:      {:.4}", summary.realized_pnl);
    if monitor.gate().is_open() {
        println!("  ⚠️  Position still open at end of run");
    }
    println!();

    Ok(())
}

fn print_trades(records: &[TradeRecord]) {
    println!(
        "\n{:<10} {:<11} {:<7} {:<10} {:>12} {:>10}",
        "Trade", "Kind", "Status", "Regime", "Fill", "P&L"
    );
    println!("{}", "─".repeat(65));

    for record in records {
        let id = record.trade_id.to_string();
        println!(
            "{:<10} {:<11} {:<7} {:<10} {:>12.4} {:>10}",
            &id[..8],
            record.trade_type.as_str(),
            format!("{:?}", record.status),
            record.regime.to_string(),
            record.fill_price,
            record
                .realized_pnl
                .map(|p| format!("{:.4}", p))
                .unwrap_or_default()
        );
    }
}
