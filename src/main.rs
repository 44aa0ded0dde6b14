// =============================================================================
// tapeflow — CLI entry point
// =============================================================================
//
// Wires the core pipeline for a paper or live session. Replay mode streams
// a CSV tick file through the pipeline and prints the session summary.
// Live mode requires a broker adapter binary integration and refuses to
// start without one.
//
// Exit codes: 0 normal termination, 1 setup failure, 2 data-feed failure.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tapeflow::capital::TierManager;
use tapeflow::config::EngineConfig;
use tapeflow::engine::{OrderFlowEngine, TradingPipeline};
use tapeflow::execution::ExecutionManager;
use tapeflow::feed::load_ticks_csv;
use tapeflow::notifications::{LogNotifier, NotificationEvent, NotificationHub};
use tapeflow::persistence::{
    save_tier_state_or_log, BarLog, EngineSnapshot, RegimeRecord, StateStore, TradeAudit,
};
use tapeflow::regime::StrategyRouter;
use tapeflow::scheduler::TradingScheduler;
use tapeflow::session::{
    AlwaysOpen, BacktestHours, Mode, RthHours, SessionCalendar, TradingHours, TradingSession,
};

#[derive(Parser, Debug)]
#[command(name = "tapeflow", about = "Order-flow futures trading engine")]
struct Cli {
    /// Contract symbol, e.g. MES, ES, NQ.
    #[arg(long)]
    symbol: Option<String>,

    /// Trading mode.
    #[arg(long, default_value = "paper")]
    mode: String,

    /// Footprint bar duration in seconds.
    #[arg(long)]
    timeframe_seconds: Option<u32>,

    /// Daily profit target in dollars.
    #[arg(long)]
    profit_target: Option<f64>,

    /// Daily loss limit in dollars (negative).
    #[arg(long)]
    loss_limit: Option<f64>,

    /// Maximum position size in contracts.
    #[arg(long)]
    max_position_size: Option<u32>,

    /// Stop distance in ticks.
    #[arg(long)]
    stop_ticks: Option<i64>,

    /// Target distance in ticks.
    #[arg(long)]
    tp_ticks: Option<i64>,

    /// Replay a CSV tick file (timestamp_us,price,volume,side) instead of
    /// connecting to a feed.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Replay pacing multiplier; 0 = as fast as possible.
    #[arg(long, default_value_t = 0.0)]
    speed: f64,

    /// Start without any data feed (scheduler and state only).
    #[arg(long)]
    no_data: bool,

    /// Config file path.
    #[arg(long, default_value = "tapeflow.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    // ── 1. Configuration ─────────────────────────────────────────────────
    let mut config = match EngineConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            return Ok(ExitCode::from(1));
        }
    };
    config.apply_env_overrides();
    apply_cli_overrides(&mut config, &cli);

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return Ok(ExitCode::from(1));
    }

    let mode = match cli.mode.as_str() {
        "paper" => Mode::Paper,
        "live" => Mode::Live,
        other => {
            error!(mode = other, "mode must be 'paper' or 'live'");
            return Ok(ExitCode::from(1));
        }
    };

    let symbol = config.trading.symbol.clone();
    info!(
        symbol = %symbol,
        mode = %mode,
        timeframe_secs = config.trading.timeframe_secs,
        "tapeflow starting"
    );

    // ── 2. Session ───────────────────────────────────────────────────────
    let calendar = SessionCalendar::default();
    let hours: Box<dyn TradingHours> = if cli.replay.is_some() {
        Box::new(BacktestHours)
    } else if config.execution.bypass_trading_hours {
        Box::new(AlwaysOpen)
    } else {
        Box::new(RthHours::new(calendar.clone()))
    };

    let session = TradingSession {
        mode,
        symbol: symbol.clone(),
        daily_profit_target: config.risk.daily_profit_target,
        daily_loss_limit: config.risk.daily_loss_limit,
        max_position_size: config.risk.max_position_size,
        max_concurrent_trades: config.risk.max_concurrent_trades,
        stop_loss_ticks: config.execution.stop_ticks,
        take_profit_ticks: config.execution.target_ticks,
        paper_starting_balance: config.execution.paper_starting_balance,
        paper_slippage_ticks: config.execution.paper_slippage_ticks,
        conservative_fills: config.execution.conservative_fills,
        hours,
    };
    if let Err(e) = session.validate() {
        error!(error = %e, "invalid session");
        return Ok(ExitCode::from(1));
    }

    // ── 3. Persistence & tier state ──────────────────────────────────────
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let store = StateStore::new(PathBuf::from(&data_dir).join("state"))?;
    let mut tier = match store.load_tier_state()? {
        Some(state) => TierManager::from_state(state),
        None => TierManager::new(config.execution.paper_starting_balance),
    };
    tier.start_session();
    save_tier_state_or_log(&store, tier.state());

    // ── 4. Pipeline ──────────────────────────────────────────────────────
    let engine = OrderFlowEngine::new(&config);
    let router = StrategyRouter::new(config.regime.clone(), calendar.clone());
    let manager = ExecutionManager::new(session);
    let balance = tier.state().balance;
    let hub = if cli.replay.is_some() {
        // Replay runs offline; keep the queue dark.
        NotificationHub::disabled()
    } else {
        NotificationHub::spawn(LogNotifier)
    };
    hub.publish(NotificationEvent::SessionStarted {
        symbol: symbol.clone(),
        mode: mode.to_string(),
        balance,
        at: chrono::Utc::now(),
    });

    let mut pipeline = TradingPipeline::new(engine, router, manager, Some(tier), hub);

    // ── 5. Drive ─────────────────────────────────────────────────────────
    if let Some(replay_path) = &cli.replay {
        return run_replay(&mut pipeline, replay_path, &symbol, cli.speed, &store, &data_dir).await;
    }

    if cli.no_data {
        let pipeline = std::sync::Arc::new(parking_lot::Mutex::new(pipeline));
        let mut scheduler =
            TradingScheduler::new(calendar.clone(), config.ops.flatten_before_close_minutes);

        let flatten_pipe = pipeline.clone();
        scheduler.on_flatten(move || {
            let mut pipe = flatten_pipe.lock();
            let last_close = pipe.engine().recent_bars(1).first().map(|b| b.close);
            match last_close {
                Some(price) => {
                    let trades = pipe.flatten_all(price, chrono::Utc::now());
                    info!(closed = trades.len(), "auto-flatten complete");
                }
                None => info!("auto-flatten: no bars seen, nothing to close"),
            }
        });

        let digest_pipe = pipeline.clone();
        scheduler.on_digest(move || {
            let pipe = digest_pipe.lock();
            let stats = pipe.manager().statistics();
            info!(
                trades = stats.total_trades,
                total_pnl = format!("${:.2}", stats.total_pnl),
                win_rate = format!("{:.1}%", stats.win_rate * 100.0),
                "daily digest"
            );
        });

        let handle = scheduler.start();
        info!("--no-data: started without a feed; press ctrl-c to exit");
        tokio::signal::ctrl_c().await?;
        handle.abort();
        return Ok(ExitCode::from(0));
    }

    match mode {
        Mode::Live => {
            // A live session needs a broker integration wired through
            // `execution::bridge::BrokerAdapter`; this build ships none.
            error!("live mode requires a broker adapter; none is configured");
            Ok(ExitCode::from(1))
        }
        Mode::Paper => {
            error!("paper mode without --replay needs a live data feed; none is configured");
            Ok(ExitCode::from(2))
        }
    }
}

async fn run_replay(
    pipeline: &mut TradingPipeline,
    path: &PathBuf,
    symbol: &str,
    speed: f64,
    store: &StateStore,
    data_dir: &str,
) -> anyhow::Result<ExitCode> {
    let ticks = match load_ticks_csv(path, symbol) {
        Ok(t) if !t.is_empty() => t,
        Ok(_) => {
            error!(file = %path.display(), "tick file is empty");
            return Ok(ExitCode::from(2));
        }
        Err(e) => {
            error!(error = %e, "failed to load tick file");
            return Ok(ExitCode::from(2));
        }
    };

    let session_date = ticks[0].timestamp.format("%Y-%m-%d").to_string();
    let audit = TradeAudit::new(PathBuf::from(data_dir).join("audit"), &session_date)?;
    let bar_log = BarLog::new(PathBuf::from(data_dir).join("bars"))?;

    let mut prev_ts: Option<chrono::DateTime<chrono::Utc>> = None;
    for tick in &ticks {
        // Pace the stream when a speed multiplier was requested.
        if speed > 0.0 {
            if let Some(prev) = prev_ts {
                let gap_us = (tick.timestamp - prev)
                    .num_microseconds()
                    .unwrap_or(0)
                    .max(0);
                let scaled = (gap_us as f64 / speed) as u64;
                if scaled > 0 {
                    tokio::time::sleep(std::time::Duration::from_micros(scaled)).await;
                }
            }
        }
        prev_ts = Some(tick.timestamp);

        let outcome = pipeline.process_tick(tick);
        if let Some(bar) = &outcome.closed_bar {
            if let Err(e) = bar_log.append(bar) {
                error!(error = %e, "bar log write failed");
            }
        }
        for trade in &outcome.new_trades {
            if let Err(e) = audit.append(trade) {
                error!(error = %e, "trade audit write failed");
            }
        }
        if !outcome.new_trades.is_empty() {
            if let Some(tier) = pipeline.tier() {
                save_tier_state_or_log(store, tier.state());
            }
        }
    }

    // Crash-recovery snapshot and per-symbol regime state.
    let (tick_total, bar_total, _, _) = pipeline.engine().counts();
    let snapshot = EngineSnapshot {
        open_positions: pipeline.manager().open_positions().to_vec(),
        completed_trades: pipeline.manager().completed_trades().to_vec(),
        daily_pnl: pipeline.manager().daily_pnl(),
        is_halted: pipeline.manager().is_halted(),
        halt_reason: pipeline.manager().halt_reason().map(str::to_string),
        tick_count: tick_total,
        bar_count: bar_total,
        saved_at: Some(chrono::Utc::now()),
    };
    if let Err(e) = store.save_engine_snapshot(&snapshot) {
        error!(error = %e, "engine snapshot save failed");
    }
    let mut regime_map = std::collections::HashMap::new();
    regime_map.insert(
        symbol.to_string(),
        RegimeRecord {
            regime: pipeline.router().current_regime(),
            confidence: pipeline.router().regime_confidence(),
            updated_at: chrono::Utc::now(),
        },
    );
    if let Err(e) = store.save_regime_map(&regime_map) {
        error!(error = %e, "regime state save failed");
    }

    // ── Summary ──────────────────────────────────────────────────────────
    let stats = pipeline.manager().statistics();
    let (tick_count, bar_count, signal_count, dropped) = pipeline.engine().counts();
    let router_state = pipeline.router().state();

    info!(
        ticks = tick_count,
        bars = bar_count,
        signals = signal_count,
        dropped_ticks = dropped,
        "replay complete"
    );
    info!(
        evaluated = router_state.signals_evaluated,
        approved = router_state.signals_approved,
        rejected = router_state.signals_rejected,
        final_regime = %router_state.current_regime,
        "router summary"
    );
    info!(
        trades = stats.total_trades,
        win_rate = format!("{:.1}%", stats.win_rate * 100.0),
        total_pnl = format!("${:.2}", stats.total_pnl),
        profit_factor = format!("{:.2}", stats.profit_factor),
        "session summary"
    );
    if pipeline.manager().is_halted() {
        info!(reason = ?pipeline.manager().halt_reason(), "session ended halted");
    }

    Ok(ExitCode::from(0))
}

fn apply_cli_overrides(config: &mut EngineConfig, cli: &Cli) {
    if let Some(symbol) = &cli.symbol {
        config.trading.symbol = symbol.to_uppercase();
    }
    if let Some(tf) = cli.timeframe_seconds {
        config.trading.timeframe_secs = tf;
    }
    if let Some(v) = cli.profit_target {
        config.risk.daily_profit_target = v;
    }
    if let Some(v) = cli.loss_limit {
        config.risk.daily_loss_limit = v;
    }
    if let Some(v) = cli.max_position_size {
        config.risk.max_position_size = v;
    }
    if let Some(v) = cli.stop_ticks {
        config.execution.stop_ticks = v;
    }
    if let Some(v) = cli.tp_ticks {
        config.execution.target_ticks = v;
    }
}
