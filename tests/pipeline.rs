// =============================================================================
// End-to-end pipeline scenarios: ticks through detection, regime routing,
// and paper execution
// =============================================================================

use chrono::{DateTime, Duration, TimeZone, Utc};

use tapeflow::config::EngineConfig;
use tapeflow::engine::{OrderFlowEngine, TradingPipeline};
use tapeflow::execution::{ExecutionManager, ExitReason};
use tapeflow::notifications::NotificationHub;
use tapeflow::regime::StrategyRouter;
use tapeflow::session::{AlwaysOpen, Mode, SessionCalendar, TradingSession};
use tapeflow::types::{Price, Regime, Side, SignalPattern, Tick};

const TICK_SIZE: f64 = 0.25;
const TIMEFRAME: u32 = 60;

fn tick(at: DateTime<Utc>, points: f64, volume: u64, side: Side) -> Tick {
    Tick {
        timestamp: at,
        price: Price::from_points(points, TICK_SIZE),
        volume,
        side,
        symbol: "MES".into(),
    }
}

fn config() -> EngineConfig {
    let mut c = EngineConfig::default();
    c.trading.symbol = "MES".into();
    c.trading.timeframe_secs = TIMEFRAME;
    c
}

fn session() -> TradingSession {
    TradingSession {
        mode: Mode::Paper,
        symbol: "MES".into(),
        daily_profit_target: 500.0,
        daily_loss_limit: -300.0,
        max_position_size: 1,
        max_concurrent_trades: 1,
        stop_loss_ticks: 16,
        take_profit_ticks: 24,
        paper_starting_balance: 2500.0,
        paper_slippage_ticks: 0,
        conservative_fills: false,
        hours: Box::new(AlwaysOpen),
    }
}

fn pipeline() -> TradingPipeline {
    let cfg = config();
    TradingPipeline::new(
        OrderFlowEngine::new(&cfg),
        StrategyRouter::new(cfg.regime.clone(), SessionCalendar::default()),
        ExecutionManager::new(session()),
        None,
        NotificationHub::disabled(),
    )
}

/// A quiet, steadily rising tape: one price level per bar, balanced
/// bid/ask volume (no detector fires), climbing one tick per bar.
/// Returns the ticks and the price of the last bar's level.
fn trending_tape(start: DateTime<Utc>, base_points: f64, bars: usize) -> (Vec<Tick>, f64) {
    let mut ticks = Vec::new();
    let mut last = base_points;
    for i in 0..bars {
        let at = start + Duration::seconds(i as i64 * TIMEFRAME as i64);
        last = base_points + i as f64 * TICK_SIZE;
        ticks.push(tick(at, last, 30, Side::Ask));
        ticks.push(tick(at + Duration::seconds(20), last, 30, Side::Bid));
    }
    (ticks, last)
}

/// 10:00 ET on Wednesday 2024-06-12 (14:00 UTC during daylight saving).
fn mid_session_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 12, 14, 0, 0).unwrap()
}

#[test]
fn uptrend_imbalance_executes_and_hits_target() {
    let mut pipe = pipeline();
    let start = mid_session_start();

    // Warm-up: 40 quiet trending bars pushes the classifier past its gate
    // and into TRENDING_UP.
    let (warmup, last_price) = trending_tape(start, 5000.0, 40);
    for t in &warmup {
        let outcome = pipe.process_tick(t);
        assert!(outcome.new_trades.is_empty(), "warm-up must not trade");
    }

    // Signal bar: 60 aggressive buys one tick above 10 resting sells —
    // a 6.0 diagonal ratio, strength 0.6.
    let signal_bar_at = start + Duration::seconds(40 * TIMEFRAME as i64);
    let imbalance_price = last_price + TICK_SIZE;
    pipe.process_tick(&tick(signal_bar_at, last_price, 10, Side::Bid));
    pipe.process_tick(&tick(
        signal_bar_at + Duration::seconds(10),
        imbalance_price,
        60,
        Side::Ask,
    ));

    // Boundary tick closes the signal bar; the imbalance should be
    // approved under TRENDING_UP and fill on paper immediately.
    let mut boundary = signal_bar_at + Duration::seconds(TIMEFRAME as i64);
    let outcome = pipe.process_tick(&tick(boundary, imbalance_price, 30, Side::Ask));
    assert!(outcome.closed_bar.is_some());

    let approved: Vec<_> = outcome.signals.iter().filter(|s| s.approved).collect();
    assert!(
        !approved.is_empty(),
        "expected an approved signal, got {:?}",
        outcome
            .signals
            .iter()
            .map(|s| (s.pattern, s.approved, s.rejection_reason.clone()))
            .collect::<Vec<_>>()
    );
    assert_eq!(approved[0].pattern, SignalPattern::BuyImbalance);
    assert_eq!(approved[0].regime, Some(Regime::TrendingUp));
    assert_eq!(pipe.manager().open_positions().len(), 1);

    let entry = pipe.manager().open_positions()[0].entry_price;
    assert_eq!(entry, Price::from_points(imbalance_price, TICK_SIZE));

    // Keep the tape climbing until the close crosses the 24-tick target.
    for i in 1..=30 {
        let price = imbalance_price + i as f64 * TICK_SIZE;
        boundary = boundary + Duration::seconds(TIMEFRAME as i64);
        pipe.process_tick(&tick(boundary, price, 30, Side::Ask));
        pipe.process_tick(&tick(boundary + Duration::seconds(20), price, 30, Side::Bid));
        if !pipe.manager().open_positions().is_empty() {
            continue;
        }
        break;
    }

    let trades = pipe.manager().completed_trades();
    assert_eq!(trades.len(), 1, "the bracket should have resolved");
    let trade = &trades[0];
    assert_eq!(trade.exit_reason, ExitReason::Target);
    assert_eq!(trade.pnl_ticks, 24);
    // MES: 24 ticks * $1.25 * 1 contract.
    assert!((trade.pnl - 30.0).abs() < 1e-9);
    assert!((pipe.manager().daily_pnl() - 30.0).abs() < 1e-9);
}

#[test]
fn near_close_override_rejects_all_signals() {
    let mut pipe = pipeline();
    // Tape starting 15:05 ET: the signal bar ends inside the 15-minute
    // no-trade buffer before the close.
    let start = Utc.with_ymd_and_hms(2024, 6, 12, 19, 5, 0).unwrap();

    let (warmup, last_price) = trending_tape(start, 5000.0, 40);
    for t in &warmup {
        pipe.process_tick(t);
    }

    let signal_bar_at = start + Duration::seconds(40 * TIMEFRAME as i64);
    pipe.process_tick(&tick(signal_bar_at, last_price, 10, Side::Bid));
    pipe.process_tick(&tick(
        signal_bar_at + Duration::seconds(10),
        last_price + TICK_SIZE,
        60,
        Side::Ask,
    ));
    let outcome = pipe.process_tick(&tick(
        signal_bar_at + Duration::seconds(TIMEFRAME as i64),
        last_price + TICK_SIZE,
        30,
        Side::Ask,
    ));

    assert!(outcome.closed_bar.is_some());
    assert!(!outcome.signals.is_empty(), "imbalance should still fire");
    for s in &outcome.signals {
        assert!(!s.approved);
        assert_eq!(s.regime, Some(Regime::NoTrade));
        assert!(
            s.rejection_reason.as_deref().unwrap().contains("NO_TRADE"),
            "unexpected reason: {:?}",
            s.rejection_reason
        );
    }
    assert!(pipe.manager().completed_trades().is_empty());
    assert!(pipe.manager().open_positions().is_empty());
}

#[test]
fn replay_is_deterministic() {
    let run = || {
        let mut pipe = pipeline();
        let start = mid_session_start();
        let (warmup, last_price) = trending_tape(start, 5000.0, 45);
        for t in &warmup {
            pipe.process_tick(t);
        }
        let signal_bar_at = start + Duration::seconds(45 * TIMEFRAME as i64);
        pipe.process_tick(&tick(signal_bar_at, last_price, 10, Side::Bid));
        pipe.process_tick(&tick(
            signal_bar_at + Duration::seconds(10),
            last_price + TICK_SIZE,
            60,
            Side::Ask,
        ));
        pipe.process_tick(&tick(
            signal_bar_at + Duration::seconds(TIMEFRAME as i64),
            last_price + TICK_SIZE,
            30,
            Side::Ask,
        ));

        let (ticks, bars, signals, _) = pipe.engine().counts();
        let state = pipe.router().state();
        (
            ticks,
            bars,
            signals,
            state.signals_evaluated,
            state.signals_approved,
            pipe.manager().open_positions().len(),
            pipe.manager().daily_pnl().to_bits(),
        )
    };

    assert_eq!(run(), run());
}

#[test]
fn tier_state_survives_sessions_through_the_store() {
    use tapeflow::capital::TierManager;
    use tapeflow::persistence::StateStore;

    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path()).unwrap();

    // Session one: three $400 winners push the balance from $2,500 into
    // the ES Entry tier.
    {
        let mut tier = TierManager::new(2500.0);
        tier.start_session();
        for _ in 0..3 {
            tier.record_trade(400.0);
        }
        assert_eq!(tier.state().instrument, "ES");
        store.save_tier_state(tier.state()).unwrap();
    }

    // Session two resumes exactly where one ended.
    {
        let state = store.load_tier_state().unwrap().expect("state persisted");
        let mut tier = TierManager::from_state(state);
        tier.start_session();
        assert!((tier.state().balance - 3700.0).abs() < f64::EPSILON);
        assert_eq!(tier.state().tier_index, 1);
        assert_eq!(tier.state().max_contracts, 1);
        // ES Entry trades one contract regardless of conditions.
        assert_eq!(tier.position_size(Regime::TrendingUp, 2), 1);
    }
}

#[test]
fn halted_pipeline_stops_trading_but_keeps_aggregating() {
    let mut pipe = pipeline();
    let start = mid_session_start();

    let (warmup, last_price) = trending_tape(start, 5000.0, 40);
    for t in &warmup {
        pipe.process_tick(t);
    }
    pipe.manager_mut().halt("operator pause");

    // A signal-bearing bar arrives while halted.
    let signal_bar_at = start + Duration::seconds(40 * TIMEFRAME as i64);
    pipe.process_tick(&tick(signal_bar_at, last_price, 10, Side::Bid));
    pipe.process_tick(&tick(
        signal_bar_at + Duration::seconds(10),
        last_price + TICK_SIZE,
        60,
        Side::Ask,
    ));
    let outcome = pipe.process_tick(&tick(
        signal_bar_at + Duration::seconds(TIMEFRAME as i64),
        last_price + TICK_SIZE,
        30,
        Side::Ask,
    ));

    // The signal is approved by the router but the engine refuses it.
    assert!(outcome.signals.iter().any(|s| s.approved));
    assert!(pipe.manager().open_positions().is_empty());
    assert!(pipe.manager().completed_trades().is_empty());

    // Aggregation continued regardless.
    let (_, bars, _, _) = pipe.engine().counts();
    assert!(bars >= 40);

    // Resume works while inside the limits, and trading picks back up.
    assert!(pipe.manager_mut().resume());
    assert!(!pipe.manager().is_halted());
}
