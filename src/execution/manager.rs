// =============================================================================
// Execution Manager — signal-to-bracket translation, fills, P&L, halts
// =============================================================================
//
// At most `max_concurrent_trades` positions are open at a time. Approved
// signals pass four gates (halt, daily limits, concurrency, trading hours),
// get sized, and become bracket orders. Paper mode synthesizes the fill
// immediately; live mode leaves the bracket pending for the broker bridge.
//
// Mark-to-market checks stops before targets, and exits fill at the
// stop/target level itself — a gap through the level never improves the
// realized price.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::session::{Mode, TradingSession};
use crate::symbols;
use crate::types::{Direction, Price, Signal};

use super::orders::{short_id, BracketOrder, ExitReason, OrderStatus, Position, Trade};

type TradeObserver = Box<dyn FnMut(&Trade) + Send>;
type PositionObserver = Box<dyn FnMut(&Position) + Send>;

/// Summary statistics over the session's completed trades.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SessionStats {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

pub struct ExecutionManager {
    session: TradingSession,
    tick_size: f64,
    tick_value: f64,

    daily_pnl: f64,
    paper_balance: f64,
    open_positions: Vec<Position>,
    pending_orders: Vec<BracketOrder>,
    completed_trades: Vec<Trade>,

    is_halted: bool,
    halt_reason: Option<String>,

    trade_observers: Vec<TradeObserver>,
    position_observers: Vec<PositionObserver>,
}

impl ExecutionManager {
    pub fn new(session: TradingSession) -> Self {
        let spec = symbols::spec_for(&session.symbol);
        let paper_balance = session.paper_starting_balance;
        Self {
            tick_size: spec.tick_size,
            tick_value: spec.tick_value,
            daily_pnl: 0.0,
            paper_balance,
            open_positions: Vec::new(),
            pending_orders: Vec::new(),
            completed_trades: Vec::new(),
            is_halted: false,
            halt_reason: None,
            trade_observers: Vec::new(),
            position_observers: Vec::new(),
            session,
        }
    }

    // -------------------------------------------------------------------------
    // Signal intake
    // -------------------------------------------------------------------------

    /// Turn an approved signal into a bracket order. Returns `None` when a
    /// gate rejects it; gates are session conditions, not signal defects,
    /// so no rejection reason is stamped on the signal.
    ///
    /// `tier_size` overrides the base sizing formula when a tier manager is
    /// in charge; the session's max position size still caps it.
    pub fn on_signal(
        &mut self,
        signal: &Signal,
        regime_multiplier: f64,
        tier_size: Option<u32>,
    ) -> Option<BracketOrder> {
        if !signal.approved {
            debug!(reason = ?signal.rejection_reason, "ignoring unapproved signal");
            return None;
        }

        // Gate 1: halt state.
        if self.is_halted {
            debug!(reason = ?self.halt_reason, "signal rejected: session halted");
            return None;
        }

        // Gate 2: daily limits.
        if self.daily_pnl >= self.session.daily_profit_target {
            self.halt("Daily profit target reached");
            return None;
        }
        if self.daily_pnl <= self.session.daily_loss_limit {
            self.halt("Daily loss limit reached");
            return None;
        }

        // Gate 3: concurrency.
        if self.open_positions.len() >= self.session.max_concurrent_trades {
            debug!("signal rejected: max concurrent trades reached");
            return None;
        }

        // Gate 4: trading hours (the policy object absorbs any bypass).
        if !self.session.is_within_trading_hours(signal.timestamp) {
            debug!("signal rejected: outside trading hours");
            return None;
        }

        let size = self.position_size(regime_multiplier, tier_size);
        let mut order = self.build_bracket(signal, size);

        match self.session.mode {
            Mode::Paper => {
                order.status = OrderStatus::Filled;
                self.fill_bracket(&order, signal);
            }
            Mode::Live => {
                order.status = OrderStatus::Pending;
                self.pending_orders.push(order.clone());
            }
        }

        Some(order)
    }

    fn position_size(&self, regime_multiplier: f64, tier_size: Option<u32>) -> u32 {
        let cap = self.session.max_position_size;
        match tier_size {
            Some(tier) => tier.clamp(1, cap),
            None => {
                let base = (cap as f64 * regime_multiplier).floor() as u32;
                base.max(1)
            }
        }
    }

    fn build_bracket(&self, signal: &Signal, size: u32) -> BracketOrder {
        let entry = self.paper_entry_price(signal);
        let (stop, target) = match signal.direction {
            Direction::Long => (
                entry.offset(-self.session.stop_loss_ticks),
                entry.offset(self.session.take_profit_ticks),
            ),
            Direction::Short => (
                entry.offset(self.session.stop_loss_ticks),
                entry.offset(-self.session.take_profit_ticks),
            ),
        };
        BracketOrder::new(
            &self.session.symbol,
            signal.direction,
            size,
            entry,
            stop,
            target,
            signal.timestamp,
        )
    }

    /// Paper entries pay the configured slippage against the trader.
    fn paper_entry_price(&self, signal: &Signal) -> Price {
        if self.session.mode != Mode::Paper {
            return signal.price;
        }
        let slip = self.session.paper_slippage_ticks;
        match signal.direction {
            Direction::Long => signal.price.offset(slip),
            Direction::Short => signal.price.offset(-slip),
        }
    }

    /// Create the position for a filled bracket. Called directly for paper
    /// fills, and by the broker bridge when a live fill lands.
    pub fn fill_bracket(&mut self, order: &BracketOrder, signal: &Signal) {
        let position = Position {
            position_id: short_id(),
            bracket_id: order.bracket_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            size: order.size,
            entry_price: order.entry_price,
            entry_time: order.created_at,
            current_price: order.entry_price,
            unrealized_pnl: 0.0,
            stop_price: order.stop_price,
            target_price: order.target_price,
            tick_size: self.tick_size,
            tick_value: self.tick_value,
            signal_pattern: Some(signal.pattern.to_string()),
            regime: signal.regime.map(|r| r.to_string()),
        };

        info!(
            bracket_id = %order.bracket_id,
            side = %order.side,
            size = order.size,
            entry = order.entry_price.to_points(self.tick_size),
            stop = order.stop_price.to_points(self.tick_size),
            target = order.target_price.to_points(self.tick_size),
            mode = %self.session.mode,
            "position opened"
        );

        for observer in &mut self.position_observers {
            let call = std::panic::AssertUnwindSafe(|| observer(&position));
            if std::panic::catch_unwind(call).is_err() {
                warn!("position observer panicked; continuing delivery");
            }
        }
        self.open_positions.push(position);
    }

    // -------------------------------------------------------------------------
    // Mark-to-market
    // -------------------------------------------------------------------------

    /// Update every open position against `current_price` and apply exits.
    ///
    /// Stops are checked first and are always inclusive. Targets are
    /// inclusive normally; with conservative fills they require price to
    /// trade *through* the level (strict inequality) — deliberately
    /// asymmetric with stops, simulating last place in the fill queue.
    pub fn update_prices(&mut self, current_price: Price, at: DateTime<Utc>) {
        if self.open_positions.is_empty() {
            return;
        }
        let conservative = self.session.conservative_fills;

        let mut remaining = Vec::with_capacity(self.open_positions.len());
        let mut exits: Vec<(Position, Price, ExitReason)> = Vec::new();

        for mut position in std::mem::take(&mut self.open_positions) {
            position.update_pnl(current_price);

            let stop_hit = match position.side {
                Direction::Long => current_price <= position.stop_price,
                Direction::Short => current_price >= position.stop_price,
            };
            if stop_hit {
                let stop = position.stop_price;
                exits.push((position, stop, ExitReason::Stop));
                continue;
            }

            let target_hit = match (position.side, conservative) {
                (Direction::Long, false) => current_price >= position.target_price,
                (Direction::Long, true) => current_price > position.target_price,
                (Direction::Short, false) => current_price <= position.target_price,
                (Direction::Short, true) => current_price < position.target_price,
            };
            if target_hit {
                let target = position.target_price;
                exits.push((position, target, ExitReason::Target));
                continue;
            }

            remaining.push(position);
        }

        self.open_positions = remaining;
        for (position, price, reason) in exits {
            self.finish_close(position, price, reason, at);
        }
    }

    /// Manual exit path used by auto-flatten and operator commands: close
    /// everything at `price`.
    pub fn close_all_positions(
        &mut self,
        price: Price,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Vec<Trade> {
        let positions = std::mem::take(&mut self.open_positions);
        let mut trades = Vec::with_capacity(positions.len());
        for position in positions {
            trades.push(self.finish_close(position, price, reason, at));
        }
        trades
    }

    fn finish_close(
        &mut self,
        position: Position,
        exit_price: Price,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Trade {
        let trade = Trade::from_close(&position, exit_price, at, reason);

        self.daily_pnl += trade.pnl;
        if self.session.mode == Mode::Paper {
            self.paper_balance += trade.pnl;
        }

        info!(
            reason = %reason,
            side = %trade.side,
            size = trade.size,
            exit = exit_price.to_points(position.tick_size),
            pnl = trade.pnl,
            pnl_ticks = trade.pnl_ticks,
            daily_pnl = self.daily_pnl,
            "position closed"
        );

        self.completed_trades.push(trade.clone());

        // Re-evaluate limits after every close. Halting closes nothing by
        // itself; auto-flatten does that on its own clock.
        if self.daily_pnl >= self.session.daily_profit_target {
            self.halt("Daily profit target reached");
        } else if self.daily_pnl <= self.session.daily_loss_limit {
            self.halt("Daily loss limit reached");
        }

        for observer in &mut self.trade_observers {
            let call = std::panic::AssertUnwindSafe(|| observer(&trade));
            if std::panic::catch_unwind(call).is_err() {
                warn!("trade observer panicked; continuing delivery");
            }
        }
        trade
    }

    // -------------------------------------------------------------------------
    // Halt control
    // -------------------------------------------------------------------------

    pub fn halt(&mut self, reason: &str) {
        if !self.is_halted {
            warn!(reason, "trading halted");
        }
        self.is_halted = true;
        self.halt_reason = Some(reason.to_string());
    }

    /// Resume is only permitted while both daily limits hold.
    pub fn resume(&mut self) -> bool {
        if self.daily_pnl >= self.session.daily_profit_target {
            warn!("cannot resume: profit target reached");
            return false;
        }
        if self.daily_pnl <= self.session.daily_loss_limit {
            warn!("cannot resume: loss limit reached");
            return false;
        }
        self.is_halted = false;
        self.halt_reason = None;
        info!("trading resumed");
        true
    }

    // -------------------------------------------------------------------------
    // Observers and queries
    // -------------------------------------------------------------------------

    pub fn on_trade(&mut self, cb: impl FnMut(&Trade) + Send + 'static) {
        self.trade_observers.push(Box::new(cb));
    }

    pub fn on_position(&mut self, cb: impl FnMut(&Position) + Send + 'static) {
        self.position_observers.push(Box::new(cb));
    }

    pub fn is_halted(&self) -> bool {
        self.is_halted
    }

    pub fn halt_reason(&self) -> Option<&str> {
        self.halt_reason.as_deref()
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn paper_balance(&self) -> f64 {
        self.paper_balance
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.open_positions
    }

    pub fn pending_orders(&self) -> &[BracketOrder] {
        &self.pending_orders
    }

    pub fn take_pending_orders(&mut self) -> Vec<BracketOrder> {
        std::mem::take(&mut self.pending_orders)
    }

    pub fn completed_trades(&self) -> &[Trade] {
        &self.completed_trades
    }

    pub fn session(&self) -> &TradingSession {
        &self.session
    }

    pub fn tick_size(&self) -> f64 {
        self.tick_size
    }

    pub fn statistics(&self) -> SessionStats {
        if self.completed_trades.is_empty() {
            return SessionStats::default();
        }

        let wins: Vec<f64> = self
            .completed_trades
            .iter()
            .filter(|t| t.pnl > 0.0)
            .map(|t| t.pnl)
            .collect();
        let losses: Vec<f64> = self
            .completed_trades
            .iter()
            .filter(|t| t.pnl <= 0.0)
            .map(|t| t.pnl)
            .collect();

        let total_wins: f64 = wins.iter().sum();
        let total_losses: f64 = losses.iter().map(|p| p.abs()).sum();

        SessionStats {
            total_trades: self.completed_trades.len(),
            win_rate: wins.len() as f64 / self.completed_trades.len() as f64,
            total_pnl: self.daily_pnl,
            average_win: if wins.is_empty() {
                0.0
            } else {
                total_wins / wins.len() as f64
            },
            average_loss: if losses.is_empty() {
                0.0
            } else {
                total_losses / losses.len() as f64
            },
            profit_factor: if total_losses > 0.0 {
                total_wins / total_losses
            } else {
                f64::INFINITY
            },
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::min),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AlwaysOpen;
    use crate::types::{SignalDetails, SignalPattern};

    const TICK: f64 = 0.25;

    fn es_session() -> TradingSession {
        TradingSession {
            mode: Mode::Paper,
            symbol: "ES".into(),
            daily_profit_target: 500.0,
            daily_loss_limit: -300.0,
            max_position_size: 1,
            max_concurrent_trades: 1,
            stop_loss_ticks: 16,
            take_profit_ticks: 24,
            paper_starting_balance: 10_000.0,
            paper_slippage_ticks: 0,
            conservative_fills: false,
            hours: Box::new(AlwaysOpen),
        }
    }

    fn approved_signal(direction: Direction, points: f64) -> Signal {
        let mut s = Signal::new(
            Utc::now(),
            "ES",
            SignalPattern::BuyImbalance,
            direction,
            0.8,
            Price::from_points(points, TICK),
            SignalDetails::Imbalance {
                ratio: 5.0,
                dominant_volume: 50,
                opposing_volume: 10,
            },
        );
        s.approved = true;
        s
    }

    fn p(points: f64) -> Price {
        Price::from_points(points, TICK)
    }

    #[test]
    fn paper_long_hits_target() {
        let mut mgr = ExecutionManager::new(es_session());
        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .expect("order expected");

        assert_eq!(order.entry_price, p(5000.0));
        assert_eq!(order.stop_price, p(4996.0));
        assert_eq!(order.target_price, p(5006.0));
        assert_eq!(mgr.open_positions().len(), 1);

        // First mark: no exit, +12 ticks unrealized = $150.
        mgr.update_prices(p(5003.0), Utc::now());
        assert_eq!(mgr.open_positions().len(), 1);
        assert!((mgr.open_positions()[0].unrealized_pnl - 150.0).abs() < 1e-9);

        // Second mark touches the target.
        mgr.update_prices(p(5006.0), Utc::now());
        assert!(mgr.open_positions().is_empty());
        let trade = &mgr.completed_trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::Target);
        assert_eq!(trade.pnl_ticks, 24);
        assert!((trade.pnl - 300.0).abs() < 1e-9);

        // A third mark is a no-op.
        mgr.update_prices(p(5010.0), Utc::now());
        assert_eq!(mgr.completed_trades().len(), 1);
    }

    #[test]
    fn stop_takes_precedence_over_target() {
        let mut mgr = ExecutionManager::new(es_session());
        mgr.on_signal(&approved_signal(Direction::Short, 5000.0), 1.0, None)
            .unwrap();
        // SHORT @ 5000: stop 5004, target 4994.

        // Adverse move first.
        mgr.update_prices(p(5005.0), Utc::now());
        // Favorable move afterwards must find nothing to fill.
        mgr.update_prices(p(4993.0), Utc::now());

        assert_eq!(mgr.completed_trades().len(), 1);
        let trade = &mgr.completed_trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::Stop);
        // Fill at the stop level, not the traded-through price.
        assert_eq!(trade.exit_price, p(5004.0));
        assert_eq!(trade.pnl_ticks, -16);
        assert!((trade.pnl + 200.0).abs() < 1e-9);
    }

    #[test]
    fn gap_fills_at_stop_level() {
        let mut mgr = ExecutionManager::new(es_session());
        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        // Gap far through the stop: exit price is still the stop.
        mgr.update_prices(p(4980.0), Utc::now());
        let trade = &mgr.completed_trades()[0];
        assert_eq!(trade.exit_price, p(4996.0));
        assert_eq!(trade.pnl_ticks, -16);
    }

    #[test]
    fn conservative_fills_require_trade_through() {
        let mut session = es_session();
        session.conservative_fills = true;
        let mut mgr = ExecutionManager::new(session);
        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();

        // Touch is not enough.
        mgr.update_prices(p(5006.0), Utc::now());
        assert_eq!(mgr.open_positions().len(), 1);

        // One tick through fills at the target level.
        mgr.update_prices(p(5006.25), Utc::now());
        let trade = &mgr.completed_trades()[0];
        assert_eq!(trade.exit_reason, ExitReason::Target);
        assert_eq!(trade.exit_price, p(5006.0));

        // Stops stay inclusive under conservative fills.
        let mut session = es_session();
        session.conservative_fills = true;
        let mut mgr = ExecutionManager::new(session);
        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.update_prices(p(4996.0), Utc::now());
        assert_eq!(mgr.completed_trades()[0].exit_reason, ExitReason::Stop);
    }

    #[test]
    fn loss_limit_halts_and_silently_rejects() {
        let mut session = es_session();
        // One 16-tick ES stop = -$200; use a tighter limit so a single stop
        // plus another entry attempt trips it.
        session.daily_loss_limit = -300.0;
        session.stop_loss_ticks = 26; // -$325 on one stop
        let mut mgr = ExecutionManager::new(session);

        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.update_prices(p(4990.0), Utc::now()); // through the stop

        assert!(mgr.is_halted());
        assert_eq!(mgr.halt_reason(), Some("Daily loss limit reached"));
        assert!((mgr.daily_pnl() + 325.0).abs() < 1e-9);

        // Subsequent approved signal is silently dropped.
        let order = mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None);
        assert!(order.is_none());
        assert!(mgr.open_positions().is_empty());

        // Resume is refused while beyond the limit.
        assert!(!mgr.resume());
        assert!(mgr.is_halted());
    }

    #[test]
    fn profit_target_halts() {
        let mut session = es_session();
        session.daily_profit_target = 250.0;
        let mut mgr = ExecutionManager::new(session);

        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.update_prices(p(5006.0), Utc::now()); // +$300

        assert!(mgr.is_halted());
        assert_eq!(mgr.halt_reason(), Some("Daily profit target reached"));
    }

    #[test]
    fn concurrency_gate() {
        let mut mgr = ExecutionManager::new(es_session());
        assert!(mgr
            .on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .is_some());
        // max_concurrent_trades = 1: the second signal is dropped.
        assert!(mgr
            .on_signal(&approved_signal(Direction::Long, 5001.0), 1.0, None)
            .is_none());
        assert_eq!(mgr.open_positions().len(), 1);
    }

    #[test]
    fn unapproved_signal_is_ignored() {
        let mut mgr = ExecutionManager::new(es_session());
        let mut s = approved_signal(Direction::Long, 5000.0);
        s.approved = false;
        assert!(mgr.on_signal(&s, 1.0, None).is_none());
    }

    #[test]
    fn sizing_formula_and_tier_override() {
        let mut session = es_session();
        session.max_position_size = 2;
        let mut mgr = ExecutionManager::new(session);
        // base: floor(2 * 0.5) = 1
        assert_eq!(mgr.position_size(0.5, None), 1);
        // floor(2 * 1.0) = 2
        assert_eq!(mgr.position_size(1.0, None), 2);
        // floor never drops below one contract
        assert_eq!(mgr.position_size(0.1, None), 1);
        // tier override wins but the session cap holds
        assert_eq!(mgr.position_size(1.0, Some(4)), 2);
        assert_eq!(mgr.position_size(1.0, Some(1)), 1);

        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5000.0), 0.5, None)
            .unwrap();
        assert_eq!(order.size, 1);
    }

    #[test]
    fn paper_slippage_moves_entry_against_trader() {
        let mut session = es_session();
        session.paper_slippage_ticks = 2;
        let mut mgr = ExecutionManager::new(session);

        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        // Long pays up.
        assert_eq!(order.entry_price, p(5000.50));

        let mut session = es_session();
        session.paper_slippage_ticks = 2;
        let mut mgr = ExecutionManager::new(session);
        let order = mgr
            .on_signal(&approved_signal(Direction::Short, 5000.0), 1.0, None)
            .unwrap();
        // Short sells down.
        assert_eq!(order.entry_price, p(4999.50));
    }

    #[test]
    fn close_all_positions_uses_given_price_and_reason() {
        let mut session = es_session();
        session.max_concurrent_trades = 3;
        let mut mgr = ExecutionManager::new(session);
        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.on_signal(&approved_signal(Direction::Long, 5001.0), 1.0, None)
            .unwrap();

        let trades = mgr.close_all_positions(p(5002.0), ExitReason::AutoFlatten, Utc::now());
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.exit_reason == ExitReason::AutoFlatten));
        assert!(trades.iter().all(|t| t.exit_price == p(5002.0)));
        assert!(mgr.open_positions().is_empty());
    }

    #[test]
    fn live_mode_queues_instead_of_filling() {
        let mut session = es_session();
        session.mode = Mode::Live;
        let mut mgr = ExecutionManager::new(session);

        let order = mgr
            .on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(mgr.open_positions().is_empty());
        assert_eq!(mgr.pending_orders().len(), 1);
    }

    #[test]
    fn trade_observers_fire_per_close() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut mgr = ExecutionManager::new(es_session());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        mgr.on_trade(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.update_prices(p(5006.0), Utc::now());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn monotone_counters() {
        let mut mgr = ExecutionManager::new(es_session());
        let mut last_len = 0;
        let mut last_pnl = mgr.daily_pnl();

        for i in 0..3 {
            mgr.on_signal(&approved_signal(Direction::Long, 5000.0 + i as f64), 1.0, None);
            let before = mgr.completed_trades().len();
            mgr.update_prices(p(4000.0), Utc::now());
            let after = mgr.completed_trades().len();
            assert!(after >= before);
            assert!(after >= last_len);
            last_len = after;
            // daily_pnl changes only when a trade closed.
            if after == before {
                assert!((mgr.daily_pnl() - last_pnl).abs() < 1e-9);
            }
            last_pnl = mgr.daily_pnl();
            if mgr.is_halted() {
                break;
            }
        }
    }

    #[test]
    fn statistics_roll_up() {
        let mut session = es_session();
        session.daily_profit_target = 10_000.0; // keep the session running
        let mut mgr = ExecutionManager::new(session);

        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.update_prices(p(5006.0), Utc::now()); // +300 win
        mgr.on_signal(&approved_signal(Direction::Long, 5000.0), 1.0, None)
            .unwrap();
        mgr.update_prices(p(4996.0), Utc::now()); // -200 loss

        let stats = mgr.statistics();
        assert_eq!(stats.total_trades, 2);
        assert!((stats.win_rate - 0.5).abs() < 1e-9);
        assert!((stats.total_pnl - 100.0).abs() < 1e-9);
        assert!((stats.largest_win - 300.0).abs() < 1e-9);
        assert!((stats.largest_loss + 200.0).abs() < 1e-9);
        assert!((stats.profit_factor - 1.5).abs() < 1e-9);
    }
}
