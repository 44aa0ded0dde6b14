// =============================================================================
// Order-flow engine and trading pipeline
// =============================================================================
//
// `OrderFlowEngine` owns the aggregation and detection stages: ticks in,
// (completed bar, signals) out. `TradingPipeline` composes it with the
// strategy router, execution manager, and tier manager, and enforces the
// bar-close ordering: cumulative state, then regime update, then signal
// evaluation, then execution, then mark-to-market at the bar close.
//
// Everything here runs on the single hot-path thread; observers are invoked
// synchronously in registration order.

use tracing::{debug, info, warn};

use crate::aggregator::{CumulativeDelta, FootprintAggregator, VolumeProfile};
use crate::capital::TierManager;
use crate::config::EngineConfig;
use crate::detectors::DetectorSet;
use crate::execution::{ExecutionManager, Trade};
use crate::notifications::{NotificationEvent, NotificationHub};
use crate::regime::StrategyRouter;
use crate::session::Mode;
use crate::symbols;
use crate::types::{FootprintBar, Price, Signal, Tick};

// ---------------------------------------------------------------------------
// OrderFlowEngine
// ---------------------------------------------------------------------------

pub struct OrderFlowEngine {
    symbol: String,
    aggregator: FootprintAggregator,
    cumulative_delta: CumulativeDelta,
    volume_profile: VolumeProfile,
    detectors: DetectorSet,

    tick_count: u64,
    bar_count: u64,
    signal_count: u64,
    dropped_ticks: u64,
}

impl OrderFlowEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let symbol = config.trading.symbol.clone();
        let spec = symbols::spec_for(&symbol);
        let profile = symbols::profile_for(&symbol);
        Self {
            aggregator: FootprintAggregator::new(
                &symbol,
                config.trading.timeframe_secs,
                spec.tick_size,
            ),
            cumulative_delta: CumulativeDelta::new(),
            volume_profile: VolumeProfile::new(),
            detectors: DetectorSet::new(&config.order_flow, &profile),
            symbol,
            tick_count: 0,
            bar_count: 0,
            signal_count: 0,
            dropped_ticks: 0,
        }
    }

    /// Process one tick. When the tick closes a bar, returns the bar and
    /// the signals its detectors produced, in production order.
    ///
    /// Ticks for other symbols are data errors: dropped, counted, logged.
    pub fn process_tick(&mut self, tick: &Tick) -> Option<(FootprintBar, Vec<Signal>)> {
        if tick.symbol != self.symbol {
            self.dropped_ticks += 1;
            warn!(
                expected = %self.symbol,
                got = %tick.symbol,
                "dropping tick for unknown symbol"
            );
            return None;
        }
        self.tick_count += 1;

        let bar = self.aggregator.process_tick(tick)?;
        self.bar_count += 1;

        self.cumulative_delta.update(&bar);
        self.volume_profile.add_bar(&bar);

        let signals = self.detectors.run(&bar);
        self.signal_count += signals.len() as u64;
        debug!(
            bar = %bar.start_time,
            delta = bar.delta(),
            volume = bar.total_volume(),
            signals = signals.len(),
            "bar analyzed"
        );
        Some((bar, signals))
    }

    pub fn cumulative_delta(&self) -> &CumulativeDelta {
        &self.cumulative_delta
    }

    pub fn volume_profile(&self) -> &VolumeProfile {
        &self.volume_profile
    }

    pub fn recent_bars(&self, n: usize) -> Vec<FootprintBar> {
        self.aggregator.recent_bars(n)
    }

    pub fn counts(&self) -> (u64, u64, u64, u64) {
        (
            self.tick_count,
            self.bar_count,
            self.signal_count,
            self.dropped_ticks,
        )
    }

    pub fn reset(&mut self) {
        self.aggregator.reset();
        self.cumulative_delta.reset();
        self.volume_profile.reset();
        self.detectors.reset();
        self.tick_count = 0;
        self.bar_count = 0;
        self.signal_count = 0;
        self.dropped_ticks = 0;
    }
}

// ---------------------------------------------------------------------------
// TradingPipeline
// ---------------------------------------------------------------------------

/// What one tick did to the system, for callers that persist or report.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub closed_bar: Option<FootprintBar>,
    pub signals: Vec<Signal>,
    pub new_trades: Vec<Trade>,
}

pub struct TradingPipeline {
    engine: OrderFlowEngine,
    router: StrategyRouter,
    manager: ExecutionManager,
    tier: Option<TierManager>,
    hub: NotificationHub,
    was_halted: bool,
}

impl TradingPipeline {
    pub fn new(
        engine: OrderFlowEngine,
        router: StrategyRouter,
        manager: ExecutionManager,
        tier: Option<TierManager>,
        hub: NotificationHub,
    ) -> Self {
        Self {
            engine,
            router,
            manager,
            tier,
            hub,
            was_halted: false,
        }
    }

    /// The single entry point into the hot path.
    pub fn process_tick(&mut self, tick: &Tick) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        // Live fills need intraday stop/target checks between bars.
        if self.manager.session().mode == Mode::Live {
            let before = self.manager.completed_trades().len();
            self.manager.update_prices(tick.price, tick.timestamp);
            self.absorb_trades(before, &mut outcome);
        }

        let Some((bar, signals)) = self.engine.process_tick(tick) else {
            return outcome;
        };

        // Regime first: evaluation depends on post-bar regime state.
        self.router.on_bar(&bar);

        // Evaluate and execute in production order. The stacked count for
        // tier sizing is the number of same-direction signals this bar.
        let evaluated: Vec<Signal> = signals
            .into_iter()
            .map(|s| self.router.evaluate(s))
            .collect();

        for signal in &evaluated {
            if !signal.approved {
                continue;
            }
            let stacked = evaluated
                .iter()
                .filter(|s| s.direction == signal.direction)
                .count() as u32;
            let tier_size = self
                .tier
                .as_ref()
                .map(|t| t.position_size(self.router.current_regime(), stacked));

            if let Some(order) =
                self.manager
                    .on_signal(signal, self.router.size_multiplier(), tier_size)
            {
                self.hub.publish(NotificationEvent::TradeOpened {
                    symbol: order.symbol.clone(),
                    side: order.side.to_string(),
                    size: order.size,
                    entry_price: order.entry_price.to_points(self.manager.tick_size()),
                    at: signal.timestamp,
                });
            }
        }

        // Mark to market at the bar close; all signals from this bar share
        // that price.
        let before = self.manager.completed_trades().len();
        self.manager.update_prices(bar.close, bar.end_time);
        self.absorb_trades(before, &mut outcome);

        outcome.signals = evaluated;
        outcome.closed_bar = Some(bar);
        outcome
    }

    /// Manual flatten used by the scheduler's auto-flatten callback.
    pub fn flatten_all(&mut self, price: Price, at: chrono::DateTime<chrono::Utc>) -> Vec<Trade> {
        let trades =
            self.manager
                .close_all_positions(price, crate::execution::ExitReason::AutoFlatten, at);
        for trade in &trades {
            self.record_trade(trade);
        }
        trades
    }

    fn absorb_trades(&mut self, from: usize, outcome: &mut TickOutcome) {
        let new: Vec<Trade> = self.manager.completed_trades()[from..].to_vec();
        for trade in &new {
            self.record_trade(trade);
        }
        outcome.new_trades.extend(new);
    }

    fn record_trade(&mut self, trade: &Trade) {
        if let Some(tier) = &mut self.tier {
            tier.record_trade(trade.pnl);
            // The tier's own loss limit can be tighter than the session's.
            if tier.should_halt(tier.state().session_pnl) && !self.manager.is_halted() {
                self.manager.halt("Tier daily loss limit reached");
            }
        }

        self.hub.publish(NotificationEvent::TradeClosed {
            trade: trade.clone(),
            daily_pnl: self.manager.daily_pnl(),
        });

        if self.manager.is_halted() && !self.was_halted {
            self.was_halted = true;
            let reason = self
                .manager
                .halt_reason()
                .unwrap_or("unspecified")
                .to_string();
            info!(reason = %reason, "publishing session halt");
            self.hub.publish(NotificationEvent::SessionHalted {
                reason,
                daily_pnl: self.manager.daily_pnl(),
                at: trade.exit_time,
            });
        }
    }

    pub fn engine(&self) -> &OrderFlowEngine {
        &self.engine
    }

    pub fn router(&self) -> &StrategyRouter {
        &self.router
    }

    pub fn manager(&self) -> &ExecutionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut ExecutionManager {
        &mut self.manager
    }

    pub fn tier(&self) -> Option<&TierManager> {
        self.tier.as_ref()
    }
}
