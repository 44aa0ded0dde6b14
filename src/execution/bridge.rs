// =============================================================================
// Execution Bridge — broker adapter contract and live-order plumbing
// =============================================================================
//
// The broker itself is an external collaborator; the core only sees the
// `BrokerAdapter` trait. Submissions retry with exponential backoff. Fills
// and rejections arrive on a channel and are marshaled back onto the hot
// path by `pump_events` — broker callbacks never mutate engine state from
// another task.
//
// On startup the bridge reconciles positions: if the broker reports any
// position the engine does not own, the session halts for manual repair.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::types::{Direction, Price, Signal};

use super::manager::ExecutionManager;
use super::orders::{BracketOrder, OrderStatus};

/// Halt reason used when the broker and engine disagree at startup.
pub const RECONCILE_HALT_REASON: &str =
    "Position mismatch on startup — manual reconciliation required";

/// A working order acknowledged by the broker.
#[derive(Debug, Clone)]
pub struct LiveOrder {
    pub order_id: String,
    pub bracket_id: String,
    pub symbol: String,
    pub side: Direction,
    pub size: u32,
}

/// A position as the broker reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerPosition {
    pub symbol: String,
    pub side: Direction,
    pub size: u32,
}

/// Asynchronous events delivered by the adapter.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    Fill { bracket_id: String, price: Price },
    Rejection { bracket_id: String, reason: String },
}

/// Contract every broker integration must satisfy.
pub trait BrokerAdapter: Send {
    fn submit_bracket_order(
        &mut self,
        order: &BracketOrder,
        stop_ticks: i64,
        target_ticks: i64,
    ) -> impl std::future::Future<Output = Result<LiveOrder, EngineError>> + Send;

    fn exit_position(
        &mut self,
        symbol: &str,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    fn cancel_all_orders(
        &mut self,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;

    fn reconcile_positions(
        &mut self,
    ) -> impl std::future::Future<Output = Result<Vec<BrokerPosition>, EngineError>> + Send;
}

/// Exponential backoff schedule and per-call timeout for submissions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_attempts: 4,
            call_timeout: Duration::from_secs(10),
        }
    }
}

pub struct ExecutionBridge<B: BrokerAdapter> {
    adapter: B,
    retry: RetryPolicy,
    events_rx: mpsc::UnboundedReceiver<BrokerEvent>,
    /// Pending brackets awaiting a fill, keyed by bracket id, with the
    /// originating signal for position context.
    pending: HashMap<String, (BracketOrder, Signal)>,
    /// Brackets the broker rejected, annotated with the rejection text.
    rejected: Vec<BracketOrder>,
}

impl<B: BrokerAdapter> ExecutionBridge<B> {
    /// Build the bridge. The returned sender is handed to the adapter's
    /// event source so fills flow into `pump_events`.
    pub fn new(adapter: B, retry: RetryPolicy) -> (Self, mpsc::UnboundedSender<BrokerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                adapter,
                retry,
                events_rx: rx,
                pending: HashMap::new(),
                rejected: Vec::new(),
            },
            tx,
        )
    }

    /// Compare broker positions to the engine's on startup. Any position
    /// the engine does not own halts the session.
    pub async fn reconcile_on_startup(
        &mut self,
        manager: &mut ExecutionManager,
    ) -> Result<(), EngineError> {
        let broker_positions = self.adapter.reconcile_positions().await?;
        for bp in &broker_positions {
            let owned = manager
                .open_positions()
                .iter()
                .any(|p| p.symbol == bp.symbol && p.side == bp.side && p.size == bp.size);
            if !owned {
                error!(symbol = %bp.symbol, side = %bp.side, size = bp.size,
                    "broker reports a position the engine does not own");
                manager.halt(RECONCILE_HALT_REASON);
                return Err(EngineError::Reconciliation(RECONCILE_HALT_REASON.into()));
            }
        }
        info!(
            broker_positions = broker_positions.len(),
            "startup reconciliation clean"
        );
        Ok(())
    }

    /// Submit a bracket with exponential backoff. Persistent failure is a
    /// `BrokerError`; the caller decides whether it halts the session.
    pub async fn submit_bracket(
        &mut self,
        mut order: BracketOrder,
        signal: Signal,
        stop_ticks: i64,
        target_ticks: i64,
    ) -> Result<LiveOrder, EngineError> {
        let mut delay = self.retry.base_delay;
        let mut last_err = None;

        for attempt in 1..=self.retry.max_attempts {
            let submit = self.adapter.submit_bracket_order(&order, stop_ticks, target_ticks);
            let result = match tokio::time::timeout(self.retry.call_timeout, submit).await {
                Ok(result) => result,
                Err(_) => Err(EngineError::broker("submission timed out")),
            };
            match result {
                Ok(live) => {
                    order.status = OrderStatus::Submitted;
                    info!(
                        bracket_id = %order.bracket_id,
                        order_id = %live.order_id,
                        attempt,
                        "bracket submitted"
                    );
                    self.pending.insert(order.bracket_id.clone(), (order, signal));
                    return Ok(live);
                }
                Err(e) => {
                    warn!(
                        bracket_id = %order.bracket_id,
                        attempt,
                        error = %e,
                        "bracket submission failed"
                    );
                    last_err = Some(e);
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| EngineError::broker("submission failed with no error")))
    }

    /// Drain queued broker events and apply them to the engine. Runs on the
    /// hot path between ticks; never blocks.
    pub fn pump_events(&mut self, manager: &mut ExecutionManager) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                BrokerEvent::Fill { bracket_id, price } => {
                    match self.pending.remove(&bracket_id) {
                        Some((mut order, signal)) => {
                            order.status = OrderStatus::Filled;
                            order.entry_price = price;
                            manager.fill_bracket(&order, &signal);
                        }
                        None => warn!(%bracket_id, "fill for unknown bracket"),
                    }
                }
                BrokerEvent::Rejection { bracket_id, reason } => {
                    match self.pending.remove(&bracket_id) {
                        Some((mut order, _)) => {
                            order.status = OrderStatus::Rejected;
                            order.rejection_text = Some(reason.clone());
                            warn!(%bracket_id, %reason, "bracket rejected by broker");
                            self.rejected.push(order);
                        }
                        None => warn!(%bracket_id, "rejection for unknown bracket"),
                    }
                }
            }
        }
    }

    /// Flatten at the broker and cancel all working orders.
    pub async fn emergency_exit(&mut self, symbol: &str) -> Result<(), EngineError> {
        self.adapter.cancel_all_orders().await?;
        self.adapter.exit_position(symbol).await?;
        self.pending.clear();
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Brackets the broker refused, with their rejection text.
    pub fn rejected_orders(&self) -> &[BracketOrder] {
        &self.rejected
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::session::{AlwaysOpen, Mode, TradingSession};
    use crate::types::{SignalDetails, SignalPattern};

    const TICK: f64 = 0.25;

    /// Scripted adapter: fails `fail_first` submissions, then succeeds.
    struct MockBroker {
        fail_first: u32,
        submissions: u32,
        positions: Vec<BrokerPosition>,
    }

    impl BrokerAdapter for MockBroker {
        async fn submit_bracket_order(
            &mut self,
            order: &BracketOrder,
            _stop_ticks: i64,
            _target_ticks: i64,
        ) -> Result<LiveOrder, EngineError> {
            self.submissions += 1;
            if self.submissions <= self.fail_first {
                return Err(EngineError::broker("gateway timeout"));
            }
            Ok(LiveOrder {
                order_id: format!("ord-{}", self.submissions),
                bracket_id: order.bracket_id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                size: order.size,
            })
        }

        async fn exit_position(&mut self, _symbol: &str) -> Result<(), EngineError> {
            Ok(())
        }

        async fn cancel_all_orders(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        async fn reconcile_positions(&mut self) -> Result<Vec<BrokerPosition>, EngineError> {
            Ok(self.positions.clone())
        }
    }

    fn live_session() -> TradingSession {
        TradingSession {
            mode: Mode::Live,
            symbol: "ES".into(),
            daily_profit_target: 500.0,
            daily_loss_limit: -300.0,
            max_position_size: 1,
            max_concurrent_trades: 1,
            stop_loss_ticks: 16,
            take_profit_ticks: 24,
            paper_starting_balance: 0.0,
            paper_slippage_ticks: 0,
            conservative_fills: false,
            hours: Box::new(AlwaysOpen),
        }
    }

    fn signal() -> Signal {
        let mut s = Signal::new(
            Utc::now(),
            "ES",
            SignalPattern::BuyImbalance,
            Direction::Long,
            0.8,
            Price::from_points(5000.0, TICK),
            SignalDetails::Imbalance {
                ratio: 5.0,
                dominant_volume: 50,
                opposing_volume: 10,
            },
        );
        s.approved = true;
        s
    }

    fn bracket() -> BracketOrder {
        BracketOrder::new(
            "ES",
            Direction::Long,
            1,
            Price::from_points(5000.0, TICK),
            Price::from_points(4996.0, TICK),
            Price::from_points(5006.0, TICK),
            Utc::now(),
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_attempts: 3,
            call_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn submit_retries_until_success() {
        let broker = MockBroker { fail_first: 2, submissions: 0, positions: vec![] };
        let (mut bridge, _tx) = ExecutionBridge::new(broker, fast_retry());

        let live = bridge
            .submit_bracket(bracket(), signal(), 16, 24)
            .await
            .expect("third attempt succeeds");
        assert_eq!(live.order_id, "ord-3");
        assert_eq!(bridge.pending_count(), 1);
    }

    #[tokio::test]
    async fn submit_gives_up_after_max_attempts() {
        let broker = MockBroker { fail_first: 10, submissions: 0, positions: vec![] };
        let (mut bridge, _tx) = ExecutionBridge::new(broker, fast_retry());

        let err = bridge
            .submit_bracket(bracket(), signal(), 16, 24)
            .await
            .expect_err("all attempts fail");
        assert!(matches!(err, EngineError::Broker(_)));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn fill_event_creates_position() {
        let broker = MockBroker { fail_first: 0, submissions: 0, positions: vec![] };
        let (mut bridge, tx) = ExecutionBridge::new(broker, fast_retry());
        let mut manager = ExecutionManager::new(live_session());

        let order = bracket();
        let bracket_id = order.bracket_id.clone();
        bridge.submit_bracket(order, signal(), 16, 24).await.unwrap();

        tx.send(BrokerEvent::Fill {
            bracket_id,
            price: Price::from_points(5000.25, TICK),
        })
        .unwrap();
        bridge.pump_events(&mut manager);

        assert_eq!(manager.open_positions().len(), 1);
        assert_eq!(
            manager.open_positions()[0].entry_price,
            Price::from_points(5000.25, TICK)
        );
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn rejection_event_drops_pending() {
        let broker = MockBroker { fail_first: 0, submissions: 0, positions: vec![] };
        let (mut bridge, tx) = ExecutionBridge::new(broker, fast_retry());
        let mut manager = ExecutionManager::new(live_session());

        let order = bracket();
        let bracket_id = order.bracket_id.clone();
        bridge.submit_bracket(order, signal(), 16, 24).await.unwrap();

        tx.send(BrokerEvent::Rejection {
            bracket_id,
            reason: "insufficient margin".into(),
        })
        .unwrap();
        bridge.pump_events(&mut manager);

        assert!(manager.open_positions().is_empty());
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn reconciliation_mismatch_halts() {
        let broker = MockBroker {
            fail_first: 0,
            submissions: 0,
            positions: vec![BrokerPosition {
                symbol: "ES".into(),
                side: Direction::Long,
                size: 1,
            }],
        };
        let (mut bridge, _tx) = ExecutionBridge::new(broker, fast_retry());
        let mut manager = ExecutionManager::new(live_session());

        let err = bridge
            .reconcile_on_startup(&mut manager)
            .await
            .expect_err("mismatch must error");
        assert!(matches!(err, EngineError::Reconciliation(_)));
        assert!(manager.is_halted());
        assert_eq!(manager.halt_reason(), Some(RECONCILE_HALT_REASON));
    }

    #[tokio::test]
    async fn reconciliation_clean_when_flat() {
        let broker = MockBroker { fail_first: 0, submissions: 0, positions: vec![] };
        let (mut bridge, _tx) = ExecutionBridge::new(broker, fast_retry());
        let mut manager = ExecutionManager::new(live_session());

        bridge.reconcile_on_startup(&mut manager).await.unwrap();
        assert!(!manager.is_halted());
    }
}
