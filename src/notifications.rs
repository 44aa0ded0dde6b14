// =============================================================================
// Notifications — typed events, outbound queue, async drain
// =============================================================================
//
// The hot path publishes structured events onto an unbounded channel and
// returns immediately; a tokio task drains the queue and hands each event
// to the configured `Notifier` with a per-send timeout. Transport content
// (Discord embeds, etc.) is entirely the notifier's concern. A failing or
// slow notifier can never stall tick processing.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::execution::manager::SessionStats;
use crate::execution::Trade;
use crate::types::Regime;

/// Everything the core will ever tell the outside world.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    SessionStarted {
        symbol: String,
        mode: String,
        balance: f64,
        at: DateTime<Utc>,
    },
    TradeOpened {
        symbol: String,
        side: String,
        size: u32,
        entry_price: f64,
        at: DateTime<Utc>,
    },
    TradeClosed {
        trade: Trade,
        daily_pnl: f64,
    },
    SessionHalted {
        reason: String,
        daily_pnl: f64,
        at: DateTime<Utc>,
    },
    ConnectionLost {
        feed: String,
        at: DateTime<Utc>,
    },
    ConnectionRestored {
        feed: String,
        at: DateTime<Utc>,
    },
    DailyDigest {
        date: String,
        stats: SessionStats,
        regime_breakdown: Vec<(Regime, u32)>,
        ending_balance: f64,
    },
    SystemError {
        context: String,
        error: String,
        at: DateTime<Utc>,
    },
}

/// Transport contract. Implementations live outside the core.
pub trait Notifier: Send + 'static {
    fn send(
        &mut self,
        event: NotificationEvent,
    ) -> impl std::future::Future<Output = Result<(), String>> + Send;
}

/// Per-send timeout applied by the drain task.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloneable handle the hot path publishes through.
#[derive(Clone)]
pub struct NotificationHub {
    tx: mpsc::UnboundedSender<NotificationEvent>,
}

impl NotificationHub {
    /// Create the hub and spawn the drain task on the current runtime.
    pub fn spawn<N: Notifier>(notifier: N) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(notifier, rx));
        Self { tx }
    }

    /// Create a hub whose events are dropped unread. For replay and tests.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::unbounded_channel();
        Self { tx }
    }

    /// Non-blocking publish. Errors only if the drain task is gone, which
    /// is not worth surfacing to the tick pipeline.
    pub fn publish(&self, event: NotificationEvent) {
        if self.tx.send(event).is_err() {
            debug!("notification dropped: drain task not running");
        }
    }
}

/// Default transport: structured log lines. Real deployments swap in a
/// webhook-backed notifier through the same trait.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&mut self, event: NotificationEvent) -> Result<(), String> {
        match serde_json::to_string(&event) {
            Ok(json) => {
                tracing::info!(event = event_label(&event), payload = %json, "notification");
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

async fn drain<N: Notifier>(mut notifier: N, mut rx: mpsc::UnboundedReceiver<NotificationEvent>) {
    while let Some(event) = rx.recv().await {
        let label = event_label(&event);
        match tokio::time::timeout(SEND_TIMEOUT, notifier.send(event)).await {
            Ok(Ok(())) => debug!(event = label, "notification delivered"),
            Ok(Err(e)) => warn!(event = label, error = %e, "notification send failed"),
            Err(_) => warn!(event = label, "notification send timed out"),
        }
    }
}

fn event_label(event: &NotificationEvent) -> &'static str {
    match event {
        NotificationEvent::SessionStarted { .. } => "session_started",
        NotificationEvent::TradeOpened { .. } => "trade_opened",
        NotificationEvent::TradeClosed { .. } => "trade_closed",
        NotificationEvent::SessionHalted { .. } => "session_halted",
        NotificationEvent::ConnectionLost { .. } => "connection_lost",
        NotificationEvent::ConnectionRestored { .. } => "connection_restored",
        NotificationEvent::DailyDigest { .. } => "daily_digest",
        NotificationEvent::SystemError { .. } => "system_error",
    }
}
