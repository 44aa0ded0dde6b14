// =============================================================================
// Order, position, and trade records
// =============================================================================
//
// Bracket life-cycle: Pending -> Submitted -> Filled -> Closed, with
// Rejected and Cancelled as terminal exits from the first two states.
// A Position is created on fill and is the sole unit mark-to-market works
// on; closing it produces an immutable Trade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Direction, Price};

/// Short random id, unique enough for session-scoped records.
pub fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

// ---------------------------------------------------------------------------
// Bracket orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Filled,
    Closed,
    Rejected,
    Cancelled,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Filled => "FILLED",
            Self::Closed => "CLOSED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// One logical order that brackets an entry with a stop and a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BracketOrder {
    pub bracket_id: String,
    pub symbol: String,
    pub side: Direction,
    pub size: u32,
    pub entry_price: Price,
    pub stop_price: Price,
    pub target_price: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    /// Broker rejection text, when status is Rejected.
    pub rejection_text: Option<String>,
}

impl BracketOrder {
    pub fn new(
        symbol: &str,
        side: Direction,
        size: u32,
        entry_price: Price,
        stop_price: Price,
        target_price: Price,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            bracket_id: short_id(),
            symbol: symbol.to_string(),
            side,
            size,
            entry_price,
            stop_price,
            target_price,
            status: OrderStatus::Pending,
            created_at,
            rejection_text: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Submitted | OrderStatus::Filled)
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Closed | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// An open position. Tick size and value are captured at entry so a symbol
/// or tier change mid-session can never corrupt the P&L of a working
/// position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub position_id: String,
    pub bracket_id: String,
    pub symbol: String,
    pub side: Direction,
    pub size: u32,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub current_price: Price,
    pub unrealized_pnl: f64,
    pub stop_price: Price,
    pub target_price: Price,
    /// Entry snapshot.
    pub tick_size: f64,
    /// Entry snapshot.
    pub tick_value: f64,
    /// Entry context carried into the trade record.
    pub signal_pattern: Option<String>,
    pub regime: Option<String>,
}

impl Position {
    /// Recompute unrealized P&L against `current_price` using the entry
    /// snapshots. Returns the new value.
    pub fn update_pnl(&mut self, current_price: Price) -> f64 {
        self.current_price = current_price;
        let ticks = current_price.ticks_from(self.entry_price) * self.side.sign();
        self.unrealized_pnl = ticks as f64 * self.tick_value * self.size as f64;
        self.unrealized_pnl
    }

    /// Signed P&L in ticks for an exit at `exit_price`.
    pub fn pnl_ticks_at(&self, exit_price: Price) -> i64 {
        exit_price.ticks_from(self.entry_price) * self.side.sign()
    }
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Target,
    Stop,
    Manual,
    Halted,
    Timeout,
    AutoFlatten,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Target => "TARGET",
            Self::Stop => "STOP",
            Self::Manual => "MANUAL",
            Self::Halted => "HALTED",
            Self::Timeout => "TIMEOUT",
            Self::AutoFlatten => "AUTO_FLATTEN",
        };
        write!(f, "{s}")
    }
}

/// An immutable completed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    pub bracket_id: String,
    pub symbol: String,
    pub side: Direction,
    pub size: u32,
    pub entry_price: Price,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Price,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_ticks: i64,
    pub signal_pattern: Option<String>,
    pub regime: Option<String>,
}

impl Trade {
    /// Build the record for a position exiting at `exit_price`.
    pub fn from_close(
        position: &Position,
        exit_price: Price,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) -> Self {
        let pnl_ticks = position.pnl_ticks_at(exit_price);
        let pnl = pnl_ticks as f64 * position.tick_value * position.size as f64;
        Self {
            trade_id: short_id(),
            bracket_id: position.bracket_id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            size: position.size,
            entry_price: position.entry_price,
            entry_time: position.entry_time,
            exit_price,
            exit_time,
            exit_reason,
            pnl,
            pnl_ticks,
            signal_pattern: position.signal_pattern.clone(),
            regime: position.regime.clone(),
        }
    }
}
