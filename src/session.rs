// =============================================================================
// Trading session — immutable per-session parameters and the RTH calendar
// =============================================================================
//
// Trading hours are a policy object chosen once at session construction:
// live trading uses the real RTH calendar, paper replay and backtests use
// the always-open variants. Nothing downstream branches on a bypass flag.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Paper simulates fills locally; live routes brackets to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Paper,
    Live,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paper => write!(f, "paper"),
            Self::Live => write!(f, "live"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session calendar (US equity-index RTH, Eastern time)
// ---------------------------------------------------------------------------

/// Regular session open, ET.
pub fn rth_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).expect("valid literal time")
}

/// Regular session close, ET.
pub fn rth_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).expect("valid literal time")
}

/// Holiday and early-close tables are data injected at construction; the
/// calendar itself only knows the weekly rhythm.
#[derive(Debug, Clone, Default)]
pub struct SessionCalendar {
    holidays: Vec<NaiveDate>,
    early_closes: Vec<(NaiveDate, NaiveTime)>,
}

impl SessionCalendar {
    pub fn new(holidays: Vec<NaiveDate>, early_closes: Vec<(NaiveDate, NaiveTime)>) -> Self {
        Self {
            holidays,
            early_closes,
        }
    }

    /// Weekday and not a listed holiday.
    pub fn is_trading_day(&self, at: DateTime<Utc>) -> bool {
        let local = at.with_timezone(&New_York);
        let date = local.date_naive();
        !matches!(local.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Close time for the given date, honoring early closes.
    pub fn close_time(&self, at: DateTime<Utc>) -> NaiveTime {
        let date = at.with_timezone(&New_York).date_naive();
        self.early_closes
            .iter()
            .find(|(d, _)| *d == date)
            .map(|(_, t)| *t)
            .unwrap_or_else(rth_close)
    }

    /// Minutes elapsed since the session open; clamped at zero pre-open.
    pub fn minutes_since_open(&self, at: DateTime<Utc>) -> i64 {
        let local = at.with_timezone(&New_York).time();
        (minutes_of(local) - minutes_of(rth_open())).max(0)
    }

    /// Minutes remaining to the session close; clamped at zero post-close.
    pub fn minutes_to_close(&self, at: DateTime<Utc>) -> i64 {
        let local = at.with_timezone(&New_York).time();
        (minutes_of(self.close_time(at)) - minutes_of(local)).max(0)
    }

    /// Inside regular trading hours on a trading day.
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        if !self.is_trading_day(at) {
            return false;
        }
        let local = at.with_timezone(&New_York).time();
        local >= rth_open() && local < self.close_time(at)
    }

    /// A Utc instant for today's ET wall-clock time; used by the scheduler.
    pub fn today_at(&self, now: DateTime<Utc>, t: NaiveTime) -> DateTime<Utc> {
        let local = now.with_timezone(&New_York);
        New_York
            .from_local_datetime(&local.date_naive().and_time(t))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(now)
    }
}

fn minutes_of(t: NaiveTime) -> i64 {
    use chrono::Timelike;
    t.hour() as i64 * 60 + t.minute() as i64
}

// ---------------------------------------------------------------------------
// Trading-hours policy
// ---------------------------------------------------------------------------

/// Gate consulted by the execution engine before opening new risk.
pub trait TradingHours: Send + Sync {
    fn is_open(&self, at: DateTime<Utc>) -> bool;
    fn name(&self) -> &'static str;
}

/// Regular trading hours against the injected calendar.
pub struct RthHours {
    calendar: SessionCalendar,
}

impl RthHours {
    pub fn new(calendar: SessionCalendar) -> Self {
        Self { calendar }
    }
}

impl TradingHours for RthHours {
    fn is_open(&self, at: DateTime<Utc>) -> bool {
        self.calendar.is_open(at)
    }

    fn name(&self) -> &'static str {
        "rth"
    }
}

/// Never gates. For overnight experiments and demo sessions.
pub struct AlwaysOpen;

impl TradingHours for AlwaysOpen {
    fn is_open(&self, _at: DateTime<Utc>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "always-open"
    }
}

/// Never gates; replay timestamps are historical so the wall clock is
/// meaningless.
pub struct BacktestHours;

impl TradingHours for BacktestHours {
    fn is_open(&self, _at: DateTime<Utc>) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "backtest"
    }
}

// ---------------------------------------------------------------------------
// Trading session
// ---------------------------------------------------------------------------

/// Immutable risk and execution parameters for one trading session.
pub struct TradingSession {
    pub mode: Mode,
    pub symbol: String,
    pub daily_profit_target: f64,
    /// Negative dollars.
    pub daily_loss_limit: f64,
    pub max_position_size: u32,
    pub max_concurrent_trades: usize,
    pub stop_loss_ticks: i64,
    pub take_profit_ticks: i64,
    pub paper_starting_balance: f64,
    pub paper_slippage_ticks: i64,
    pub conservative_fills: bool,
    pub hours: Box<dyn TradingHours>,
}

impl TradingSession {
    /// Validate the invariants the engine depends on. Violations are
    /// configuration errors and stop construction.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.daily_loss_limit >= 0.0 {
            return Err(EngineError::config(format!(
                "daily_loss_limit must be negative, got {}",
                self.daily_loss_limit
            )));
        }
        if self.daily_profit_target <= 0.0 {
            return Err(EngineError::config(format!(
                "daily_profit_target must be positive, got {}",
                self.daily_profit_target
            )));
        }
        if self.stop_loss_ticks <= 0 || self.take_profit_ticks <= 0 {
            return Err(EngineError::config(
                "stop_loss_ticks and take_profit_ticks must be positive",
            ));
        }
        if self.max_position_size == 0 {
            return Err(EngineError::config("max_position_size must be at least 1"));
        }
        Ok(())
    }

    pub fn is_within_trading_hours(&self, at: DateTime<Utc>) -> bool {
        self.hours.is_open(at)
    }
}
