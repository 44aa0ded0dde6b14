// =============================================================================
// Shared types used across the tapeflow trading core
// =============================================================================
//
// Prices are fixed-point: a `Price` is an integer count of the instrument's
// tick size. All price arithmetic (bracket offsets, P&L, level adjacency)
// happens in whole ticks; floating point only appears at the display and
// indicator boundaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Aggressor side and trade direction
// ---------------------------------------------------------------------------

/// Trade aggressor: which side of the book the market order hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// A market sell lifted the bid (sell-aggressor).
    Bid,
    /// A market buy lifted the offer (buy-aggressor).
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "BID"),
            Self::Ask => write!(f, "ASK"),
        }
    }
}

/// Direction of a signal, bracket, or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short. Used in P&L sign math.
    pub fn sign(self) -> i64 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed-point price
// ---------------------------------------------------------------------------

/// A price expressed as an integer number of ticks of the instrument's tick
/// size. Only comparable within a single instrument.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Build from a raw decimal price, snapping to the nearest tick.
    pub fn from_points(points: f64, tick_size: f64) -> Self {
        Price((points / tick_size).round() as i64)
    }

    /// Build directly from a tick count.
    pub fn from_ticks(ticks: i64) -> Self {
        Price(ticks)
    }

    /// The raw tick count.
    pub fn ticks(self) -> i64 {
        self.0
    }

    /// Convert back to a decimal price for display or indicator math.
    pub fn to_points(self, tick_size: f64) -> f64 {
        self.0 as f64 * tick_size
    }

    /// Offset by a signed number of ticks.
    pub fn offset(self, ticks: i64) -> Price {
        Price(self.0 + ticks)
    }

    /// Signed distance to `other` in ticks.
    pub fn ticks_from(self, other: Price) -> i64 {
        self.0 - other.0
    }
}

// ---------------------------------------------------------------------------
// Ticks and footprint bars
// ---------------------------------------------------------------------------

/// A single trade execution from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    /// Already snapped to the instrument's tick grid.
    pub price: Price,
    pub volume: u64,
    pub side: Side,
    pub symbol: String,
}

/// Aggregated volume at a single price within a bar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    /// Sell market orders hitting the bid.
    pub bid_volume: u64,
    /// Buy market orders lifting the offer.
    pub ask_volume: u64,
}

impl PriceLevel {
    pub fn new(price: Price) -> Self {
        Self {
            price,
            bid_volume: 0,
            ask_volume: 0,
        }
    }

    pub fn total_volume(&self) -> u64 {
        self.bid_volume + self.ask_volume
    }

    /// Delta at this level: buy volume minus sell volume.
    pub fn delta(&self) -> i64 {
        self.ask_volume as i64 - self.bid_volume as i64
    }
}

/// A time-based bar carrying volume at each traded price level.
///
/// Levels live in a `BTreeMap` keyed by `Price`, so iteration is always in
/// ascending price order — the order every detector wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootprintBar {
    pub symbol: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Bar duration in seconds.
    pub timeframe_secs: u32,
    /// Tick size captured at bar open, for rendering `Price` values.
    pub tick_size: f64,

    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,

    pub levels: BTreeMap<Price, PriceLevel>,
}

impl FootprintBar {
    pub fn total_volume(&self) -> u64 {
        self.levels.values().map(PriceLevel::total_volume).sum()
    }

    /// Bar delta: total buy volume minus total sell volume.
    pub fn delta(&self) -> i64 {
        self.levels.values().map(PriceLevel::delta).sum()
    }

    pub fn buy_volume(&self) -> u64 {
        self.levels.values().map(|l| l.ask_volume).sum()
    }

    pub fn sell_volume(&self) -> u64 {
        self.levels.values().map(|l| l.bid_volume).sum()
    }

    /// High minus low, in ticks.
    pub fn range_ticks(&self) -> i64 {
        self.high.ticks_from(self.low)
    }

    /// Levels in ascending price order.
    pub fn sorted_levels(&self) -> Vec<&PriceLevel> {
        self.levels.values().collect()
    }

    /// Where the close sits inside the bar range: 0.0 = at the low,
    /// 1.0 = at the high. `None` for zero-range bars.
    pub fn close_position(&self) -> Option<f64> {
        let range = self.range_ticks();
        if range == 0 {
            return None;
        }
        Some(self.close.ticks_from(self.low) as f64 / range as f64)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// All detectable order-flow patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalPattern {
    BuyImbalance,
    SellImbalance,
    StackedBuyImbalance,
    StackedSellImbalance,
    BuyingExhaustion,
    SellingExhaustion,
    BullishDeltaDivergence,
    BearishDeltaDivergence,
    BuyingAbsorption,
    SellingAbsorption,
    UnfinishedHigh,
    UnfinishedLow,
    UnfinishedRevisited,
}

impl std::fmt::Display for SignalPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BuyImbalance => "BUY_IMBALANCE",
            Self::SellImbalance => "SELL_IMBALANCE",
            Self::StackedBuyImbalance => "STACKED_BUY_IMBALANCE",
            Self::StackedSellImbalance => "STACKED_SELL_IMBALANCE",
            Self::BuyingExhaustion => "BUYING_EXHAUSTION",
            Self::SellingExhaustion => "SELLING_EXHAUSTION",
            Self::BullishDeltaDivergence => "BULLISH_DELTA_DIVERGENCE",
            Self::BearishDeltaDivergence => "BEARISH_DELTA_DIVERGENCE",
            Self::BuyingAbsorption => "BUYING_ABSORPTION",
            Self::SellingAbsorption => "SELLING_ABSORPTION",
            Self::UnfinishedHigh => "UNFINISHED_HIGH",
            Self::UnfinishedLow => "UNFINISHED_LOW",
            Self::UnfinishedRevisited => "UNFINISHED_REVISITED",
        };
        write!(f, "{s}")
    }
}

/// Per-pattern detail payload. Each detector emits exactly the fields that
/// matter for its pattern; nothing is stringly typed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalDetails {
    Imbalance {
        ratio: f64,
        dominant_volume: u64,
        opposing_volume: u64,
    },
    StackedImbalance {
        stack_size: usize,
        bottom_price: Price,
        top_price: Price,
    },
    Exhaustion {
        consecutive_declines: usize,
        decline_pct: f64,
        volumes: Vec<u64>,
    },
    Absorption {
        aggressor_volume: u64,
        total_volume: u64,
        close_position: f64,
    },
    Divergence {
        extreme_price: Price,
        current_delta: i64,
    },
    Unfinished {
        bid_volume: u64,
        ask_volume: u64,
    },
    Revisit {
        original_time: DateTime<Utc>,
    },
}

/// Output of pattern detection, later annotated by the strategy router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub pattern: SignalPattern,
    pub direction: Direction,
    /// Normalized to [0, 1] at construction.
    pub strength: f64,
    pub price: Price,
    pub details: SignalDetails,

    // Annotated by the router.
    pub regime: Option<Regime>,
    pub approved: bool,
    pub rejection_reason: Option<String>,
}

impl Signal {
    /// Build a signal with its strength clamped into [0, 1].
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: &str,
        pattern: SignalPattern,
        direction: Direction,
        strength: f64,
        price: Price,
        details: SignalDetails,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.to_string(),
            pattern,
            direction,
            strength: strength.clamp(0.0, 1.0),
            price,
            details,
            regime: None,
            approved: false,
            rejection_reason: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Regime
// ---------------------------------------------------------------------------

/// Market regime classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    NoTrade,
}

impl Regime {
    pub fn is_trending(self) -> bool {
        matches!(self, Self::TrendingUp | Self::TrendingDown)
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TrendingUp => "TRENDING_UP",
            Self::TrendingDown => "TRENDING_DOWN",
            Self::Ranging => "RANGING",
            Self::Volatile => "VOLATILE",
            Self::NoTrade => "NO_TRADE",
        };
        write!(f, "{s}")
    }
}

/// Everything the regime classifier looks at, recomputed per completed bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeInputs {
    // Trend strength
    pub adx_14: f64,
    pub adx_slope: f64,

    // Trend direction
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// Fast minus slow.
    pub ema_trend: f64,
    pub price_vs_vwap: f64,

    // Volatility
    pub atr_14: f64,
    /// Where the current ATR sits versus recent history, 0–100.
    pub atr_percentile: f64,
    pub bar_range_avg: f64,

    // Volume / delta
    pub volume_vs_average: f64,
    pub cumulative_delta: i64,
    pub delta_slope: f64,

    // Market structure
    pub higher_highs: bool,
    pub higher_lows: bool,
    pub lower_highs: bool,
    pub lower_lows: bool,
    pub range_bound_bars: u32,

    // Time context
    pub minutes_since_open: i64,
    pub minutes_to_close: i64,
    pub is_news_window: bool,
}

impl Default for RegimeInputs {
    fn default() -> Self {
        Self {
            adx_14: 0.0,
            adx_slope: 0.0,
            ema_fast: 0.0,
            ema_slow: 0.0,
            ema_trend: 0.0,
            price_vs_vwap: 0.0,
            atr_14: 0.0,
            atr_percentile: 50.0,
            bar_range_avg: 0.0,
            volume_vs_average: 1.0,
            cumulative_delta: 0,
            delta_slope: 0.0,
            higher_highs: false,
            higher_lows: false,
            lower_highs: false,
            lower_lows: false,
            range_bound_bars: 0,
            minutes_since_open: 0,
            minutes_to_close: 390,
            is_news_window: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
