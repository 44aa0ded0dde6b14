// =============================================================================
// Technical indicators for regime detection
// =============================================================================
//
// All functions operate on plain `f64` series or `OhlcBar` slices extracted
// from footprint bars; none of them know about fixed-point prices. Each
// series-producing indicator returns a vector the same length as its input
// so callers can index positionally.

pub mod adx;
pub mod atr;
pub mod ema;
pub mod structure;
pub mod vwap;

pub use adx::adx;
pub use atr::{atr, true_range};
pub use ema::{ema, sma};
pub use structure::{
    avg_bar_range, higher_highs, higher_lows, lower_highs, lower_lows, percentile_rank,
    range_bound_count, slope,
};
pub use vwap::vwap;

/// Plain OHLCV bar used by the indicator pipeline.
#[derive(Debug, Clone, Copy)]
pub struct OhlcBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl OhlcBar {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// (high + low + close) / 3 — the anchor price for VWAP.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

impl From<&crate::types::FootprintBar> for OhlcBar {
    fn from(bar: &crate::types::FootprintBar) -> Self {
        let ts = bar.tick_size;
        Self {
            open: bar.open.to_points(ts),
            high: bar.high.to_points(ts),
            low: bar.low.to_points(ts),
            close: bar.close.to_points(ts),
            volume: bar.total_volume(),
        }
    }
}
