// =============================================================================
// True Range and Average True Range
// =============================================================================

use super::ema::ema;
use super::OhlcBar;

/// True Range per bar:
/// `max(high - low, |high - prev_close|, |low - prev_close|)`.
///
/// The first bar has no predecessor and uses its own high − low.
pub fn true_range(bars: &[OhlcBar]) -> Vec<f64> {
    if bars.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(bars.len());
    out.push(bars[0].high - bars[0].low);

    for i in 1..bars.len() {
        let prev_close = bars[i - 1].close;
        let bar = &bars[i];
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
        out.push(tr);
    }
    out
}

/// Average True Range: EMA of the true-range series.
pub fn atr(bars: &[OhlcBar], period: usize) -> Vec<f64> {
    ema(&true_range(bars), period)
}
