// =============================================================================
// Volume-Weighted Average Price
// =============================================================================

use super::OhlcBar;

/// Cumulative VWAP from the start of the slice (i.e. from session start when
/// the caller feeds session bars). Zero-volume prefixes fall back to the
/// typical price.
pub fn vwap(bars: &[OhlcBar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut cum_volume = 0u64;
    let mut cum_pv = 0.0_f64;

    for bar in bars {
        let typical = bar.typical_price();
        cum_pv += typical * bar.volume as f64;
        cum_volume += bar.volume;

        out.push(if cum_volume > 0 {
            cum_pv / cum_volume as f64
        } else {
            typical
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_by_volume() {
        let bars = [
            OhlcBar { open: 0.0, high: 10.0, low: 10.0, close: 10.0, volume: 1 },
            OhlcBar { open: 0.0, high: 20.0, low: 20.0, close: 20.0, volume: 3 },
        ];
        let values = vwap(&bars);
        assert!((values[0] - 10.0).abs() < 1e-10);
        // (10*1 + 20*3) / 4 = 17.5
        assert!((values[1] - 17.5).abs() < 1e-10);
    }

    #[test]
    fn zero_volume_uses_typical_price() {
        let bars = [OhlcBar { open: 0.0, high: 12.0, low: 9.0, close: 10.5, volume: 0 }];
        let values = vwap(&bars);
        assert!((values[0] - 10.5).abs() < 1e-10);
    }
}
