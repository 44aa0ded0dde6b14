// =============================================================================
// Market structure helpers — swing patterns, ranges, slopes, percentiles
// =============================================================================

use super::OhlcBar;

/// Least-squares slope over the last `period` values. Positive = rising.
pub fn slope(values: &[f64], period: usize) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let start = values.len().saturating_sub(period);
    let recent = &values[start..];
    let n = recent.len();
    if n < 2 {
        return 0.0;
    }

    let n_f = n as f64;
    let sum_x: f64 = (0..n).map(|i| i as f64).sum();
    let sum_y: f64 = recent.iter().sum();
    let sum_xy: f64 = recent.iter().enumerate().map(|(i, v)| i as f64 * v).sum();
    let sum_xx: f64 = (0..n).map(|i| (i * i) as f64).sum();

    let denominator = n_f * sum_xx - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n_f * sum_xy - sum_x * sum_y) / denominator
}

/// Percentile rank of `value` within `values`, 0–100. An empty distribution
/// ranks everything at 50.
pub fn percentile_rank(value: f64, values: &[f64]) -> f64 {
    if values.is_empty() {
        return 50.0;
    }
    let below = values.iter().filter(|v| **v < value).count();
    below as f64 / values.len() as f64 * 100.0
}

/// Most recent high exceeds every prior high in the lookback.
pub fn higher_highs(highs: &[f64], lookback: usize) -> bool {
    recent_vs_rest(highs, lookback, |last, rest| {
        rest.iter().all(|v| last > *v)
    })
}

/// Most recent low sits above the lowest prior low in the lookback.
pub fn higher_lows(lows: &[f64], lookback: usize) -> bool {
    recent_vs_rest(lows, lookback, |last, rest| {
        rest.iter().copied().fold(f64::INFINITY, f64::min) < last
    })
}

/// Most recent high sits below the highest prior high in the lookback.
pub fn lower_highs(highs: &[f64], lookback: usize) -> bool {
    recent_vs_rest(highs, lookback, |last, rest| {
        rest.iter().copied().fold(f64::NEG_INFINITY, f64::max) > last
    })
}

/// Most recent low undercuts every prior low in the lookback.
pub fn lower_lows(lows: &[f64], lookback: usize) -> bool {
    recent_vs_rest(lows, lookback, |last, rest| rest.iter().all(|v| last < *v))
}

fn recent_vs_rest(values: &[f64], lookback: usize, pred: impl Fn(f64, &[f64]) -> bool) -> bool {
    if values.len() < lookback || lookback < 2 {
        return false;
    }
    let recent = &values[values.len() - lookback..];
    let (last, rest) = recent.split_last().expect("lookback >= 2");
    pred(*last, rest)
}

/// Count how many of the last `lookback` bars stayed inside the range set by
/// the first of them (expanded by 10% on each side).
pub fn range_bound_count(highs: &[f64], lows: &[f64], lookback: usize) -> u32 {
    if highs.len() < lookback || lows.len() < lookback {
        return 0;
    }
    let recent_highs = &highs[highs.len() - lookback..];
    let recent_lows = &lows[lows.len() - lookback..];

    let range_size = recent_highs[0] - recent_lows[0];
    let range_high = recent_highs[0] + range_size * 0.1;
    let range_low = recent_lows[0] - range_size * 0.1;

    recent_highs
        .iter()
        .zip(recent_lows)
        .filter(|(h, l)| **l >= range_low && **h <= range_high)
        .count() as u32
}

/// Average high − low over the most recent `period` bars.
pub fn avg_bar_range(bars: &[OhlcBar], period: usize) -> f64 {
    if bars.is_empty() {
        return 0.0;
    }
    let start = bars.len().saturating_sub(period);
    let recent = &bars[start..];
    recent.iter().map(OhlcBar::range).sum::<f64>() / recent.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slope_of_line() {
        let values = [1.0, 3.0, 5.0, 7.0, 9.0];
        assert!((slope(&values, 5) - 2.0).abs() < 1e-10);
        assert!((slope(&values, 3) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn slope_of_flat_series_is_zero() {
        assert!(slope(&[4.0; 10], 5).abs() < 1e-10);
        assert_eq!(slope(&[1.0], 5), 0.0);
    }

    #[test]
    fn percentile_rank_basics() {
        let dist = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile_rank(2.5, &dist) - 50.0).abs() < 1e-10);
        assert!((percentile_rank(10.0, &dist) - 100.0).abs() < 1e-10);
        assert!((percentile_rank(0.0, &dist) - 0.0).abs() < 1e-10);
        assert!((percentile_rank(1.0, &[]) - 50.0).abs() < 1e-10);
    }

    #[test]
    fn structure_predicates() {
        let rising = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(higher_highs(&rising, 5));
        assert!(higher_lows(&rising, 5));
        assert!(!lower_highs(&rising, 5));
        assert!(!lower_lows(&rising, 5));

        let falling = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert!(lower_lows(&falling, 5));
        assert!(lower_highs(&falling, 5));

        // Too little history is never a structure signal.
        assert!(!higher_highs(&[1.0, 2.0], 5));
    }

    #[test]
    fn range_bound_counts_contained_bars() {
        let highs = [10.0, 9.8, 10.05, 12.0, 9.9];
        let lows = [9.0, 9.1, 9.05, 11.0, 9.2];
        // Bar 3 (12.0/11.0) escapes the 9.0–10.0 (+/-10%) range.
        assert_eq!(range_bound_count(&highs, &lows, 5), 4);
    }

    #[test]
    fn avg_range_over_window() {
        let bars: Vec<OhlcBar> = [(10.0, 8.0), (11.0, 10.0), (12.0, 9.0)]
            .iter()
            .map(|(h, l)| OhlcBar { open: 0.0, high: *h, low: *l, close: 0.0, volume: 0 })
            .collect();
        // Last two: (1 + 3) / 2 = 2
        assert!((avg_bar_range(&bars, 2) - 2.0).abs() < 1e-10);
        assert_eq!(avg_bar_range(&[], 5), 0.0);
    }
}
