// =============================================================================
// Exponential and Simple Moving Averages
// =============================================================================

/// Exponential Moving Average with multiplier `2 / (period + 1)`.
///
/// Seeded by the SMA of the first `period` values: positions `0..period` all
/// carry the seed, and the recursive EMA takes over from `period` onward.
/// Inputs shorter than `period` collapse to their plain average.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }
    if values.len() < period {
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        return vec![avg; values.len()];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = vec![seed; period];
    for &v in &values[period..] {
        let prev = *out.last().expect("seeded above");
        out.push((v - prev) * multiplier + prev);
    }
    out
}

/// Simple Moving Average; positions before the window fills use the running
/// average of everything seen so far.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if values.is_empty() || period == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let start = (i + 1).saturating_sub(period);
        let window = &values[start..=i];
        out.push(window.iter().sum::<f64>() / window.len() as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_seeds_with_sma() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let result = ema(&values, 3);
        assert_eq!(result.len(), 6);
        // Seed = mean(1, 2, 3) = 2.0 occupies the first `period` slots.
        assert!((result[0] - 2.0).abs() < 1e-10);
        assert!((result[2] - 2.0).abs() < 1e-10);
        // Next: (4 - 2) * 0.5 + 2 = 3.0
        assert!((result[3] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn ema_short_input_is_plain_average() {
        let result = ema(&[2.0, 4.0], 5);
        assert_eq!(result, vec![3.0, 3.0]);
    }

    #[test]
    fn ema_tracks_rising_series() {
        let values: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let result = ema(&values, 9);
        // EMA lags but must end close to the latest value.
        let last = *result.last().unwrap();
        assert!(last > 43.0 && last < 49.0, "got {last}");
    }

    #[test]
    fn sma_running_then_windowed() {
        let values = [2.0, 4.0, 6.0, 8.0];
        let result = sma(&values, 2);
        assert_eq!(result, vec![2.0, 3.0, 5.0, 7.0]);
    }

    #[test]
    fn empty_input() {
        assert!(ema(&[], 5).is_empty());
        assert!(sma(&[], 5).is_empty());
    }
}
