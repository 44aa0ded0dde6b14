// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// ADX quantifies trend strength regardless of direction.
//
// Pipeline:
//   1. +DM / -DM per bar from successive highs and lows.
//   2. True Range per bar.
//   3. EMA-smooth +DM, -DM, and TR over `period`.
//   4. +DI = 100 * smoothed(+DM) / smoothed(TR); -DI likewise.
//   5. DX  = 100 * |+DI - -DI| / (+DI + -DI)
//   6. ADX = EMA of DX over `period`.
//
// Interpretation: ADX > 25 trending, ADX < 20 ranging. The series is all
// zeros until 2 * period bars exist — callers must treat the early values
// as untrustworthy (the regime classifier gates on warm-up for exactly
// this reason).

use super::atr::true_range;
use super::ema::ema;
use super::OhlcBar;

/// Directional movement per bar. The first bar has no predecessor and
/// contributes zero to both sides.
fn directional_movement(bars: &[OhlcBar]) -> (Vec<f64>, Vec<f64>) {
    if bars.len() < 2 {
        return (vec![0.0; bars.len()], vec![0.0; bars.len()]);
    }

    let mut plus_dm = Vec::with_capacity(bars.len());
    let mut minus_dm = Vec::with_capacity(bars.len());
    plus_dm.push(0.0);
    minus_dm.push(0.0);

    for i in 1..bars.len() {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }

    (plus_dm, minus_dm)
}

/// ADX series, same length as the input. Zeros when fewer than `2 * period`
/// bars are available.
pub fn adx(bars: &[OhlcBar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period * 2 {
        return vec![0.0; bars.len()];
    }

    let tr = true_range(bars);
    let (plus_dm, minus_dm) = directional_movement(bars);

    let smoothed_tr = ema(&tr, period);
    let smoothed_plus = ema(&plus_dm, period);
    let smoothed_minus = ema(&minus_dm, period);

    let mut dx = Vec::with_capacity(bars.len());
    for i in 0..bars.len() {
        let (pdi, mdi) = if smoothed_tr[i] > 0.0 {
            (
                100.0 * smoothed_plus[i] / smoothed_tr[i],
                100.0 * smoothed_minus[i] / smoothed_tr[i],
            )
        } else {
            (0.0, 0.0)
        };

        let di_sum = pdi + mdi;
        dx.push(if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    }

    ema(&dx, period)
}
