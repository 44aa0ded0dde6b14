// =============================================================================
// Regime inputs — indicator and structure snapshot per completed bar
// =============================================================================
//
// Buffers up to 200 bars and derives the full `RegimeInputs` set once at
// least 21 bars exist (enough for EMA(21) to seed). Time context comes from
// the bar clock, not the wall clock, so replayed sessions classify exactly
// like live ones did.

use chrono::NaiveTime;
use tracing::trace;

use crate::config::RegimeConfig;
use crate::indicators::{
    adx, atr, avg_bar_range, ema, higher_highs, higher_lows, lower_highs, lower_lows,
    percentile_rank, range_bound_count, slope, vwap, OhlcBar,
};
use crate::session::SessionCalendar;
use crate::types::{FootprintBar, RegimeInputs};

/// Bars retained for indicator computation.
const MAX_BARS: usize = 200;
/// Bars required before inputs are considered computable.
const MIN_BARS: usize = 21;
/// ATR history window for the percentile rank.
const ATR_PERCENTILE_WINDOW: usize = 50;

pub struct RegimeInputsCalculator {
    config: RegimeConfig,
    calendar: SessionCalendar,
    news_windows: Vec<(NaiveTime, NaiveTime)>,
    ohlc: Vec<OhlcBar>,
    deltas: Vec<i64>,
}

impl RegimeInputsCalculator {
    pub fn new(config: RegimeConfig, calendar: SessionCalendar) -> Self {
        let news_windows = config
            .news_windows
            .iter()
            .filter_map(|w| {
                let start = NaiveTime::parse_from_str(&w.start, "%H:%M").ok()?;
                let end = NaiveTime::parse_from_str(&w.end, "%H:%M").ok()?;
                Some((start, end))
            })
            .collect();
        Self {
            config,
            calendar,
            news_windows,
            ohlc: Vec::new(),
            deltas: Vec::new(),
        }
    }

    /// Append a completed bar to the rolling history.
    pub fn add_bar(&mut self, bar: &FootprintBar) {
        self.ohlc.push(OhlcBar::from(bar));
        self.deltas.push(bar.delta());
        if self.ohlc.len() > MAX_BARS {
            let excess = self.ohlc.len() - MAX_BARS;
            self.ohlc.drain(..excess);
            self.deltas.drain(..excess);
        }
    }

    pub fn bar_count(&self) -> usize {
        self.ohlc.len()
    }

    /// Compute the inputs for the most recent bar, or `None` while the
    /// buffer is still too short to trust.
    pub fn calculate(&self, bar: &FootprintBar) -> Option<RegimeInputs> {
        if self.ohlc.len() < MIN_BARS {
            trace!(
                bars = self.ohlc.len(),
                needed = MIN_BARS,
                "regime inputs not yet computable"
            );
            return None;
        }

        let ohlc = &self.ohlc;
        let closes: Vec<f64> = ohlc.iter().map(|b| b.close).collect();
        let highs: Vec<f64> = ohlc.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = ohlc.iter().map(|b| b.low).collect();
        let volumes: Vec<u64> = ohlc.iter().map(|b| b.volume).collect();

        let ema_9 = ema(&closes, 9);
        let ema_21 = ema(&closes, 21);
        let adx_values = adx(ohlc, 14);
        let atr_values = atr(ohlc, 14);
        let vwap_values = vwap(ohlc);

        let last_close = *closes.last()?;
        let current_adx = adx_values.last().copied().unwrap_or(0.0);
        let current_atr = atr_values.last().copied().unwrap_or(0.0);
        let current_ema_fast = ema_9.last().copied().unwrap_or(last_close);
        let current_ema_slow = ema_21.last().copied().unwrap_or(last_close);
        let current_vwap = vwap_values.last().copied().unwrap_or(last_close);

        let adx_slope = slope(&adx_values, 5);
        let delta_f: Vec<f64> = self.deltas.iter().map(|d| *d as f64).collect();
        let delta_slope = slope(&delta_f, 10);

        let avg_volume = if volumes.len() >= 20 {
            volumes[volumes.len() - 20..].iter().sum::<u64>() as f64 / 20.0
        } else {
            volumes.iter().sum::<u64>() as f64 / volumes.len() as f64
        };
        let volume_ratio = if avg_volume > 0.0 {
            *volumes.last()? as f64 / avg_volume
        } else {
            1.0
        };

        let atr_pct = if atr_values.len() >= 10 {
            let window_start = atr_values.len().saturating_sub(ATR_PERCENTILE_WINDOW);
            percentile_rank(current_atr, &atr_values[window_start..])
        } else {
            50.0
        };

        // Time context is derived from the bar's end time so replay and
        // live sessions classify identically.
        let at = bar.end_time;

        Some(RegimeInputs {
            adx_14: current_adx,
            adx_slope,
            ema_fast: current_ema_fast,
            ema_slow: current_ema_slow,
            ema_trend: current_ema_fast - current_ema_slow,
            price_vs_vwap: last_close - current_vwap,
            atr_14: current_atr,
            atr_percentile: atr_pct,
            bar_range_avg: avg_bar_range(ohlc, 5),
            volume_vs_average: volume_ratio,
            cumulative_delta: self.deltas.iter().sum(),
            delta_slope,
            higher_highs: higher_highs(&highs, 5),
            higher_lows: higher_lows(&lows, 5),
            lower_highs: lower_highs(&highs, 5),
            lower_lows: lower_lows(&lows, 5),
            range_bound_bars: range_bound_count(&highs, &lows, 10),
            minutes_since_open: self.calendar.minutes_since_open(at),
            minutes_to_close: self.calendar.minutes_to_close(at),
            is_news_window: self.is_news_window(at),
        })
    }

    fn is_news_window(&self, at: chrono::DateTime<chrono::Utc>) -> bool {
        use chrono_tz::America::New_York;
        let local = at.with_timezone(&New_York).time();
        self.news_windows
            .iter()
            .any(|(start, end)| local >= *start && local <= *end)
    }

    /// Configured minimum score/confidence thresholds, passed through for
    /// the classifier.
    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.ohlc.clear();
        self.deltas.clear();
    }
}
