// =============================================================================
// Market Regime Detector
// =============================================================================
//
// Classifies each completed bar into one of five regimes with a confidence.
//
// Procedure, applied in order:
//
//   1. Hard overrides -> NO_TRADE at confidence 1.0 (session edges, news
//      windows, dead volume).
//   2. Weighted additive scores for TRENDING_UP / TRENDING_DOWN / RANGING /
//      VOLATILE.
//   3. Winner selection: zero top score -> NO_TRADE 0.5; top score below
//      `min_regime_score` -> VOLATILE 0.5; otherwise the winner with
//      confidence 0.5 + 0.5 * (top - runner_up) / top.
//
// A warm-up gate holds the classifier at NO_TRADE until 2 * ADX period
// bars have been seen — ADX is numeric noise before that, and acting on it
// would be worse than not trading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RegimeConfig;
use crate::types::{Regime, RegimeInputs};

/// Bars required before non-NO_TRADE classifications are allowed.
pub const WARMUP_BARS: usize = 28;

/// Record of a significant regime change, kept for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeChange {
    pub at: DateTime<Utc>,
    pub regime: Regime,
    pub confidence: f64,
}

const MAX_HISTORY: usize = 100;

pub struct RegimeDetector {
    config: RegimeConfig,
    current_regime: Regime,
    confidence: f64,
    /// Consecutive bars the current regime has held.
    regime_duration: u32,
    bars_seen: usize,
    history: Vec<RegimeChange>,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            current_regime: Regime::NoTrade,
            confidence: 0.0,
            regime_duration: 0,
            bars_seen: 0,
            history: Vec::new(),
        }
    }

    /// Classify one bar's inputs. `inputs` is `None` while the inputs
    /// calculator is still buffering.
    pub fn classify(&mut self, inputs: Option<&RegimeInputs>, at: DateTime<Utc>) -> (Regime, f64) {
        self.bars_seen += 1;

        // Warm-up gate: indicators are untrustworthy this early.
        let Some(inputs) = inputs else {
            return self.update(Regime::NoTrade, 0.0, at);
        };
        if self.bars_seen < WARMUP_BARS {
            return self.update(Regime::NoTrade, 0.0, at);
        }

        if self.should_not_trade(inputs) {
            return self.update(Regime::NoTrade, 1.0, at);
        }

        let scores = [
            (Regime::TrendingUp, self.score_trending_up(inputs)),
            (Regime::TrendingDown, self.score_trending_down(inputs)),
            (Regime::Ranging, self.score_ranging(inputs)),
            (Regime::Volatile, self.score_volatile(inputs)),
        ];

        let mut sorted = scores;
        sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let (winner, top) = sorted[0];
        let runner_up = sorted[1].1;

        if top == 0.0 {
            return self.update(Regime::NoTrade, 0.5, at);
        }
        if top < self.config.min_regime_score {
            return self.update(Regime::Volatile, 0.5, at);
        }

        let margin = (top - runner_up) / top;
        let confidence = (0.5 + margin * 0.5).clamp(0.0, 1.0);
        self.update(winner, confidence, at)
    }

    pub fn current(&self) -> (Regime, f64) {
        (self.current_regime, self.confidence)
    }

    /// Consecutive bars in the current regime.
    pub fn regime_duration(&self) -> u32 {
        self.regime_duration
    }

    /// Recent significant changes (transition or |Δconfidence| > 0.2).
    pub fn recent_history(&self, count: usize) -> &[RegimeChange] {
        let start = self.history.len().saturating_sub(count);
        &self.history[start..]
    }

    pub fn reset(&mut self) {
        self.current_regime = Regime::NoTrade;
        self.confidence = 0.0;
        self.regime_duration = 0;
        self.bars_seen = 0;
        self.history.clear();
    }

    // -------------------------------------------------------------------------
    // Hard overrides
    // -------------------------------------------------------------------------

    fn should_not_trade(&self, inputs: &RegimeInputs) -> bool {
        if inputs.minutes_to_close < self.config.no_trade_before_close_minutes {
            return true;
        }
        if inputs.is_news_window {
            return true;
        }
        if inputs.minutes_since_open < self.config.no_trade_before_open_minutes {
            return true;
        }
        // Dead tape: volume under 30% of its recent average.
        if inputs.volume_vs_average < 0.3 {
            return true;
        }
        false
    }

    // -------------------------------------------------------------------------
    // Scoring
    // -------------------------------------------------------------------------

    fn score_trending_up(&self, inputs: &RegimeInputs) -> f64 {
        let mut score = 0.0;

        if inputs.adx_14 > self.config.adx_trend_threshold {
            score += 2.0;
        } else if inputs.adx_14 > self.config.adx_weak_threshold {
            score += 1.0;
        }

        if inputs.ema_trend > 0.0 {
            score += 1.5;
        }
        if inputs.price_vs_vwap > 0.0 {
            score += 1.0;
        }

        if inputs.higher_highs && inputs.higher_lows {
            score += 2.0;
        } else if inputs.higher_lows {
            score += 1.0;
        }

        if inputs.cumulative_delta > 0 && inputs.delta_slope > 0.0 {
            score += 1.5;
        } else if inputs.cumulative_delta > 0 {
            score += 0.5;
        }

        if inputs.adx_slope > 0.0 {
            score += 0.5;
        }

        score
    }

    fn score_trending_down(&self, inputs: &RegimeInputs) -> f64 {
        let mut score = 0.0;

        if inputs.adx_14 > self.config.adx_trend_threshold {
            score += 2.0;
        } else if inputs.adx_14 > self.config.adx_weak_threshold {
            score += 1.0;
        }

        if inputs.ema_trend < 0.0 {
            score += 1.5;
        }
        if inputs.price_vs_vwap < 0.0 {
            score += 1.0;
        }

        if inputs.lower_highs && inputs.lower_lows {
            score += 2.0;
        } else if inputs.lower_highs {
            score += 1.0;
        }

        if inputs.cumulative_delta < 0 && inputs.delta_slope < 0.0 {
            score += 1.5;
        } else if inputs.cumulative_delta < 0 {
            score += 0.5;
        }

        if inputs.adx_slope > 0.0 {
            score += 0.5;
        }

        score
    }

    fn score_ranging(&self, inputs: &RegimeInputs) -> f64 {
        let mut score = 0.0;

        if inputs.adx_14 < self.config.adx_weak_threshold {
            score += 2.0;
        } else if inputs.adx_14 < self.config.adx_trend_threshold {
            score += 1.0;
        }

        if inputs.price_vs_vwap.abs() < 0.5 {
            score += 1.0;
        }

        if !(inputs.higher_highs || inputs.lower_lows) {
            score += 1.5;
        }

        if inputs.range_bound_bars >= 3 {
            score += 2.0;
        } else if inputs.range_bound_bars >= 2 {
            score += 1.0;
        }

        if inputs.cumulative_delta.abs() < 500 {
            score += 1.0;
        }

        if inputs.atr_percentile < 50.0 {
            score += 1.0;
        }

        score
    }

    fn score_volatile(&self, inputs: &RegimeInputs) -> f64 {
        let mut score = 0.0;

        if inputs.atr_percentile > self.config.atr_extreme_percentile {
            score += 2.5;
        } else if inputs.atr_percentile > self.config.atr_high_percentile {
            score += 1.5;
        }

        if inputs.bar_range_avg > inputs.atr_14 * 1.5 {
            score += 1.5;
        }

        if inputs.volume_vs_average > 2.0 {
            score += 1.0;
        }

        // Middling ADX rolling over: a trend losing steam.
        if inputs.adx_14 >= self.config.adx_weak_threshold
            && inputs.adx_14 <= self.config.adx_trend_threshold
            && inputs.adx_slope < 0.0
        {
            score += 1.0;
        }

        if inputs.delta_slope.abs() > 100.0 {
            score += 1.0;
        }

        score
    }

    // -------------------------------------------------------------------------
    // State update
    // -------------------------------------------------------------------------

    fn update(&mut self, regime: Regime, confidence: f64, at: DateTime<Utc>) -> (Regime, f64) {
        if regime != self.current_regime {
            self.regime_duration = 1;
        } else {
            self.regime_duration += 1;
        }

        let significant = match self.history.last() {
            None => true,
            Some(last) => last.regime != regime || (last.confidence - confidence).abs() > 0.2,
        };
        if significant {
            debug!(
                regime = %regime,
                confidence = format!("{confidence:.2}"),
                duration = self.regime_duration,
                "regime updated"
            );
            self.history.push(RegimeChange {
                at,
                regime,
                confidence,
            });
            if self.history.len() > MAX_HISTORY {
                let excess = self.history.len() - MAX_HISTORY;
                self.history.drain(..excess);
            }
        }

        self.current_regime = regime;
        self.confidence = confidence;
        (regime, confidence)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RegimeDetector {
        RegimeDetector::new(RegimeConfig::default())
    }

    /// Push enough neutral classifications to pass the warm-up gate.
    fn warm(det: &mut RegimeDetector) {
        let neutral = RegimeInputs::default();
        for _ in 0..WARMUP_BARS {
            det.classify(Some(&neutral), Utc::now());
        }
    }

    fn uptrend_inputs() -> RegimeInputs {
        RegimeInputs {
            adx_14: 30.0,
            adx_slope: 0.5,
            ema_trend: 2.0,
            price_vs_vwap: 3.0,
            higher_highs: true,
            higher_lows: true,
            cumulative_delta: 1500,
            delta_slope: 50.0,
            atr_percentile: 55.0,
            volume_vs_average: 1.2,
            minutes_since_open: 120,
            minutes_to_close: 240,
            ..Default::default()
        }
    }

    fn downtrend_inputs() -> RegimeInputs {
        RegimeInputs {
            adx_14: 30.0,
            adx_slope: 0.5,
            ema_trend: -2.0,
            price_vs_vwap: -3.0,
            lower_highs: true,
            lower_lows: true,
            cumulative_delta: -1500,
            delta_slope: -50.0,
            volume_vs_average: 1.2,
            minutes_since_open: 120,
            minutes_to_close: 240,
            ..Default::default()
        }
    }

    fn ranging_inputs() -> RegimeInputs {
        RegimeInputs {
            adx_14: 12.0,
            price_vs_vwap: 0.2,
            range_bound_bars: 5,
            cumulative_delta: 100,
            atr_percentile: 30.0,
            volume_vs_average: 1.0,
            minutes_since_open: 120,
            minutes_to_close: 240,
            ..Default::default()
        }
    }

    #[test]
    fn uptrend_classifies_trending_up() {
        let mut det = detector();
        warm(&mut det);
        let (regime, confidence) = det.classify(Some(&uptrend_inputs()), Utc::now());
        assert_eq!(regime, Regime::TrendingUp);
        assert!(confidence >= 0.5);
    }

    #[test]
    fn downtrend_classifies_trending_down() {
        let mut det = detector();
        warm(&mut det);
        let (regime, _) = det.classify(Some(&downtrend_inputs()), Utc::now());
        assert_eq!(regime, Regime::TrendingDown);
    }

    #[test]
    fn quiet_tape_classifies_ranging() {
        let mut det = detector();
        warm(&mut det);
        let (regime, _) = det.classify(Some(&ranging_inputs()), Utc::now());
        assert_eq!(regime, Regime::Ranging);
    }

    #[test]
    fn near_close_overrides_everything() {
        let mut det = detector();
        warm(&mut det);
        let mut inputs = uptrend_inputs();
        inputs.minutes_to_close = 10;
        let (regime, confidence) = det.classify(Some(&inputs), Utc::now());
        assert_eq!(regime, Regime::NoTrade);
        assert!((confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn news_window_overrides() {
        let mut det = detector();
        warm(&mut det);
        let mut inputs = uptrend_inputs();
        inputs.is_news_window = true;
        let (regime, confidence) = det.classify(Some(&inputs), Utc::now());
        assert_eq!(regime, Regime::NoTrade);
        assert!((confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fresh_open_and_dead_volume_override() {
        let mut det = detector();
        warm(&mut det);

        let mut inputs = uptrend_inputs();
        inputs.minutes_since_open = 2;
        assert_eq!(det.classify(Some(&inputs), Utc::now()).0, Regime::NoTrade);

        let mut inputs = uptrend_inputs();
        inputs.volume_vs_average = 0.2;
        assert_eq!(det.classify(Some(&inputs), Utc::now()).0, Regime::NoTrade);
    }

    #[test]
    fn weak_scores_fall_back_to_volatile() {
        let mut det = detector();
        warm(&mut det);
        // A murky tape: a little trendiness, nothing conclusive.
        let inputs = RegimeInputs {
            adx_14: 22.0,
            ema_trend: 0.5,
            atr_percentile: 60.0,
            volume_vs_average: 1.0,
            minutes_since_open: 120,
            minutes_to_close: 240,
            higher_highs: true, // kills the ranging no-structure bonus
            cumulative_delta: 800,
            ..Default::default()
        };
        let (regime, confidence) = det.classify(Some(&inputs), Utc::now());
        assert_eq!(regime, Regime::Volatile);
        assert!((confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn warmup_gate_holds_no_trade() {
        let mut det = detector();
        let strong = uptrend_inputs();
        for _ in 0..(WARMUP_BARS - 1) {
            let (regime, confidence) = det.classify(Some(&strong), Utc::now());
            assert_eq!(regime, Regime::NoTrade);
            assert_eq!(confidence, 0.0);
        }
        // The gate lifts exactly at the warm-up boundary.
        let (regime, _) = det.classify(Some(&strong), Utc::now());
        assert_eq!(regime, Regime::TrendingUp);
    }

    #[test]
    fn missing_inputs_classify_no_trade() {
        let mut det = detector();
        let (regime, confidence) = det.classify(None, Utc::now());
        assert_eq!(regime, Regime::NoTrade);
        assert_eq!(confidence, 0.0);
    }

    #[test]
    fn determinism() {
        let inputs = uptrend_inputs();
        let mut a = detector();
        let mut b = detector();
        warm(&mut a);
        warm(&mut b);
        let t = Utc::now();
        assert_eq!(a.classify(Some(&inputs), t), b.classify(Some(&inputs), t));
    }

    #[test]
    fn duration_counts_consecutive_bars() {
        let mut det = detector();
        warm(&mut det);

        let up = uptrend_inputs();
        det.classify(Some(&up), Utc::now());
        assert_eq!(det.regime_duration(), 1);
        det.classify(Some(&up), Utc::now());
        assert_eq!(det.regime_duration(), 2);
        det.classify(Some(&up), Utc::now());
        assert_eq!(det.regime_duration(), 3);

        // Regime flip resets the counter.
        det.classify(Some(&downtrend_inputs()), Utc::now());
        assert_eq!(det.regime_duration(), 1);
    }

    #[test]
    fn history_records_transitions_and_stays_bounded() {
        let mut det = detector();
        warm(&mut det);
        for _ in 0..120 {
            det.classify(Some(&uptrend_inputs()), Utc::now());
            det.classify(Some(&downtrend_inputs()), Utc::now());
        }
        let history = det.recent_history(200);
        assert!(history.len() <= MAX_HISTORY);
        // Consecutive entries must differ in regime or confidence.
        for pair in history.windows(2) {
            assert!(
                pair[0].regime != pair[1].regime
                    || (pair[0].confidence - pair[1].confidence).abs() > 0.2
            );
        }
    }
}
