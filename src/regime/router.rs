// =============================================================================
// Strategy Router — regime-gated signal approval and sizing
// =============================================================================
//
// Each regime ships with a fixed policy: which patterns are tradeable, an
// optional directional bias, and a position-size multiplier. Evaluation is
// ordered; the first failing gate stamps the rejection reason and stops.

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::RegimeConfig;
use crate::regime::detector::RegimeDetector;
use crate::regime::inputs::RegimeInputsCalculator;
use crate::session::SessionCalendar;
use crate::types::{Direction, FootprintBar, Regime, Signal, SignalPattern};

/// Per-regime trading policy. The table is fixed and ships with the system.
pub struct RegimePolicy {
    pub enabled_patterns: &'static [SignalPattern],
    pub bias: Option<Direction>,
    pub size_multiplier: f64,
    pub description: &'static str,
}

pub fn policy_for(regime: Regime) -> &'static RegimePolicy {
    use SignalPattern::*;

    static TRENDING_UP: RegimePolicy = RegimePolicy {
        enabled_patterns: &[
            StackedBuyImbalance,
            BuyingAbsorption,
            SellingExhaustion,
            BullishDeltaDivergence,
            BuyImbalance,
        ],
        bias: Some(Direction::Long),
        size_multiplier: 1.0,
        description: "Trend following - favor long entries with momentum",
    };
    static TRENDING_DOWN: RegimePolicy = RegimePolicy {
        enabled_patterns: &[
            StackedSellImbalance,
            SellingAbsorption,
            BuyingExhaustion,
            BearishDeltaDivergence,
            SellImbalance,
        ],
        bias: Some(Direction::Short),
        size_multiplier: 1.0,
        description: "Trend following - favor short entries with momentum",
    };
    static RANGING: RegimePolicy = RegimePolicy {
        enabled_patterns: &[
            BuyingExhaustion,
            SellingExhaustion,
            BuyingAbsorption,
            SellingAbsorption,
            UnfinishedHigh,
            UnfinishedLow,
        ],
        bias: None,
        size_multiplier: 0.75,
        description: "Mean reversion - trade extremes and reversals",
    };
    static VOLATILE: RegimePolicy = RegimePolicy {
        enabled_patterns: &[StackedBuyImbalance, StackedSellImbalance],
        bias: None,
        size_multiplier: 0.5,
        description: "High volatility - only trade strongest signals",
    };
    static NO_TRADE: RegimePolicy = RegimePolicy {
        enabled_patterns: &[],
        bias: None,
        size_multiplier: 0.0,
        description: "No trading - sit out",
    };

    match regime {
        Regime::TrendingUp => &TRENDING_UP,
        Regime::TrendingDown => &TRENDING_DOWN,
        Regime::Ranging => &RANGING,
        Regime::Volatile => &VOLATILE,
        Regime::NoTrade => &NO_TRADE,
    }
}

/// Snapshot of the router for dashboards and digests.
#[derive(Debug, Clone, Serialize)]
pub struct RouterState {
    pub current_regime: Regime,
    pub regime_confidence: f64,
    pub regime_duration: u32,
    pub bias: Option<Direction>,
    pub size_multiplier: f64,
    pub signals_evaluated: u64,
    pub signals_approved: u64,
    pub signals_rejected: u64,
}

pub struct StrategyRouter {
    config: RegimeConfig,
    detector: RegimeDetector,
    inputs: RegimeInputsCalculator,

    current_regime: Regime,
    confidence: f64,

    signals_evaluated: u64,
    signals_approved: u64,
    signals_rejected: u64,
}

impl StrategyRouter {
    pub fn new(config: RegimeConfig, calendar: SessionCalendar) -> Self {
        Self {
            detector: RegimeDetector::new(config.clone()),
            inputs: RegimeInputsCalculator::new(config.clone(), calendar),
            config,
            current_regime: Regime::NoTrade,
            confidence: 0.0,
            signals_evaluated: 0,
            signals_approved: 0,
            signals_rejected: 0,
        }
    }

    /// Recompute the regime for a completed bar. Must run before any signal
    /// from that bar is evaluated.
    pub fn on_bar(&mut self, bar: &FootprintBar) {
        self.inputs.add_bar(bar);
        let inputs = self.inputs.calculate(bar);
        let (regime, confidence) = self.detector.classify(inputs.as_ref(), bar.end_time);
        self.current_regime = regime;
        self.confidence = confidence;
    }

    /// Annotate a signal with the current regime and an approval verdict.
    pub fn evaluate(&mut self, mut signal: Signal) -> Signal {
        self.signals_evaluated += 1;
        signal.regime = Some(self.current_regime);

        let policy = policy_for(self.current_regime);

        // 1. Pattern must be enabled for the regime.
        if !policy.enabled_patterns.contains(&signal.pattern) {
            return self.reject(
                signal,
                format!("Pattern not enabled for {}", self.current_regime),
            );
        }

        // 2. Direction must not fight the bias.
        if let Some(bias) = policy.bias {
            if signal.direction != bias {
                let reason = format!(
                    "Direction {} conflicts with {} bias",
                    signal.direction, bias
                );
                return self.reject(signal, reason);
            }
        }

        // 3. Strength floor.
        if signal.strength < self.config.min_signal_strength {
            let reason = format!(
                "Strength {:.2} below minimum {:.2}",
                signal.strength, self.config.min_signal_strength
            );
            return self.reject(signal, reason);
        }

        // 4. Regime confidence floor.
        if self.confidence < self.config.min_regime_confidence {
            return self.reject(
                signal,
                format!(
                    "Regime confidence {:.2} below minimum {:.2}",
                    self.confidence, self.config.min_regime_confidence
                ),
            );
        }

        signal.approved = true;
        self.signals_approved += 1;
        debug!(
            pattern = %signal.pattern,
            direction = %signal.direction,
            strength = format!("{:.2}", signal.strength),
            regime = %self.current_regime,
            "signal approved"
        );
        signal
    }

    fn reject(&mut self, mut signal: Signal, reason: String) -> Signal {
        trace!(
            pattern = %signal.pattern,
            reason = %reason,
            "signal rejected"
        );
        signal.approved = false;
        signal.rejection_reason = Some(reason);
        self.signals_rejected += 1;
        signal
    }

    pub fn current_regime(&self) -> Regime {
        self.current_regime
    }

    pub fn regime_confidence(&self) -> f64 {
        self.confidence
    }

    /// Size multiplier for the current regime.
    pub fn size_multiplier(&self) -> f64 {
        policy_for(self.current_regime).size_multiplier
    }

    pub fn state(&self) -> RouterState {
        let policy = policy_for(self.current_regime);
        RouterState {
            current_regime: self.current_regime,
            regime_confidence: self.confidence,
            regime_duration: self.detector.regime_duration(),
            bias: policy.bias,
            size_multiplier: policy.size_multiplier,
            signals_evaluated: self.signals_evaluated,
            signals_approved: self.signals_approved,
            signals_rejected: self.signals_rejected,
        }
    }

    pub fn detector(&self) -> &RegimeDetector {
        &self.detector
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.inputs.reset();
        self.current_regime = Regime::NoTrade;
        self.confidence = 0.0;
        self.signals_evaluated = 0;
        self.signals_approved = 0;
        self.signals_rejected = 0;
    }

    #[cfg(test)]
    pub fn force_regime(&mut self, regime: Regime, confidence: f64) {
        self.current_regime = regime;
        self.confidence = confidence;
    }
}
