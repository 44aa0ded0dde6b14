// =============================================================================
// Order-flow pattern detectors
// =============================================================================
//
// Each detector is a pure function of a completed footprint bar (or a small
// bounded history it owns). Detectors never share state; the `DetectorSet`
// runs them in a fixed order at every bar close and returns the signals in
// production order.

pub mod absorption;
pub mod divergence;
pub mod exhaustion;
pub mod imbalance;
pub mod unfinished;

pub use absorption::AbsorptionDetector;
pub use divergence::DeltaDivergenceDetector;
pub use exhaustion::ExhaustionDetector;
pub use imbalance::ImbalanceDetector;
pub use unfinished::UnfinishedBusinessDetector;

use crate::config::OrderFlowConfig;
use crate::symbols::SymbolProfile;
use crate::types::{FootprintBar, Signal};

/// The full detector battery, configured once per symbol.
pub struct DetectorSet {
    imbalance: ImbalanceDetector,
    exhaustion: ExhaustionDetector,
    absorption: AbsorptionDetector,
    divergence: DeltaDivergenceDetector,
    unfinished: UnfinishedBusinessDetector,
}

impl DetectorSet {
    /// Build from engine config, letting the symbol profile fill the
    /// volume floors tuned per instrument.
    pub fn new(config: &OrderFlowConfig, profile: &SymbolProfile) -> Self {
        Self {
            imbalance: ImbalanceDetector::new(
                config.imbalance_threshold,
                config.imbalance_min_volume.max(profile.imbalance_min_volume),
                config.stacked_imbalance_min,
            ),
            exhaustion: ExhaustionDetector::new(
                config.exhaustion_min_levels,
                config.exhaustion_min_decline,
            ),
            absorption: AbsorptionDetector::new(
                config.absorption_min_volume.max(profile.absorption_min_volume),
            ),
            divergence: DeltaDivergenceDetector::new(config.divergence_lookback),
            unfinished: UnfinishedBusinessDetector::new(config.unfinished_max_volume),
        }
    }

    /// Run every detector on a completed bar. Order is fixed: imbalance,
    /// stacked imbalance, exhaustion, absorption, divergence, unfinished
    /// revisits, new unfinished business. Revisits are checked before the
    /// current bar records its own extremes, so a level can only complete
    /// on a later bar.
    pub fn run(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        signals.extend(self.imbalance.detect(bar));
        signals.extend(self.imbalance.detect_stacked(bar));
        signals.extend(self.exhaustion.detect(bar));
        signals.extend(self.absorption.detect(bar));
        signals.extend(self.divergence.add_bar(bar));
        signals.extend(self.unfinished.check_revisit(bar));
        signals.extend(self.unfinished.detect(bar));
        signals
    }

    pub fn unfinished_levels(&self, symbol: &str) -> Vec<unfinished::UnfinishedLevel> {
        self.unfinished.active_levels(symbol)
    }

    pub fn reset(&mut self) {
        self.divergence.reset();
        self.unfinished.reset();
    }
}
