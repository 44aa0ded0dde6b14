// =============================================================================
// Delta divergence — price extremes the order flow refuses to confirm
// =============================================================================
//
// Keeps a rolling window of completed bars. Bearish: price prints a new high
// across the window while the delta series' peaks are stepping down and the
// current bar's delta is negative. Bullish is the mirror image at new lows.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

/// Divergence signals carry a fixed strength; the pattern is binary.
const DIVERGENCE_STRENGTH: f64 = 0.7;

pub struct DeltaDivergenceDetector {
    lookback: usize,
    history: Vec<FootprintBar>,
}

impl DeltaDivergenceDetector {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            history: Vec::new(),
        }
    }

    /// Add a completed bar and check the window for divergence.
    pub fn add_bar(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        self.history.push(bar.clone());
        let cap = self.lookback * 2;
        if self.history.len() > cap {
            let excess = self.history.len() - cap;
            self.history.drain(..excess);
        }

        if self.history.len() < self.lookback {
            return Vec::new();
        }
        self.detect()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    fn detect(&self) -> Vec<Signal> {
        let mut signals = Vec::new();
        let recent = &self.history[self.history.len() - self.lookback..];

        let highs: Vec<i64> = recent.iter().map(|b| b.high.ticks()).collect();
        let lows: Vec<i64> = recent.iter().map(|b| b.low.ticks()).collect();
        let deltas: Vec<i64> = recent.iter().map(|b| b.delta()).collect();

        let current = recent.last().expect("window is non-empty");
        let current_delta = *deltas.last().expect("window is non-empty");

        // Bearish: higher high in price, lower highs in delta, negative
        // current delta.
        if is_new_high(&highs) && peaks_declining(&deltas) && current_delta < 0 {
            signals.push(Signal::new(
                current.end_time,
                &current.symbol,
                SignalPattern::BearishDeltaDivergence,
                Direction::Short,
                DIVERGENCE_STRENGTH,
                current.close,
                SignalDetails::Divergence {
                    extreme_price: current.high,
                    current_delta,
                },
            ));
        }

        // Bullish: lower low in price, higher lows in delta, positive
        // current delta.
        if is_new_low(&lows) && troughs_rising(&deltas) && current_delta > 0 {
            signals.push(Signal::new(
                current.end_time,
                &current.symbol,
                SignalPattern::BullishDeltaDivergence,
                Direction::Long,
                DIVERGENCE_STRENGTH,
                current.close,
                SignalDetails::Divergence {
                    extreme_price: current.low,
                    current_delta,
                },
            ));
        }

        signals
    }
}

fn is_new_high(values: &[i64]) -> bool {
    if values.len() < 3 {
        return false;
    }
    let (last, rest) = values.split_last().expect("len checked");
    rest.iter().all(|v| last > v)
}

fn is_new_low(values: &[i64]) -> bool {
    if values.len() < 3 {
        return false;
    }
    let (last, rest) = values.split_last().expect("len checked");
    rest.iter().all(|v| last < v)
}

/// Local maxima, with the final element appended when it continues upward.
fn find_peaks(values: &[i64]) -> Vec<i64> {
    let mut peaks = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        if values[i] > values[i - 1] && values[i] > values[i + 1] {
            peaks.push(values[i]);
        }
    }
    if values.len() >= 2 && values[values.len() - 1] > values[values.len() - 2] {
        peaks.push(values[values.len() - 1]);
    }
    peaks
}

/// Local minima, with the final element appended when it continues downward.
fn find_troughs(values: &[i64]) -> Vec<i64> {
    let mut troughs = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        if values[i] < values[i - 1] && values[i] < values[i + 1] {
            troughs.push(values[i]);
        }
    }
    if values.len() >= 2 && values[values.len() - 1] < values[values.len() - 2] {
        troughs.push(values[values.len() - 1]);
    }
    troughs
}

fn peaks_declining(values: &[i64]) -> bool {
    if values.len() < 3 {
        return false;
    }
    let peaks = find_peaks(values);
    peaks.len() >= 2 && peaks[peaks.len() - 1] < peaks[peaks.len() - 2]
}

fn troughs_rising(values: &[i64]) -> bool {
    if values.len() < 3 {
        return false;
    }
    let troughs = find_troughs(values);
    troughs.len() >= 2 && troughs[troughs.len() - 1] > troughs[troughs.len() - 2]
}
