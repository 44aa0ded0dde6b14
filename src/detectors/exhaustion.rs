// =============================================================================
// Exhaustion detection — aggressor volume drying up at bar extremes
// =============================================================================
//
// Buying exhaustion: ask volume declines monotonically as price walks up
// into the bar high. Selling exhaustion mirrors it with bid volume at the
// low. The move is running out of participants, so the direction is the
// reversal.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

pub struct ExhaustionDetector {
    /// Minimum consecutive levels showing decline.
    min_levels: usize,
    /// Minimum overall decline fraction (0.30 = 30%).
    min_decline_pct: f64,
}

struct ExhaustionRead {
    consecutive_declines: usize,
    decline_pct: f64,
    volumes: Vec<u64>,
}

impl ExhaustionDetector {
    pub fn new(min_levels: usize, min_decline_pct: f64) -> Self {
        Self {
            min_levels,
            min_decline_pct,
        }
    }

    pub fn detect(&self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let levels = bar.sorted_levels();
        if levels.len() < self.min_levels {
            return signals;
        }

        // Buying exhaustion: walk the top of the bar upward and watch ask
        // volume fade.
        let take = self.min_levels + 2;
        let top_start = levels.len().saturating_sub(take);
        let top_volumes: Vec<u64> = levels[top_start..].iter().map(|l| l.ask_volume).collect();
        if top_volumes.len() >= self.min_levels {
            if let Some(read) = self.check_decline(&top_volumes) {
                signals.push(Signal::new(
                    bar.end_time,
                    &bar.symbol,
                    SignalPattern::BuyingExhaustion,
                    Direction::Short,
                    read.decline_pct,
                    bar.high,
                    SignalDetails::Exhaustion {
                        consecutive_declines: read.consecutive_declines,
                        decline_pct: read.decline_pct,
                        volumes: read.volumes,
                    },
                ));
            }
        }

        // Selling exhaustion: walk the bottom of the bar downward and watch
        // bid volume fade.
        let bottom_end = take.min(levels.len());
        let bottom_volumes: Vec<u64> = levels[..bottom_end]
            .iter()
            .rev()
            .map(|l| l.bid_volume)
            .collect();
        if bottom_volumes.len() >= self.min_levels {
            if let Some(read) = self.check_decline(&bottom_volumes) {
                signals.push(Signal::new(
                    bar.end_time,
                    &bar.symbol,
                    SignalPattern::SellingExhaustion,
                    Direction::Long,
                    read.decline_pct,
                    bar.low,
                    SignalDetails::Exhaustion {
                        consecutive_declines: read.consecutive_declines,
                        decline_pct: read.decline_pct,
                        volumes: read.volumes,
                    },
                ));
            }
        }

        signals
    }

    /// The volume sequence runs from the inside of the bar toward the
    /// extreme; exhaustion needs an unbroken decline long and deep enough.
    fn check_decline(&self, volumes: &[u64]) -> Option<ExhaustionRead> {
        if volumes.len() < self.min_levels {
            return None;
        }

        let mut declines = 0;
        for i in 1..volumes.len() {
            if volumes[i] < volumes[i - 1] {
                declines += 1;
            } else {
                break;
            }
        }

        if declines < self.min_levels - 1 {
            return None;
        }
        if volumes[0] == 0 {
            return None;
        }

        let decline_pct = (volumes[0] - volumes[declines]) as f64 / volumes[0] as f64;
        if decline_pct < self.min_decline_pct {
            return None;
        }

        Some(ExhaustionRead {
            consecutive_declines: declines,
            decline_pct,
            volumes: volumes[..=declines].to_vec(),
        })
    }
}
