// =============================================================================
// Unfinished business — incomplete auctions at bar extremes
// =============================================================================
//
// An auction that ends with volume on only one side of an extreme is
// incomplete; those prices tend to get revisited. The detector records
// unfinished highs/lows per symbol (bounded to the most recent 50) and
// emits a revisit signal when a later bar trades back through one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{Direction, FootprintBar, Price, Signal, SignalDetails, SignalPattern};

const UNFINISHED_STRENGTH: f64 = 0.6;
const REVISIT_STRENGTH: f64 = 0.5;
const MAX_TRACKED_LEVELS: usize = 50;

/// Which extreme the incomplete auction printed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremeKind {
    High,
    Low,
}

/// A tracked unfinished level awaiting revisit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnfinishedLevel {
    pub price: Price,
    pub time: DateTime<Utc>,
    pub kind: ExtremeKind,
}

pub struct UnfinishedBusinessDetector {
    /// Max volume on the weak side for the auction to count as unfinished.
    threshold: u64,
    levels: HashMap<String, Vec<UnfinishedLevel>>,
}

impl UnfinishedBusinessDetector {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            levels: HashMap::new(),
        }
    }

    /// Detect unfinished business at this bar's extremes.
    pub fn detect(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let sorted = bar.sorted_levels();
        let (Some(low_level), Some(high_level)) = (sorted.first(), sorted.last()) else {
            return signals;
        };

        // Unfinished high: buyers kept hitting but never lifted the offer.
        if high_level.ask_volume <= self.threshold && high_level.bid_volume > self.threshold {
            let detail = SignalDetails::Unfinished {
                bid_volume: high_level.bid_volume,
                ask_volume: high_level.ask_volume,
            };
            self.track(&bar.symbol, bar.high, bar.end_time, ExtremeKind::High);
            signals.push(Signal::new(
                bar.end_time,
                &bar.symbol,
                SignalPattern::UnfinishedHigh,
                Direction::Long, // the level acts as a magnet above
                UNFINISHED_STRENGTH,
                bar.high,
                detail,
            ));
        }

        // Unfinished low: sellers kept hitting but never broke the bid.
        if low_level.bid_volume <= self.threshold && low_level.ask_volume > self.threshold {
            let detail = SignalDetails::Unfinished {
                bid_volume: low_level.bid_volume,
                ask_volume: low_level.ask_volume,
            };
            self.track(&bar.symbol, bar.low, bar.end_time, ExtremeKind::Low);
            signals.push(Signal::new(
                bar.end_time,
                &bar.symbol,
                SignalPattern::UnfinishedLow,
                Direction::Short,
                UNFINISHED_STRENGTH,
                bar.low,
                detail,
            ));
        }

        signals
    }

    /// Emit a revisit signal for every tracked level inside this bar's range
    /// and drop it — the auction has completed.
    pub fn check_revisit(&mut self, bar: &FootprintBar) -> Vec<Signal> {
        let Some(tracked) = self.levels.get_mut(&bar.symbol) else {
            return Vec::new();
        };

        let mut signals = Vec::new();
        tracked.retain(|level| {
            let inside = level.price >= bar.low && level.price <= bar.high;
            if inside {
                signals.push(Signal::new(
                    bar.end_time,
                    &bar.symbol,
                    SignalPattern::UnfinishedRevisited,
                    match level.kind {
                        ExtremeKind::High => Direction::Long,
                        ExtremeKind::Low => Direction::Short,
                    },
                    REVISIT_STRENGTH,
                    level.price,
                    SignalDetails::Revisit {
                        original_time: level.time,
                    },
                ));
            }
            !inside
        });
        signals
    }

    /// Active unfinished levels for a symbol.
    pub fn active_levels(&self, symbol: &str) -> Vec<UnfinishedLevel> {
        self.levels.get(symbol).cloned().unwrap_or_default()
    }

    pub fn reset(&mut self) {
        self.levels.clear();
    }

    fn track(&mut self, symbol: &str, price: Price, time: DateTime<Utc>, kind: ExtremeKind) {
        let entry = self.levels.entry(symbol.to_string()).or_default();
        entry.push(UnfinishedLevel { price, time, kind });
        if entry.len() > MAX_TRACKED_LEVELS {
            let excess = entry.len() - MAX_TRACKED_LEVELS;
            entry.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::types::PriceLevel;

    const TICK: f64 = 0.25;

    fn bar(n: i64, levels: &[(f64, u64, u64)]) -> FootprintBar {
        let mut map = BTreeMap::new();
        let mut high = f64::MIN;
        let mut low = f64::MAX;
        for (points, bid, ask) in levels {
            let price = Price::from_points(*points, TICK);
            map.insert(
                price,
                PriceLevel { price, bid_volume: *bid, ask_volume: *ask },
            );
            high = high.max(*points);
            low = low.min(*points);
        }
        FootprintBar {
            symbol: "MES".into(),
            start_time: DateTime::from_timestamp(n * 300, 0).unwrap(),
            end_time: DateTime::from_timestamp((n + 1) * 300, 0).unwrap(),
            timeframe_secs: 300,
            tick_size: TICK,
            open: Price::from_points(low, TICK),
            high: Price::from_points(high, TICK),
            low: Price::from_points(low, TICK),
            close: Price::from_points(low, TICK),
            levels: map,
        }
    }

    #[test]
    fn unfinished_high_is_tracked() {
        let mut det = UnfinishedBusinessDetector::new(5);
        // Top level: 20 bids, 2 asks — buyers never lifted the offer.
        let b = bar(0, &[(5000.00, 10, 30), (5000.25, 20, 2)]);
        let signals = det.detect(&b);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].pattern, SignalPattern::UnfinishedHigh);
        assert_eq!(signals[0].direction, Direction::Long);
        assert_eq!(det.active_levels("MES").len(), 1);
        assert_eq!(det.active_levels("MES")[0].kind, ExtremeKind::High);
    }

    #[test]
    fn unfinished_low_is_tracked() {
        let mut det = UnfinishedBusinessDetector::new(5);
        // Bottom level: 2 bids, 25 asks.
        let b = bar(0, &[(4999.75, 2, 25), (5000.00, 30, 30)]);
        let signals = det.detect(&b);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].pattern, SignalPattern::UnfinishedLow);
        assert_eq!(signals[0].direction, Direction::Short);
    }

    #[test]
    fn completed_auction_is_quiet() {
        let mut det = UnfinishedBusinessDetector::new(5);
        // Both sides printed at both extremes.
        let b = bar(0, &[(5000.00, 30, 30), (5000.25, 25, 25)]);
        assert!(det.detect(&b).is_empty());
        assert!(det.active_levels("MES").is_empty());
    }

    #[test]
    fn revisit_fires_once_and_clears() {
        let mut det = UnfinishedBusinessDetector::new(5);
        det.detect(&bar(0, &[(5000.00, 10, 30), (5000.25, 20, 2)]));
        assert_eq!(det.active_levels("MES").len(), 1);

        // A later bar trades through 5000.25.
        let revisit_bar = bar(3, &[(5000.00, 10, 10), (5000.25, 10, 10), (5000.50, 10, 10)]);
        let signals = det.check_revisit(&revisit_bar);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].pattern, SignalPattern::UnfinishedRevisited);
        assert_eq!(signals[0].direction, Direction::Long);
        assert_eq!(signals[0].price, Price::from_points(5000.25, TICK));

        // Level is gone; a second pass stays quiet.
        assert!(det.active_levels("MES").is_empty());
        assert!(det.check_revisit(&revisit_bar).is_empty());
    }

    #[test]
    fn bar_away_from_level_does_not_revisit() {
        let mut det = UnfinishedBusinessDetector::new(5);
        det.detect(&bar(0, &[(5000.00, 10, 30), (5000.25, 20, 2)]));

        let far_bar = bar(3, &[(4998.00, 10, 10), (4998.25, 10, 10)]);
        assert!(det.check_revisit(&far_bar).is_empty());
        assert_eq!(det.active_levels("MES").len(), 1);
    }

    #[test]
    fn tracked_set_is_bounded() {
        let mut det = UnfinishedBusinessDetector::new(5);
        for i in 0..60 {
            // Each bar prints a fresh unfinished high two ticks apart so no
            // revisit clears them.
            let base = 5000.0 + i as f64;
            det.detect(&bar(i as i64, &[(base, 10, 30), (base + 0.25, 20, 2)]));
        }
        assert_eq!(det.active_levels("MES").len(), MAX_TRACKED_LEVELS);
    }
}
