// =============================================================================
// Absorption detection — passive orders soaking up aggressive flow
// =============================================================================
//
// Heavy aggressive volume at an extreme with no price follow-through: the
// other side is quietly absorbing. At the high, aggressive buying that fails
// (close ends in the lower half of the bar) reads as sellers absorbing —
// direction SHORT. Mirrored at the low.

use crate::types::{Direction, FootprintBar, Signal, SignalDetails, SignalPattern};

/// Levels inspected at each extreme.
const EXTREME_LEVELS: usize = 3;
/// Share of the extreme's volume the aggressor side must carry.
const AGGRESSOR_SHARE: f64 = 0.6;

pub struct AbsorptionDetector {
    /// Minimum total volume across the extreme levels.
    min_volume: u64,
}

impl AbsorptionDetector {
    pub fn new(min_volume: u64) -> Self {
        Self { min_volume }
    }

    pub fn detect(&self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();

        if let Some(s) = self.check_high(bar) {
            signals.push(s);
        }
        if let Some(s) = self.check_low(bar) {
            signals.push(s);
        }

        signals
    }

    /// Aggressive buying absorbed at the bar high.
    fn check_high(&self, bar: &FootprintBar) -> Option<Signal> {
        let levels = bar.sorted_levels();
        if levels.len() < EXTREME_LEVELS {
            return None;
        }

        let top = &levels[levels.len() - EXTREME_LEVELS..];
        let ask_volume: u64 = top.iter().map(|l| l.ask_volume).sum();
        let bid_volume: u64 = top.iter().map(|l| l.bid_volume).sum();
        let total = ask_volume + bid_volume;

        if total < self.min_volume {
            return None;
        }
        if (ask_volume as f64) < total as f64 * AGGRESSOR_SHARE {
            return None;
        }

        let close_position = bar.close_position()?;
        // Close in the upper half means the buying worked; no rejection.
        if close_position > 0.5 {
            return None;
        }

        let strength = (1.0 - close_position) * (ask_volume as f64 / self.min_volume as f64) / 2.0;
        Some(Signal::new(
            bar.end_time,
            &bar.symbol,
            SignalPattern::SellingAbsorption,
            Direction::Short,
            strength,
            bar.high,
            SignalDetails::Absorption {
                aggressor_volume: ask_volume,
                total_volume: total,
                close_position,
            },
        ))
    }

    /// Aggressive selling absorbed at the bar low.
    fn check_low(&self, bar: &FootprintBar) -> Option<Signal> {
        let levels = bar.sorted_levels();
        if levels.len() < EXTREME_LEVELS {
            return None;
        }

        let bottom = &levels[..EXTREME_LEVELS];
        let ask_volume: u64 = bottom.iter().map(|l| l.ask_volume).sum();
        let bid_volume: u64 = bottom.iter().map(|l| l.bid_volume).sum();
        let total = ask_volume + bid_volume;

        if total < self.min_volume {
            return None;
        }
        if (bid_volume as f64) < total as f64 * AGGRESSOR_SHARE {
            return None;
        }

        let close_position = bar.close_position()?;
        // Close in the lower half means the selling worked; no rejection.
        if close_position < 0.5 {
            return None;
        }

        let strength = close_position * (bid_volume as f64 / self.min_volume as f64) / 2.0;
        Some(Signal::new(
            bar.end_time,
            &bar.symbol,
            SignalPattern::BuyingAbsorption,
            Direction::Long,
            strength,
            bar.low,
            SignalDetails::Absorption {
                aggressor_volume: bid_volume,
                total_volume: total,
                close_position,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use crate::types::{Price, PriceLevel};

    const TICK: f64 = 0.25;

    fn bar(levels: &[(f64, u64, u64)], close: f64) -> FootprintBar {
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
            symbol: "ES".into(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            timeframe_secs: 300,
            tick_size: TICK,
            open: Price::from_points(low, TICK),
            high: Price::from_points(high, TICK),
            low: Price::from_points(low, TICK),
            close: Price::from_points(close, TICK),
            levels: map,
        }
    }

    #[test]
    fn selling_absorption_at_high() {
        // Top three levels: 180 aggressive buys vs 20 sells, but the close
        // sits right at the low — full rejection.
        let levels = [
            (5000.00, 10, 5),
            (5000.25, 5, 60),
            (5000.50, 10, 60),
            (5000.75, 5, 60),
        ];
        let b = bar(&levels, 5000.00);
        let detector = AbsorptionDetector::new(100);
        let signals = detector.detect(&b);

        let s = signals
            .iter()
            .find(|s| s.pattern == SignalPattern::SellingAbsorption)
            .expect("selling absorption expected");
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.price, b.high);
        match s.details {
            SignalDetails::Absorption { aggressor_volume, total_volume, close_position } => {
                assert_eq!(aggressor_volume, 180);
                assert_eq!(total_volume, 200);
                assert!(close_position < 1e-9);
            }
            _ => panic!("wrong details variant"),
        }
        // strength = (1 - 0) * (180/100) / 2 = 0.9
        assert!((s.strength - 0.9).abs() < 1e-9);
    }

    #[test]
    fn buying_absorption_at_low() {
        let levels = [
            (4999.50, 70, 5),
            (4999.75, 70, 5),
            (5000.00, 70, 10),
            (5000.25, 5, 10),
        ];
        let b = bar(&levels, 5000.25);
        let detector = AbsorptionDetector::new(100);
        let signals = detector.detect(&b);

        let s = signals
            .iter()
            .find(|s| s.pattern == SignalPattern::BuyingAbsorption)
            .expect("buying absorption expected");
        assert_eq!(s.direction, Direction::Long);
        assert_eq!(s.price, b.low);
    }

    #[test]
    fn close_near_high_is_not_absorption() {
        // Same heavy buying, but price held its gains.
        let levels = [
            (5000.00, 10, 5),
            (5000.25, 5, 60),
            (5000.50, 10, 60),
            (5000.75, 5, 60),
        ];
        let b = bar(&levels, 5000.75);
        let detector = AbsorptionDetector::new(100);
        assert!(detector
            .detect(&b)
            .iter()
            .all(|s| s.pattern != SignalPattern::SellingAbsorption));
    }

    #[test]
    fn thin_volume_is_ignored() {
        let levels = [
            (5000.25, 1, 10),
            (5000.50, 1, 10),
            (5000.75, 1, 10),
        ];
        let b = bar(&levels, 5000.25);
        let detector = AbsorptionDetector::new(100);
        assert!(detector.detect(&b).is_empty());
    }

    #[test]
    fn balanced_flow_is_ignored() {
        // Plenty of volume but nobody dominates the tape.
        let levels = [
            (5000.25, 50, 50),
            (5000.50, 50, 50),
            (5000.75, 50, 50),
        ];
        let b = bar(&levels, 5000.25);
        let detector = AbsorptionDetector::new(100);
        assert!(detector.detect(&b).is_empty());
    }
}
