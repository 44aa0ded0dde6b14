// =============================================================================
// Imbalance detection — aggressive one-sided pressure at adjacent levels
// =============================================================================
//
// Uses diagonal comparison, ascending in price:
//   buy  imbalance at level i: ask[i] / bid[i-1] >= threshold
//   sell imbalance at level i: bid[i] / ask[i+1] >= threshold
//
// Stacked imbalances are runs of same-direction imbalances at consecutive
// prices (exactly one tick apart). Sustained aggression across several
// levels is a much stronger read than a single diagonal.

use crate::types::{
    Direction, FootprintBar, Price, Signal, SignalDetails, SignalPattern,
};

pub struct ImbalanceDetector {
    /// Ratio required to flag an imbalance (3.0 = 300%).
    threshold: f64,
    /// Minimum volume on the dominant side.
    min_volume: u64,
    /// Minimum run length for a stacked signal.
    min_stack: usize,
}

impl ImbalanceDetector {
    pub fn new(threshold: f64, min_volume: u64, min_stack: usize) -> Self {
        Self {
            threshold,
            min_volume,
            min_stack,
        }
    }

    /// Detect single-level imbalances in a completed bar.
    pub fn detect(&self, bar: &FootprintBar) -> Vec<Signal> {
        let mut signals = Vec::new();
        let levels = bar.sorted_levels();
        if levels.len() < 2 {
            return signals;
        }

        for i in 1..levels.len() {
            let current = levels[i];
            let below = levels[i - 1];

            // Buy imbalance: aggressive buying lifting offers against thin
            // bids one tick lower.
            if below.bid_volume > 0 && current.ask_volume >= self.min_volume {
                let ratio = current.ask_volume as f64 / below.bid_volume as f64;
                if ratio >= self.threshold {
                    signals.push(Signal::new(
                        bar.end_time,
                        &bar.symbol,
                        SignalPattern::BuyImbalance,
                        Direction::Long,
                        ratio / 10.0,
                        current.price,
                        SignalDetails::Imbalance {
                            ratio,
                            dominant_volume: current.ask_volume,
                            opposing_volume: below.bid_volume,
                        },
                    ));
                }
            }

            // Sell imbalance: aggressive selling hitting bids against thin
            // offers one tick higher.
            if i < levels.len() - 1 {
                let above = levels[i + 1];
                if above.ask_volume > 0 && current.bid_volume >= self.min_volume {
                    let ratio = current.bid_volume as f64 / above.ask_volume as f64;
                    if ratio >= self.threshold {
                        signals.push(Signal::new(
                            bar.end_time,
                            &bar.symbol,
                            SignalPattern::SellImbalance,
                            Direction::Short,
                            ratio / 10.0,
                            current.price,
                            SignalDetails::Imbalance {
                                ratio,
                                dominant_volume: current.bid_volume,
                                opposing_volume: above.ask_volume,
                            },
                        ));
                    }
                }
            }
        }

        signals
    }

    /// Detect vertically stacked imbalances.
    pub fn detect_stacked(&self, bar: &FootprintBar) -> Vec<Signal> {
        let imbalances = self.detect(bar);
        let mut signals = Vec::new();

        let buys: Vec<Price> = imbalances
            .iter()
            .filter(|s| s.direction == Direction::Long)
            .map(|s| s.price)
            .collect();
        let sells: Vec<Price> = imbalances
            .iter()
            .filter(|s| s.direction == Direction::Short)
            .map(|s| s.price)
            .collect();

        for stack in find_stacks(&buys) {
            if stack.len() >= self.min_stack {
                let bottom = stack[0];
                let top = *stack.last().expect("non-empty stack");
                signals.push(Signal::new(
                    bar.end_time,
                    &bar.symbol,
                    SignalPattern::StackedBuyImbalance,
                    Direction::Long,
                    stack.len() as f64 / 5.0,
                    top,
                    SignalDetails::StackedImbalance {
                        stack_size: stack.len(),
                        bottom_price: bottom,
                        top_price: top,
                    },
                ));
            }
        }

        for stack in find_stacks(&sells) {
            if stack.len() >= self.min_stack {
                let bottom = stack[0];
                let top = *stack.last().expect("non-empty stack");
                signals.push(Signal::new(
                    bar.end_time,
                    &bar.symbol,
                    SignalPattern::StackedSellImbalance,
                    Direction::Short,
                    stack.len() as f64 / 5.0,
                    bottom,
                    SignalDetails::StackedImbalance {
                        stack_size: stack.len(),
                        bottom_price: bottom,
                        top_price: top,
                    },
                ));
            }
        }

        signals
    }
}

/// Group ascending prices into runs of consecutive ticks. Only runs longer
/// than one entry are returned.
fn find_stacks(prices: &[Price]) -> Vec<Vec<Price>> {
    let mut stacks = Vec::new();
    let mut current: Vec<Price> = Vec::new();

    for &price in prices {
        match current.last() {
            Some(prev) if price.ticks_from(*prev) == 1 => current.push(price),
            Some(_) => {
                if current.len() > 1 {
                    stacks.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
                current.push(price);
            }
            None => current.push(price),
        }
    }
    if current.len() > 1 {
        stacks.push(current);
    }
    stacks
}
