// =============================================================================
// Footprint aggregation — ticks to time-bucketed volume-at-price bars
// =============================================================================
//
// Bars are aligned to wall-clock multiples of the timeframe, never to the
// first tick: bucket(ts) = floor(ts_secs / T) * T. A tick landing exactly on
// a boundary belongs to the new bucket. Gaps produce no empty bars; the next
// tick simply opens a bar at its own bucket.
//
// Adapters must deliver ticks in non-decreasing timestamp order per symbol.
// Out-of-order ticks inside the current bucket are still accepted: high/low
// use max/min, and close is the last *processed* tick's price.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::indicators::slope;
use crate::types::{FootprintBar, PriceLevel, Side, Tick};

/// Completed bars retained for history queries, per aggregator.
const MAX_COMPLETED_BARS: usize = 500;

type BarObserver = Box<dyn FnMut(&FootprintBar) + Send>;

/// Aggregates a single symbol's tick stream into footprint bars of fixed
/// duration.
pub struct FootprintAggregator {
    symbol: String,
    timeframe_secs: u32,
    tick_size: f64,
    current: Option<FootprintBar>,
    completed: VecDeque<FootprintBar>,
    observers: Vec<BarObserver>,
}

impl FootprintAggregator {
    pub fn new(symbol: &str, timeframe_secs: u32, tick_size: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe_secs,
            tick_size,
            current: None,
            completed: VecDeque::new(),
            observers: Vec::new(),
        }
    }

    /// Register an observer invoked once per completed bar, in order.
    pub fn on_bar_complete(&mut self, cb: impl FnMut(&FootprintBar) + Send + 'static) {
        self.observers.push(Box::new(cb));
    }

    /// Process one tick. Returns the just-completed bar when this tick
    /// crossed a bucket boundary.
    pub fn process_tick(&mut self, tick: &Tick) -> Option<FootprintBar> {
        let bar_start = self.bucket_start(tick.timestamp);

        let crosses = match &self.current {
            Some(current) => bar_start > current.start_time,
            None => {
                self.current = Some(self.new_bar(tick, bar_start));
                self.add_tick(tick);
                return None;
            }
        };

        if !crosses {
            self.add_tick(tick);
            return None;
        }

        let completed = self
            .current
            .take()
            .expect("a crossing tick implies a current bar");
        debug!(
            symbol = %completed.symbol,
            start = %completed.start_time,
            volume = completed.total_volume(),
            delta = completed.delta(),
            levels = completed.levels.len(),
            "bar completed"
        );
        self.completed.push_back(completed.clone());
        while self.completed.len() > MAX_COMPLETED_BARS {
            self.completed.pop_front();
        }

        self.current = Some(self.new_bar(tick, bar_start));
        self.add_tick(tick);

        for observer in &mut self.observers {
            let call = std::panic::AssertUnwindSafe(|| observer(&completed));
            if std::panic::catch_unwind(call).is_err() {
                tracing::error!("bar observer panicked; continuing delivery");
            }
        }
        Some(completed)
    }

    /// Up to the last `n` completed bars, oldest first.
    pub fn recent_bars(&self, n: usize) -> Vec<FootprintBar> {
        let start = self.completed.len().saturating_sub(n);
        self.completed.iter().skip(start).cloned().collect()
    }

    /// The bar currently being built, if any.
    pub fn current_bar(&self) -> Option<&FootprintBar> {
        self.current.as_ref()
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.completed.clear();
    }

    fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let tf = self.timeframe_secs as i64;
        let bucket = secs.div_euclid(tf) * tf;
        DateTime::from_timestamp(bucket, 0).expect("bucket timestamp in range")
    }

    fn new_bar(&self, tick: &Tick, bar_start: DateTime<Utc>) -> FootprintBar {
        FootprintBar {
            symbol: self.symbol.clone(),
            start_time: bar_start,
            end_time: bar_start + Duration::seconds(self.timeframe_secs as i64),
            timeframe_secs: self.timeframe_secs,
            tick_size: self.tick_size,
            open: tick.price,
            high: tick.price,
            low: tick.price,
            close: tick.price,
            levels: BTreeMap::new(),
        }
    }

    fn add_tick(&mut self, tick: &Tick) {
        let bar = self.current.as_mut().expect("caller ensures a current bar");

        bar.high = bar.high.max(tick.price);
        bar.low = bar.low.min(tick.price);
        bar.close = tick.price;

        let level = bar
            .levels
            .entry(tick.price)
            .or_insert_with(|| PriceLevel::new(tick.price));
        match tick.side {
            Side::Ask => level.ask_volume += tick.volume,
            Side::Bid => level.bid_volume += tick.volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Cumulative delta
// ---------------------------------------------------------------------------

/// Running sum of per-bar delta with a bounded `(end_time, value)` history.
#[derive(Debug, Default)]
pub struct CumulativeDelta {
    value: i64,
    history: VecDeque<(DateTime<Utc>, i64)>,
}

const MAX_DELTA_HISTORY: usize = 1000;

impl CumulativeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a completed bar's delta and return the new cumulative value.
    pub fn update(&mut self, bar: &FootprintBar) -> i64 {
        self.value += bar.delta();
        self.history.push_back((bar.end_time, self.value));
        while self.history.len() > MAX_DELTA_HISTORY {
            self.history.pop_front();
        }
        self.value
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    /// Least-squares slope over the last `bars` history points.
    pub fn slope(&self, bars: usize) -> f64 {
        let values: Vec<f64> = self.history.iter().map(|(_, v)| *v as f64).collect();
        slope(&values, bars)
    }

    /// Reset at session start.
    pub fn reset(&mut self) {
        self.value = 0;
        self.history.clear();
    }
}

// ---------------------------------------------------------------------------
// Volume profile
// ---------------------------------------------------------------------------

use crate::types::Price;

/// Cross-bar volume-at-price aggregation: Point of Control, Value Area, and
/// high/low-volume nodes.
#[derive(Debug, Default)]
pub struct VolumeProfile {
    levels: BTreeMap<Price, PriceLevel>,
    bar_count: usize,
}

impl VolumeProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a completed bar's levels into the profile.
    pub fn add_bar(&mut self, bar: &FootprintBar) {
        for (price, level) in &bar.levels {
            let entry = self
                .levels
                .entry(*price)
                .or_insert_with(|| PriceLevel::new(*price));
            entry.bid_volume += level.bid_volume;
            entry.ask_volume += level.ask_volume;
        }
        self.bar_count += 1;
    }

    pub fn bar_count(&self) -> usize {
        self.bar_count
    }

    /// Point of Control: the price with the highest total volume.
    pub fn poc(&self) -> Option<Price> {
        self.levels
            .values()
            .max_by_key(|l| l.total_volume())
            .map(|l| l.price)
    }

    /// Value Area: the price range covering at least `percentage` of total
    /// volume, built by taking levels in descending volume order.
    pub fn value_area(&self, percentage: f64) -> Option<(Price, Price)> {
        if self.levels.is_empty() {
            return None;
        }
        let total: u64 = self.levels.values().map(PriceLevel::total_volume).sum();
        if total == 0 {
            return None;
        }
        let target = total as f64 * percentage;

        let mut sorted: Vec<&PriceLevel> = self.levels.values().collect();
        sorted.sort_by(|a, b| b.total_volume().cmp(&a.total_volume()));

        let mut accumulated = 0u64;
        let mut low = sorted[0].price;
        let mut high = sorted[0].price;
        for level in sorted {
            accumulated += level.total_volume();
            low = low.min(level.price);
            high = high.max(level.price);
            if accumulated as f64 >= target {
                break;
            }
        }
        Some((low, high))
    }

    /// Prices whose volume is at least `threshold_pct` of the POC's volume.
    pub fn high_volume_nodes(&self, threshold_pct: f64) -> Vec<Price> {
        let Some(poc) = self.poc() else {
            return Vec::new();
        };
        let poc_volume = self.levels[&poc].total_volume();
        let threshold = poc_volume as f64 * threshold_pct;
        self.levels
            .values()
            .filter(|l| l.total_volume() as f64 >= threshold)
            .map(|l| l.price)
            .collect()
    }

    /// Prices whose volume is at most `threshold_pct` of the profile total.
    /// Single prints and low-volume shelves often act as fast-travel zones.
    pub fn low_volume_nodes(&self, threshold_pct: f64) -> Vec<Price> {
        let total: u64 = self.levels.values().map(PriceLevel::total_volume).sum();
        if total == 0 {
            return Vec::new();
        }
        let threshold = total as f64 * threshold_pct;
        self.levels
            .values()
            .filter(|l| l.total_volume() as f64 <= threshold)
            .map(|l| l.price)
            .collect()
    }

    pub fn reset(&mut self) {
        self.levels.clear();
        self.bar_count = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
