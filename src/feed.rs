// =============================================================================
// Data feed contract and historical replay
// =============================================================================
//
// Real feed adapters (exchange gateways) live outside the core; the engine
// only depends on this trait. Side mapping is the adapter's job:
// sell-aggressor => Bid, buy-aggressor => Ask. Adapters must deliver ticks
// in non-decreasing timestamp order per symbol.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::symbols;
use crate::types::{Side, Tick};

pub type TickCallback = Box<dyn FnMut(Tick) + Send>;

/// Contract every data feed adapter satisfies.
pub trait DataFeed: Send {
    /// Subscribe to the tick stream.
    fn register_callback(&mut self, cb: TickCallback);

    /// Control real-time streaming.
    fn start_live(
        &mut self,
        symbol: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn stop_live(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Finite, restartable historical stream for warm-up.
    fn get_historical(
        &mut self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<Tick>>> + Send;

    /// Historical stream with inter-tick pacing scaled by `speed`
    /// (2.0 = twice real time).
    fn replay_historical(
        &mut self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        speed: f64,
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory replay feed
// ---------------------------------------------------------------------------

/// Replays a pre-loaded tick vector. Used for warm-up, paper replay, and
/// tests.
pub struct ReplayFeed {
    ticks: Vec<Tick>,
    callbacks: Vec<TickCallback>,
}

impl ReplayFeed {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            ticks,
            callbacks: Vec::new(),
        }
    }

    /// Push every tick through the callbacks as fast as possible.
    pub fn run_unpaced(&mut self) {
        for tick in self.ticks.clone() {
            for cb in &mut self.callbacks {
                cb(tick.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl DataFeed for ReplayFeed {
    fn register_callback(&mut self, cb: TickCallback) {
        self.callbacks.push(cb);
    }

    async fn start_live(&mut self, _symbol: &str) -> Result<()> {
        anyhow::bail!("replay feed has no live stream")
    }

    async fn stop_live(&mut self) -> Result<()> {
        Ok(())
    }

    async fn get_historical(
        &mut self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Tick>> {
        Ok(self
            .ticks
            .iter()
            .filter(|t| t.symbol == symbol && t.timestamp >= start && t.timestamp < end)
            .cloned()
            .collect())
    }

    async fn replay_historical(
        &mut self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        speed: f64,
    ) -> Result<()> {
        let ticks: Vec<Tick> = self
            .ticks
            .iter()
            .filter(|t| t.symbol == symbol && t.timestamp >= start && t.timestamp < end)
            .cloned()
            .collect();
        info!(count = ticks.len(), speed, "replaying historical ticks");

        let mut prev: Option<DateTime<Utc>> = None;
        for tick in ticks {
            if speed > 0.0 {
                if let Some(p) = prev {
                    let gap = (tick.timestamp - p).num_microseconds().unwrap_or(0).max(0);
                    let scaled = (gap as f64 / speed) as u64;
                    if scaled > 0 {
                        sleep(Duration::from_micros(scaled)).await;
                    }
                }
            }
            prev = Some(tick.timestamp);
            for cb in &mut self.callbacks {
                cb(tick.clone());
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CSV tick loader
// ---------------------------------------------------------------------------

/// Load ticks from a CSV file with the columns
/// `timestamp_us,price,volume,side` (side is `BID` or `ASK`). Prices are
/// snapped to the symbol's tick grid on load. Malformed rows are dropped
/// and counted, never fatal.
pub fn load_ticks_csv(path: impl AsRef<Path>, symbol: &str) -> Result<Vec<Tick>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open tick file {}", path.display()))?;

    let mut ticks = Vec::new();
    let mut dropped = 0u64;

    for record in reader.records() {
        let record = record.with_context(|| "failed to read csv record")?;
        match parse_row(&record, symbol) {
            Some(tick) => ticks.push(tick),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(dropped, "malformed tick rows dropped");
    }
    info!(
        count = ticks.len(),
        file = %path.display(),
        "tick file loaded"
    );
    Ok(ticks)
}

fn parse_row(record: &csv::StringRecord, symbol: &str) -> Option<Tick> {
    let ts_us: i64 = record.get(0)?.trim().parse().ok()?;
    let price: f64 = record.get(1)?.trim().parse().ok()?;
    let volume: u64 = record.get(2)?.trim().parse().ok()?;
    let side = match record.get(3)?.trim() {
        "BID" | "bid" => Side::Bid,
        "ASK" | "ask" => Side::Ask,
        _ => return None,
    };
    if volume == 0 {
        return None;
    }
    Some(Tick {
        timestamp: DateTime::from_timestamp_micros(ts_us)?,
        price: symbols::normalize(price, symbol),
        volume,
        side,
        symbol: symbol.to_string(),
    })
}
