// =============================================================================
// State persistence — crash-recovery blobs and append-only logs
// =============================================================================
//
// Blob writes are atomic: serialize to `<name>.tmp`, rename the existing
// file to `<name>.backup.json`, then rename the tmp into place. Loads fall
// back to the backup generation when the primary is missing or corrupt.
// A failed save never touches in-memory state; it is logged and the next
// write retries.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::capital::TierState;
use crate::error::EngineError;
use crate::execution::{Position, Trade};
use crate::types::{FootprintBar, Regime};

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Everything the engine needs to resume after a crash.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub open_positions: Vec<Position>,
    pub completed_trades: Vec<Trade>,
    pub daily_pnl: f64,
    pub is_halted: bool,
    pub halt_reason: Option<String>,
    pub tick_count: u64,
    pub bar_count: u64,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Last-known regime per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeRecord {
    pub regime: Regime,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::persistence(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.backup.json"))
    }

    /// Atomic write with one backup generation.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), EngineError> {
        let target = self.path(name);
        let tmp = self.dir.join(format!("{name}.tmp"));

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| EngineError::persistence(format!("serialize {name}: {e}")))?;
        fs::write(&tmp, json)
            .map_err(|e| EngineError::persistence(format!("write {}: {e}", tmp.display())))?;

        if target.exists() {
            if let Err(e) = fs::rename(&target, self.backup_path(name)) {
                warn!(name, error = %e, "failed to rotate backup");
            }
        }
        fs::rename(&tmp, &target)
            .map_err(|e| EngineError::persistence(format!("rename {}: {e}", target.display())))?;

        debug!(name, "state saved");
        Ok(())
    }

    /// Load the blob, falling back to the backup generation. `Ok(None)`
    /// means nothing has ever been saved.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, EngineError> {
        match self.read_file(&self.path(name)) {
            Ok(value) => Ok(value),
            Err(e) => {
                error!(name, error = %e, "primary state unreadable, trying backup");
                match self.read_file(&self.backup_path(name)) {
                    Ok(Some(value)) => {
                        warn!(name, "state restored from backup generation");
                        Ok(Some(value))
                    }
                    Ok(None) => Ok(None),
                    Err(backup_err) => Err(backup_err),
                }
            }
        }
    }

    fn read_file<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, EngineError> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)
            .map_err(|e| EngineError::persistence(format!("read {}: {e}", path.display())))?;
        let value = serde_json::from_str(&raw)
            .map_err(|e| EngineError::persistence(format!("parse {}: {e}", path.display())))?;
        Ok(Some(value))
    }

    pub fn clear(&self, name: &str) {
        for path in [self.path(name), self.backup_path(name)] {
            if path.exists() {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to clear state file");
                }
            }
        }
    }

    // Typed convenience wrappers.

    pub fn save_engine_snapshot(&self, snapshot: &EngineSnapshot) -> Result<(), EngineError> {
        self.save("trading_state", snapshot)
    }

    pub fn load_engine_snapshot(&self) -> Result<Option<EngineSnapshot>, EngineError> {
        self.load("trading_state")
    }

    pub fn save_tier_state(&self, state: &TierState) -> Result<(), EngineError> {
        self.save("tier_state", state)
    }

    pub fn load_tier_state(&self) -> Result<Option<TierState>, EngineError> {
        self.load("tier_state")
    }

    pub fn save_regime_map(
        &self,
        map: &std::collections::HashMap<String, RegimeRecord>,
    ) -> Result<(), EngineError> {
        self.save("regime_state", map)
    }

    pub fn load_regime_map(
        &self,
    ) -> Result<Option<std::collections::HashMap<String, RegimeRecord>>, EngineError> {
        self.load("regime_state")
    }
}

// ---------------------------------------------------------------------------
// Append-only logs
// ---------------------------------------------------------------------------

/// JSONL appender for completed bars, one file per symbol. Used for
/// warm-up replay.
pub struct BarLog {
    dir: PathBuf,
}

impl BarLog {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::persistence(format!("create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    fn path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("bars_{symbol}.jsonl"))
    }

    pub fn append(&self, bar: &FootprintBar) -> Result<(), EngineError> {
        let line = serde_json::to_string(bar)
            .map_err(|e| EngineError::persistence(format!("serialize bar: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(&bar.symbol))
            .map_err(|e| EngineError::persistence(format!("open bar log: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| EngineError::persistence(format!("append bar: {e}")))?;
        Ok(())
    }

    /// Most recent `count` bars for a symbol, oldest first. Unparseable
    /// lines are skipped with a warning.
    pub fn recent(&self, symbol: &str, count: usize) -> Result<Vec<FootprintBar>, EngineError> {
        let path = self.path(symbol);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&path)
            .map_err(|e| EngineError::persistence(format!("open {}: {e}", path.display())))?;
        let mut bars = Vec::new();
        for line in BufReader::new(file).lines() {
            let line =
                line.map_err(|e| EngineError::persistence(format!("read bar log: {e}")))?;
            match serde_json::from_str::<FootprintBar>(&line) {
                Ok(bar) => bars.push(bar),
                Err(e) => warn!(symbol, error = %e, "skipping corrupt bar log line"),
            }
        }
        let start = bars.len().saturating_sub(count);
        Ok(bars.split_off(start))
    }
}

/// JSONL audit trail of completed trades, one file per session date.
pub struct TradeAudit {
    path: PathBuf,
}

impl TradeAudit {
    pub fn new(dir: impl Into<PathBuf>, session_date: &str) -> Result<Self, EngineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| EngineError::persistence(format!("create {}: {e}", dir.display())))?;
        Ok(Self {
            path: dir.join(format!("trades_{session_date}.jsonl")),
        })
    }

    pub fn append(&self, trade: &Trade) -> Result<(), EngineError> {
        let line = serde_json::to_string(trade)
            .map_err(|e| EngineError::persistence(format!("serialize trade: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::persistence(format!("open trade audit: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| EngineError::persistence(format!("append trade: {e}")))?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<Trade>, EngineError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)
            .map_err(|e| EngineError::persistence(format!("open trade audit: {e}")))?;
        let mut trades = Vec::new();
        for line in BufReader::new(file).lines() {
            let line =
                line.map_err(|e| EngineError::persistence(format!("read trade audit: {e}")))?;
            match serde_json::from_str::<Trade>(&line) {
                Ok(t) => trades.push(t),
                Err(e) => warn!(error = %e, "skipping corrupt audit line"),
            }
        }
        Ok(trades)
    }
}

/// Convenience: write the tier state and log on failure rather than
/// propagate — persistence must never take down the trading loop.
pub fn save_tier_state_or_log(store: &StateStore, state: &TierState) {
    if let Err(e) = store.save_tier_state(state) {
        error!(error = %e, "tier state save failed; will retry on next trade");
    } else {
        info!(balance = state.balance, "tier state persisted");
    }
}
