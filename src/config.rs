// =============================================================================
// Engine configuration — JSON-backed settings with atomic save
// =============================================================================
//
// Every tunable parameter of the core lives here. Persistence uses an atomic
// tmp + rename pattern to prevent corruption on crash. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an
// older config file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::EngineError;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "MES".to_string()
}

fn default_timeframe_secs() -> u32 {
    300
}

fn default_imbalance_threshold() -> f64 {
    3.0
}

fn default_imbalance_min_volume() -> u64 {
    10
}

fn default_stacked_imbalance_min() -> usize {
    3
}

fn default_exhaustion_min_levels() -> usize {
    3
}

fn default_exhaustion_min_decline() -> f64 {
    0.30
}

fn default_divergence_lookback() -> usize {
    5
}

fn default_absorption_min_volume() -> u64 {
    100
}

fn default_unfinished_max_volume() -> u64 {
    5
}

fn default_min_regime_score() -> f64 {
    4.0
}

fn default_min_regime_confidence() -> f64 {
    0.6
}

fn default_min_signal_strength() -> f64 {
    0.5
}

fn default_adx_trend_threshold() -> f64 {
    25.0
}

fn default_adx_weak_threshold() -> f64 {
    20.0
}

fn default_atr_high_percentile() -> f64 {
    70.0
}

fn default_atr_extreme_percentile() -> f64 {
    85.0
}

fn default_no_trade_before_open_minutes() -> i64 {
    5
}

fn default_no_trade_before_close_minutes() -> i64 {
    15
}

fn default_daily_profit_target() -> f64 {
    500.0
}

fn default_daily_loss_limit() -> f64 {
    -300.0
}

fn default_max_position_size() -> u32 {
    2
}

fn default_max_concurrent_trades() -> usize {
    1
}

fn default_stop_ticks() -> i64 {
    16
}

fn default_target_ticks() -> i64 {
    24
}

fn default_paper_starting_balance() -> f64 {
    2500.0
}

fn default_flatten_before_close_minutes() -> i64 {
    5
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Footprint bar duration in seconds.
    #[serde(default = "default_timeframe_secs")]
    pub timeframe_secs: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            timeframe_secs: default_timeframe_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFlowConfig {
    /// Diagonal ratio required to flag an imbalance (3.0 = 300%).
    #[serde(default = "default_imbalance_threshold")]
    pub imbalance_threshold: f64,

    /// Minimum volume on the dominant side. The symbol profile can raise
    /// this floor for heavier instruments.
    #[serde(default = "default_imbalance_min_volume")]
    pub imbalance_min_volume: u64,

    #[serde(default = "default_stacked_imbalance_min")]
    pub stacked_imbalance_min: usize,

    #[serde(default = "default_exhaustion_min_levels")]
    pub exhaustion_min_levels: usize,

    #[serde(default = "default_exhaustion_min_decline")]
    pub exhaustion_min_decline: f64,

    #[serde(default = "default_divergence_lookback")]
    pub divergence_lookback: usize,

    #[serde(default = "default_absorption_min_volume")]
    pub absorption_min_volume: u64,

    #[serde(default = "default_unfinished_max_volume")]
    pub unfinished_max_volume: u64,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self {
            imbalance_threshold: default_imbalance_threshold(),
            imbalance_min_volume: default_imbalance_min_volume(),
            stacked_imbalance_min: default_stacked_imbalance_min(),
            exhaustion_min_levels: default_exhaustion_min_levels(),
            exhaustion_min_decline: default_exhaustion_min_decline(),
            divergence_lookback: default_divergence_lookback(),
            absorption_min_volume: default_absorption_min_volume(),
            unfinished_max_volume: default_unfinished_max_volume(),
        }
    }
}

/// A wall-clock window (ET) during which the classifier forces NO_TRADE,
/// e.g. `{ "start": "08:25", "end": "08:40" }` around a data release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    #[serde(default = "default_min_regime_score")]
    pub min_regime_score: f64,

    #[serde(default = "default_min_regime_confidence")]
    pub min_regime_confidence: f64,

    #[serde(default = "default_min_signal_strength")]
    pub min_signal_strength: f64,

    #[serde(default = "default_adx_trend_threshold")]
    pub adx_trend_threshold: f64,

    #[serde(default = "default_adx_weak_threshold")]
    pub adx_weak_threshold: f64,

    #[serde(default = "default_atr_high_percentile")]
    pub atr_high_percentile: f64,

    #[serde(default = "default_atr_extreme_percentile")]
    pub atr_extreme_percentile: f64,

    #[serde(default = "default_no_trade_before_open_minutes")]
    pub no_trade_before_open_minutes: i64,

    #[serde(default = "default_no_trade_before_close_minutes")]
    pub no_trade_before_close_minutes: i64,

    #[serde(default)]
    pub news_windows: Vec<NewsWindow>,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_regime_score: default_min_regime_score(),
            min_regime_confidence: default_min_regime_confidence(),
            min_signal_strength: default_min_signal_strength(),
            adx_trend_threshold: default_adx_trend_threshold(),
            adx_weak_threshold: default_adx_weak_threshold(),
            atr_high_percentile: default_atr_high_percentile(),
            atr_extreme_percentile: default_atr_extreme_percentile(),
            no_trade_before_open_minutes: default_no_trade_before_open_minutes(),
            no_trade_before_close_minutes: default_no_trade_before_close_minutes(),
            news_windows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_daily_profit_target")]
    pub daily_profit_target: f64,

    /// Negative dollars.
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: f64,

    #[serde(default = "default_max_position_size")]
    pub max_position_size: u32,

    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_profit_target: default_daily_profit_target(),
            daily_loss_limit: default_daily_loss_limit(),
            max_position_size: default_max_position_size(),
            max_concurrent_trades: default_max_concurrent_trades(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_stop_ticks")]
    pub stop_ticks: i64,

    #[serde(default = "default_target_ticks")]
    pub target_ticks: i64,

    #[serde(default = "default_paper_starting_balance")]
    pub paper_starting_balance: f64,

    /// Ticks of adverse slippage applied to simulated entry fills.
    #[serde(default)]
    pub paper_slippage_ticks: i64,

    /// When set, simulated target fills require price to trade *through*
    /// the level (strict inequality), as if we were last in the queue.
    #[serde(default)]
    pub conservative_fills: bool,

    /// Skip the trading-hours gate (replay / overnight testing).
    #[serde(default)]
    pub bypass_trading_hours: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stop_ticks: default_stop_ticks(),
            target_ticks: default_target_ticks(),
            paper_starting_balance: default_paper_starting_balance(),
            paper_slippage_ticks: 0,
            conservative_fills: false,
            bypass_trading_hours: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    #[serde(default = "default_flatten_before_close_minutes")]
    pub flatten_before_close_minutes: i64,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            flatten_before_close_minutes: default_flatten_before_close_minutes(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub order_flow: OrderFlowConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub ops: OpsConfig,
}

impl EngineConfig {
    /// Load from a JSON file, or fall back to defaults when the file is
    /// missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Save atomically: write to `<path>.tmp`, then rename over the target.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to rename {} into place", tmp.display()))?;
        Ok(())
    }

    /// Apply recognized environment overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_f64("TAPEFLOW_PROFIT_TARGET") {
            self.risk.daily_profit_target = v;
        }
        if let Some(v) = env_f64("TAPEFLOW_LOSS_LIMIT") {
            self.risk.daily_loss_limit = v;
        }
        if let Some(v) = env_f64("TAPEFLOW_MAX_POSITION_SIZE") {
            self.risk.max_position_size = v as u32;
        }
    }

    /// Reject configurations the engine must not start with.
    pub fn validate(&self) -> std::result::Result<(), EngineError> {
        if self.risk.daily_loss_limit >= 0.0 {
            return Err(EngineError::config(format!(
                "daily_loss_limit must be negative, got {}",
                self.risk.daily_loss_limit
            )));
        }
        if self.risk.daily_profit_target <= 0.0 {
            return Err(EngineError::config(format!(
                "daily_profit_target must be positive, got {}",
                self.risk.daily_profit_target
            )));
        }
        if self.execution.stop_ticks <= 0 || self.execution.target_ticks <= 0 {
            return Err(EngineError::config(
                "stop_ticks and target_ticks must be positive",
            ));
        }
        if self.risk.max_position_size == 0 {
            return Err(EngineError::config("max_position_size must be at least 1"));
        }
        if self.trading.timeframe_secs == 0 {
            return Err(EngineError::config("timeframe_secs must be positive"));
        }
        Ok(())
    }
}

fn env_f64(key: &str) -> Option<f64> {
    match std::env::var(key) {
        Ok(raw) => match raw.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable env override");
                None
            }
        },
        Err(_) => None,
    }
}
