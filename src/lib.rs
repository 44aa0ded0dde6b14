// =============================================================================
// tapeflow — intraday order-flow futures trading core
// =============================================================================
//
// Pipeline: ticks -> footprint bars -> pattern detectors -> regime-gated
// router -> bracket execution with tier-based sizing and session risk
// limits. External collaborators (data feeds, broker, notification
// transport, persistence directories) plug in through the traits exposed
// here.

pub mod aggregator;
pub mod capital;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod notifications;
pub mod persistence;
pub mod regime;
pub mod scheduler;
pub mod session;
pub mod symbols;
pub mod types;

pub use engine::{OrderFlowEngine, TradingPipeline};
pub use error::{EngineError, Result};
