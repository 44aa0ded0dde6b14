// =============================================================================
// Error taxonomy for the trading core
// =============================================================================
//
// The hot path never panics on bad input: malformed ticks are dropped and
// counted, configuration problems stop construction, broker and persistence
// failures surface as typed variants the callers decide how to handle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-order tick, unknown symbol. The tick is dropped
    /// and counted; this never halts the session.
    #[error("data error: {0}")]
    Data(String),

    /// Invalid configuration detected at construction. Hard stop.
    #[error("config error: {0}")]
    Config(String),

    /// Broker submit/cancel/exit failure after retries.
    #[error("broker error: {0}")]
    Broker(String),

    /// Broker and engine disagree about open positions at startup.
    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    /// Daily profit target or loss limit crossed.
    #[error("limit triggered: {0}")]
    LimitTriggered(String),

    /// State save/load failure. Logged and retried on the next write;
    /// in-memory state is never touched.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
