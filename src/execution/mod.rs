// =============================================================================
// Execution — bracket orders, positions, fills, and the broker bridge
// =============================================================================

pub mod bridge;
pub mod manager;
pub mod orders;

pub use bridge::{BrokerAdapter, BrokerPosition, ExecutionBridge, LiveOrder, RetryPolicy};
pub use manager::ExecutionManager;
pub use orders::{BracketOrder, ExitReason, OrderStatus, Position, Trade};
