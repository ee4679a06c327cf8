//! Portfolio Constructor
//!
//! Turns ranked signals into bounded target weights (half-Kelly sizes,
//! risk-adjusted ranking, correlation penalty, per-position clipping) and
//! diffs those weights against live positions to plan notional orders.

pub mod constructor;
pub mod correlation;
pub mod rebalancing;

pub use constructor::{PortfolioConstructor, CORRELATION_PENALTY, MIN_QUALIFYING_CONFIDENCE};
pub use correlation::CorrelationGroup;
pub use rebalancing::{OrderIntent, RebalanceCalculator};
