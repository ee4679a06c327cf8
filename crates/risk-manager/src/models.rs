use serde::{Deserialize, Serialize};

/// Account-level limits applied on top of the per-profile caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Maximum sum of target weights (1.0 = fully invested, no leverage)
    #[serde(default = "default_max_gross_exposure")]
    pub max_gross_exposure: f64,
    /// Unrealized loss, as a percentage of equity, that halts trading
    #[serde(default = "default_daily_loss_halt")]
    pub daily_loss_halt_percent: f64,
    /// Minimum 24h volume for an asset we are buying
    #[serde(default = "default_min_liquidity_volume")]
    pub min_liquidity_volume: f64,
    /// Maximum quoted spread for an asset we are buying
    #[serde(default = "default_max_spread")]
    pub max_spread: f64,
}

fn default_max_gross_exposure() -> f64 { 1.0 }
fn default_daily_loss_halt() -> f64 { 5.0 }
fn default_min_liquidity_volume() -> f64 { 100_000.0 }
fn default_max_spread() -> f64 { 0.01 }

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_gross_exposure: default_max_gross_exposure(),
            daily_loss_halt_percent: default_daily_loss_halt(),
            min_liquidity_volume: default_min_liquidity_volume(),
            max_spread: default_max_spread(),
        }
    }
}

/// Rule names reported in [`decision_core::RiskViolation::rule`]
pub mod rules {
    pub const WEIGHT_CAP: &str = "weight_cap";
    pub const GROSS_EXPOSURE: &str = "gross_exposure";
    pub const POSITION_COUNT: &str = "position_count";
    pub const LOW_LIQUIDITY: &str = "low_liquidity";
    pub const WIDE_SPREAD: &str = "wide_spread";
    pub const DAILY_LOSS: &str = "daily_loss";
    pub const NO_EQUITY: &str = "no_equity";
}
