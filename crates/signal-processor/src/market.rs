//! Momentum, volatility and risk terms derived from market data and claim metadata.

use decision_core::math::{signed_unit, unit};
use decision_core::{Claim, MarketStats, TechnicalIndicators};

use crate::roles::{macd_term, volatility_proxy};

const PRICE_CHANGE_SCALE: f64 = 10.0;
const VOLUME_CHANGE_SCALE: f64 = 50.0;

/// Volume below this counts against the risk score
const LOW_VOLUME_REFERENCE: f64 = 1_000_000.0;

const FLAG_RISK_PER_TAG: f64 = 0.1;

/// Price and volume change momentum, blended 60/40 with MACD momentum when available.
pub fn momentum(stats: &MarketStats, tech: Option<&TechnicalIndicators>) -> f64 {
    let price = (stats.price_change_24h / PRICE_CHANGE_SCALE).tanh();
    let market = if stats.volume_change_24h.abs() > f64::EPSILON {
        let volume = (stats.volume_change_24h / VOLUME_CHANGE_SCALE).tanh();
        0.7 * price + 0.3 * volume
    } else {
        price
    };

    let blended = match tech.and_then(TechnicalIndicators::histogram) {
        Some(h) => 0.6 * market + 0.4 * macd_term(h),
        None => market,
    };
    signed_unit(blended)
}

/// Volatility in [0, 1], preferring the indicator proxy over the raw 24h move.
/// The second value is the indicator proxy itself, when one was available.
pub fn volatility(stats: &MarketStats, tech: Option<&TechnicalIndicators>) -> (f64, Option<f64>) {
    match tech.and_then(volatility_proxy) {
        Some(proxy) => (unit(proxy), Some(proxy)),
        None => (unit(stats.price_change_24h.abs() / PRICE_CHANGE_SCALE), None),
    }
}

/// Confidence-weighted flag risk across claims, in [0, 1].
pub fn flag_risk(claims: &[&Claim]) -> f64 {
    let total_confidence: f64 = claims.iter().map(|c| c.bounded_confidence()).sum();
    if total_confidence <= f64::EPSILON {
        return 0.0;
    }
    let weighted: f64 = claims
        .iter()
        .map(|c| c.bounded_confidence() * unit(c.risk_flags.len() as f64 * FLAG_RISK_PER_TAG))
        .sum();
    weighted / total_confidence
}

/// 60% flag risk, 30% volatility, 10% low-volume penalty.
pub fn risk_score(claims: &[&Claim], volatility: f64, stats: &MarketStats) -> f64 {
    let low_volume = (1.0 - stats.volume_24h / LOW_VOLUME_REFERENCE).max(0.0);
    unit(0.6 * flag_risk(claims) + 0.3 * volatility + 0.1 * low_volume)
}
