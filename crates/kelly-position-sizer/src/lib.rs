use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Scale from a fused signal in [-1, 1] to an expected return.
pub const EXPECTED_RETURN_SCALE: f64 = 0.15;

/// Annual risk-free rate used for the Sharpe-like ranking, expressed per day.
pub const DAILY_RISK_FREE_RATE: f64 = 0.045 / 365.0;

/// Floor applied to volatility before it is used as a divisor.
pub const MIN_VOLATILITY: f64 = 0.01;

/// Fractional Kelly position sizing for fused signals.
///
/// The edge comes from the signal itself rather than a trade history:
///   expected_return = signal * 0.15 * (0.5 + 0.5 * confidence)
///   kelly           = max(0, expected_return / volatility^2) * multiplier
/// and zero whenever the return does not beat the risk-free rate.
/// The Kelly fraction is capped, then scaled by a sigmoid confidence
/// adjustment and an exponential risk penalty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyPositionSizer {
    /// Fractional Kelly multiplier (0.5 = half-Kelly)
    pub kelly_multiplier: f64,

    /// Cap on the Kelly fraction before confidence/risk adjustments
    pub max_position_size: f64,
}

/// Position sizing recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSize {
    /// Fraction of portfolio to allocate (0.0 to 1.0)
    pub fraction: f64,

    pub expected_return: f64,

    pub asset_volatility: f64,

    /// Fractional Kelly before the cap and adjustments
    pub raw_kelly_fraction: f64,

    pub reasoning: String,
}

impl Default for KellyPositionSizer {
    fn default() -> Self {
        Self {
            kelly_multiplier: 0.5,
            max_position_size: 0.25,
        }
    }
}

impl KellyPositionSizer {
    pub fn new(kelly_multiplier: f64, max_position_size: f64) -> Result<Self> {
        if kelly_multiplier <= 0.0 || kelly_multiplier > 1.0 {
            bail!("kelly_multiplier must be between 0 and 1");
        }
        if max_position_size <= 0.0 || max_position_size > 1.0 {
            bail!("max_position_size must be between 0 and 1");
        }

        Ok(Self {
            kelly_multiplier,
            max_position_size,
        })
    }

    /// Half-Kelly capped at `max_position_size`.
    pub fn half_kelly(max_position_size: f64) -> Self {
        Self {
            kelly_multiplier: 0.5,
            max_position_size: max_position_size.clamp(0.0, 1.0),
        }
    }

    /// Size a position from a fused signal.
    ///
    /// `technical_volatility` is the indicator-derived volatility proxy in [0, 1],
    /// when technical data was available for the asset.
    pub fn calculate(
        &self,
        signal: f64,
        confidence: f64,
        risk_score: f64,
        technical_volatility: Option<f64>,
    ) -> PositionSize {
        let expected = expected_return(signal, confidence);
        let volatility = asset_volatility(technical_volatility, risk_score);

        let raw_kelly = if risk_adjusted_return(expected, volatility, DAILY_RISK_FREE_RATE) <= 0.0 {
            0.0
        } else {
            (expected / (volatility * volatility)).max(0.0) * self.kelly_multiplier
        };
        let capped = raw_kelly.min(self.max_position_size);

        let fraction = (capped * confidence_adjustment(confidence) * risk_penalty(risk_score)).clamp(0.0, 1.0);

        let reasoning = format!(
            "Kelly: {:.2}% (raw: {:.2}%, E[r]: {:.3}, vol: {:.3}, confidence: {:.0}%, risk: {:.2})",
            fraction * 100.0,
            raw_kelly * 100.0,
            expected,
            volatility,
            confidence * 100.0,
            risk_score
        );

        PositionSize {
            fraction,
            expected_return: expected,
            asset_volatility: volatility,
            raw_kelly_fraction: raw_kelly,
            reasoning,
        }
    }
}

/// Expected return implied by a signal, shrunk toward zero at low confidence.
pub fn expected_return(signal: f64, confidence: f64) -> f64 {
    signal * EXPECTED_RETURN_SCALE * (0.5 + 0.5 * confidence)
}

/// Asset volatility from the technical proxy, or from the risk score when absent.
pub fn asset_volatility(technical_volatility: Option<f64>, risk_score: f64) -> f64 {
    let vol = match technical_volatility {
        Some(proxy) => 0.1 + 0.4 * proxy.clamp(0.0, 1.0),
        None => 0.2 * (0.5 + 1.5 * risk_score),
    };
    vol.max(MIN_VOLATILITY)
}

/// Sigmoid in confidence: ~0.3 at zero confidence, ~1.0 near full confidence.
pub fn confidence_adjustment(confidence: f64) -> f64 {
    0.3 + 0.7 / (1.0 + (-10.0 * (confidence - 0.5)).exp())
}

pub fn risk_penalty(risk_score: f64) -> f64 {
    (-2.0 * risk_score).exp()
}

/// Sharpe-like ranking key: excess expected return per unit of volatility.
pub fn risk_adjusted_return(expected_return: f64, volatility: f64, risk_free_rate: f64) -> f64 {
    (expected_return - risk_free_rate) / volatility.max(MIN_VOLATILITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_expected_return_formula() {
        assert_relative_eq!(expected_return(1.0, 1.0), 0.15);
        assert_relative_eq!(expected_return(0.5, 0.0), 0.0375);
        assert_relative_eq!(expected_return(-0.4, 0.5), -0.045);
    }

    #[test]
    fn test_asset_volatility_fallback() {
        assert_relative_eq!(asset_volatility(None, 0.0), 0.1);
        assert_relative_eq!(asset_volatility(None, 1.0), 0.4);
        assert_relative_eq!(asset_volatility(Some(0.5), 0.9), 0.3);
    }

    #[test]
    fn test_negative_edge_sizes_to_zero() {
        let sizer = KellyPositionSizer::half_kelly(0.25);
        let result = sizer.calculate(-0.6, 0.9, 0.1, None);
        assert_eq!(result.fraction, 0.0);
        assert_eq!(result.raw_kelly_fraction, 0.0);
    }

    #[test]
    fn test_return_below_risk_free_sizes_to_zero() {
        let sizer = KellyPositionSizer::half_kelly(0.25);
        // E[r] = 0.001 * 0.15 * 0.75 = 1.125e-4, under the daily risk-free rate
        let result = sizer.calculate(0.001, 0.5, 0.0, None);
        assert!(result.expected_return > 0.0);
        assert!(risk_adjusted_return(result.expected_return, result.asset_volatility, DAILY_RISK_FREE_RATE) <= 0.0);
        assert_eq!(result.fraction, 0.0);
        assert_eq!(result.raw_kelly_fraction, 0.0);

        assert!(sizer.calculate(0.01, 0.5, 0.0, None).fraction > 0.0);
    }

    #[test]
    fn test_strong_signal_capped_then_adjusted() {
        let sizer = KellyPositionSizer::half_kelly(0.25);
        let result = sizer.calculate(0.8, 0.8, 0.0, None);

        // E[r] = 0.8 * 0.15 * 0.9 = 0.108, vol = 0.1 -> kelly = 10.8 * 0.5 = 5.4, capped at 0.25
        assert_relative_eq!(result.raw_kelly_fraction, 5.4, epsilon = 1e-9);
        let expected = 0.25 * confidence_adjustment(0.8);
        assert_relative_eq!(result.fraction, expected, epsilon = 1e-9);
        assert!(result.reasoning.starts_with("Kelly:"));
    }

    #[test]
    fn test_monotonic_in_signal() {
        let sizer = KellyPositionSizer::half_kelly(0.4);
        let mut last = 0.0;
        for step in 0..=20 {
            let signal = step as f64 / 20.0;
            let size = sizer.calculate(signal, 0.7, 0.4, None).fraction;
            assert!(size >= last - 1e-12);
            last = size;
        }
    }

    #[test]
    fn test_risk_penalty_shrinks_size() {
        let sizer = KellyPositionSizer::half_kelly(1.0);
        let calm = sizer.calculate(0.05, 0.7, 0.0, Some(0.9)).fraction;
        let risky = sizer.calculate(0.05, 0.7, 0.8, Some(0.9)).fraction;
        assert!(risky < calm);
    }

    #[test]
    fn test_risk_adjusted_return_floors_volatility() {
        assert_relative_eq!(risk_adjusted_return(0.02, 0.0, 0.0), 2.0);
        assert!(risk_adjusted_return(0.0, 0.2, DAILY_RISK_FREE_RATE) < 0.0);
    }

    #[test]
    fn test_new_validates_inputs() {
        assert!(KellyPositionSizer::new(0.0, 0.2).is_err());
        assert!(KellyPositionSizer::new(0.5, 1.5).is_err());
        assert!(KellyPositionSizer::new(0.5, 0.2).is_ok());
    }
}
