use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::EngineError;

/// Named risk tolerance governing fusion weights, thresholds and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Averse,
    Neutral,
    Bold,
}

/// Fusion weights applied to the role and momentum sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    pub fundamental: f64,
    pub sentiment: f64,
    pub technical: f64,
    pub momentum: f64,
}

/// Static per-profile parameters. Never mutated at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfileParams {
    pub weights: FusionWeights,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub min_confidence: f64,
    pub max_risk: f64,
    pub max_positions: usize,
    pub max_weight_per_position: f64,
}

const AVERSE: ProfileParams = ProfileParams {
    weights: FusionWeights {
        fundamental: 0.45,
        sentiment: 0.20,
        technical: 0.20,
        momentum: 0.15,
    },
    buy_threshold: 0.25,
    sell_threshold: -0.25,
    min_confidence: 0.70,
    max_risk: 0.50,
    max_positions: 5,
    max_weight_per_position: 0.15,
};

const NEUTRAL: ProfileParams = ProfileParams {
    weights: FusionWeights {
        fundamental: 0.35,
        sentiment: 0.25,
        technical: 0.25,
        momentum: 0.15,
    },
    buy_threshold: 0.10,
    sell_threshold: -0.10,
    min_confidence: 0.60,
    max_risk: 0.70,
    max_positions: 8,
    max_weight_per_position: 0.25,
};

const BOLD: ProfileParams = ProfileParams {
    weights: FusionWeights {
        fundamental: 0.25,
        sentiment: 0.25,
        technical: 0.25,
        momentum: 0.25,
    },
    buy_threshold: 0.05,
    sell_threshold: -0.05,
    min_confidence: 0.50,
    max_risk: 0.85,
    max_positions: 12,
    max_weight_per_position: 0.40,
};

impl RiskProfile {
    pub const ALL: [RiskProfile; 3] = [RiskProfile::Averse, RiskProfile::Neutral, RiskProfile::Bold];

    pub fn params(&self) -> &'static ProfileParams {
        match self {
            RiskProfile::Averse => &AVERSE,
            RiskProfile::Neutral => &NEUTRAL,
            RiskProfile::Bold => &BOLD,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Averse => "averse",
            RiskProfile::Neutral => "neutral",
            RiskProfile::Bold => "bold",
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskProfile {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "averse" | "conservative" => Ok(RiskProfile::Averse),
            "neutral" | "moderate" => Ok(RiskProfile::Neutral),
            "bold" | "aggressive" => Ok(RiskProfile::Bold),
            other => Err(EngineError::Config(format!("unknown risk profile '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_limits_are_ordered_by_appetite() {
        let (a, n, b) = (
            RiskProfile::Averse.params(),
            RiskProfile::Neutral.params(),
            RiskProfile::Bold.params(),
        );
        assert!(b.max_weight_per_position >= n.max_weight_per_position);
        assert!(n.max_weight_per_position >= a.max_weight_per_position);
        assert!(b.max_positions >= n.max_positions);
        assert!(n.max_positions >= a.max_positions);
    }

    #[test]
    fn test_fusion_weights_sum_to_one() {
        for profile in RiskProfile::ALL {
            let w = profile.params().weights;
            assert_relative_eq!(w.fundamental + w.sentiment + w.technical + w.momentum, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_averse_leans_on_fundamentals_and_bold_on_momentum() {
        let averse = RiskProfile::Averse.params().weights;
        let bold = RiskProfile::Bold.params().weights;
        assert!(averse.fundamental > bold.fundamental);
        assert!(bold.momentum > averse.momentum);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("Conservative".parse::<RiskProfile>().unwrap(), RiskProfile::Averse);
        assert_eq!("bold".parse::<RiskProfile>().unwrap(), RiskProfile::Bold);
        assert!("yolo".parse::<RiskProfile>().is_err());
    }
}
