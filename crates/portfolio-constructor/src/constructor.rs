use decision_core::{Recommendation, RiskProfile, Side, SignalAnalysis, TargetWeight};
use kelly_position_sizer::{risk_adjusted_return, DAILY_RISK_FREE_RATE};

use crate::correlation::CorrelationGroup;

/// Multiplier applied once per higher-ranked correlated asset already selected
pub const CORRELATION_PENALTY: f64 = 0.8;

/// Signals below this confidence never reach the portfolio
pub const MIN_QUALIFYING_CONFIDENCE: f64 = 0.5;

struct Candidate<'a> {
    signal: &'a SignalAnalysis,
    risk_adjusted_return: f64,
    penalty: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioConstructor {
    correlated: CorrelationGroup,
}

impl PortfolioConstructor {
    pub fn new(correlated: CorrelationGroup) -> Self {
        Self { correlated }
    }

    pub fn correlation_group(&self) -> &CorrelationGroup {
        &self.correlated
    }

    /// Build target weights from signals in processor order.
    ///
    /// Weights are normalized over the retained set, then clipped to the
    /// profile's per-position cap. Clipped mass stays uninvested, so the
    /// total may be below 1.
    pub fn build_target_weights(&self, signals: &[SignalAnalysis], profile: RiskProfile) -> Vec<TargetWeight> {
        let params = profile.params();

        let mut candidates: Vec<Candidate> = signals
            .iter()
            .filter(|s| s.recommendation != Recommendation::Hold && s.confidence >= MIN_QUALIFYING_CONFIDENCE)
            .take(params.max_positions)
            .map(|signal| Candidate {
                signal,
                risk_adjusted_return: risk_adjusted_return(
                    signal.sizing.expected_return,
                    signal.sizing.asset_volatility,
                    DAILY_RISK_FREE_RATE,
                ),
                penalty: 1.0,
            })
            .collect();

        if candidates.is_empty() {
            tracing::info!("No signals qualified for the portfolio");
            return Vec::new();
        }

        candidates.sort_by(|a, b| {
            b.risk_adjusted_return
                .partial_cmp(&a.risk_adjusted_return)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.signal.ticker.cmp(&b.signal.ticker))
        });

        let mut correlated_seen = 0;
        for candidate in candidates.iter_mut() {
            if self.correlated.contains(&candidate.signal.ticker) {
                candidate.penalty = CORRELATION_PENALTY.powi(correlated_seen);
                correlated_seen += 1;
            }
        }

        candidates.truncate(params.max_positions);

        let raw: Vec<f64> = candidates
            .iter()
            .map(|c| c.signal.position_size.max(0.0) * c.penalty)
            .collect();
        let total: f64 = raw.iter().sum();

        let weights: Vec<TargetWeight> = candidates
            .iter()
            .zip(raw)
            .map(|(c, r)| {
                let normalized = if total > 0.0 { r / total } else { 0.0 };
                TargetWeight {
                    symbol: c.signal.ticker.clone(),
                    weight: normalized.min(params.max_weight_per_position),
                    side: Side::from(c.signal.recommendation),
                }
            })
            .collect();

        tracing::info!(
            "Built {} target weights under {} profile ({:.1}% allocated, {} correlated)",
            weights.len(),
            profile,
            weights.iter().map(|w| w.weight).sum::<f64>() * 100.0,
            correlated_seen
        );
        weights
    }
}
