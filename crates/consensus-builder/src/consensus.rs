use decision_core::math::{liquidity_score, mean};
use decision_core::{Claim, ConsensusRecord, MarketStats, Role, SignalAnalysis};
use std::collections::{HashMap, HashSet};

/// Signals at or below this are too bearish to rank at all
pub const BEARISH_FLOOR: f64 = -0.5;

/// Conviction discounted by risk: `signal x confidence x (1 - risk)`.
pub fn final_score(signal: &SignalAnalysis) -> f64 {
    signal.overall_signal * signal.confidence * (1.0 - signal.risk_score)
}

/// Rank signals into consensus records.
///
/// `signals` are expected in processor order (descending overall signal), so
/// truncation to `max_positions` keeps the strongest. Claims and market stats
/// only feed the coverage, confidence and liquidity columns.
pub fn build_consensus(
    signals: &[SignalAnalysis],
    claims: &[Claim],
    market_stats: &HashMap<String, MarketStats>,
    max_positions: usize,
) -> Vec<ConsensusRecord> {
    let mut by_ticker: HashMap<&str, Vec<&Claim>> = HashMap::new();
    for claim in claims {
        by_ticker.entry(claim.ticker.as_str()).or_default().push(claim);
    }

    let mut records: Vec<ConsensusRecord> = signals
        .iter()
        .filter(|s| s.overall_signal > BEARISH_FLOOR)
        .take(max_positions)
        .map(|signal| {
            let ticker_claims = by_ticker.get(signal.ticker.as_str()).map(Vec::as_slice).unwrap_or(&[]);

            let roles: HashSet<Role> = ticker_claims.iter().map(|c| c.role).collect();
            let confidences: Vec<f64> = ticker_claims.iter().map(|c| c.bounded_confidence()).collect();
            let liquidity = market_stats
                .get(&signal.ticker)
                .map(|s| liquidity_score(s.volume_24h))
                .unwrap_or(0.0);

            ConsensusRecord {
                ticker: signal.ticker.clone(),
                avg_confidence: mean(&confidences),
                coverage: roles.len() as f64 / Role::ALL.len() as f64,
                liquidity,
                final_score: final_score(signal),
                claim_ids: ticker_claims.iter().map(|c| c.id.clone()).collect(),
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    tracing::debug!("Built consensus over {} of {} signals", records.len(), signals.len());
    records
}
