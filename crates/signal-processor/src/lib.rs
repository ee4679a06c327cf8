use decision_core::math::{mean, signed_unit, std_dev, unit};
use decision_core::{
    Claim, MarketStats, ProfileParams, Recommendation, RiskProfile, Role, SignalAnalysis, SizingInputs,
    TechnicalIndicators, TimeHorizon,
};
use kelly_position_sizer::KellyPositionSizer;
use std::collections::{BTreeMap, HashMap};

pub mod market;
pub mod roles;
#[cfg(test)]
mod tests;

/// |momentum| above this, with an oscillator at an extreme, marks a short-horizon trade
const SHORT_HORIZON_MOMENTUM: f64 = 0.5;
/// A fundamental claim above this confidence marks a long-horizon trade
const LONG_HORIZON_CONFIDENCE: f64 = 0.8;

const DATA_QUALITY_PENALTY_PER_FLAG: f64 = 0.1;

/// Fuses claims and market/indicator data into one [`SignalAnalysis`] per ticker.
///
/// Pure apart from logging: identical inputs give identical output.
#[derive(Debug, Clone, Default)]
pub struct SignalProcessor;

impl SignalProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Produce signals for every ticker present in `market_stats`, sorted by
    /// `overall_signal` descending. Claims for tickers without market data are
    /// skipped for the round.
    pub fn process_signals(
        &self,
        claims: &[Claim],
        market_stats: &HashMap<String, MarketStats>,
        profile: RiskProfile,
        technical: Option<&HashMap<String, TechnicalIndicators>>,
    ) -> Vec<SignalAnalysis> {
        let mut by_ticker: BTreeMap<&str, Vec<&Claim>> =
            market_stats.keys().map(|t| (t.as_str(), Vec::new())).collect();

        let mut skipped = 0usize;
        for claim in claims {
            match by_ticker.get_mut(claim.ticker.as_str()) {
                Some(group) => group.push(claim),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::debug!("Skipped {} claims for tickers without market data", skipped);
        }

        let mut signals: Vec<SignalAnalysis> = by_ticker
            .into_iter()
            .filter_map(|(ticker, group)| {
                let stats = market_stats.get(ticker)?;
                let tech = technical.and_then(|t| t.get(ticker));
                Some(self.analyze_ticker(ticker, &group, stats, tech, profile))
            })
            .collect();

        signals.sort_by(|a, b| {
            b.overall_signal
                .partial_cmp(&a.overall_signal)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        tracing::info!(
            "Processed {} signals ({} BUY, {} SELL) under {} profile",
            signals.len(),
            signals.iter().filter(|s| s.recommendation == Recommendation::Buy).count(),
            signals.iter().filter(|s| s.recommendation == Recommendation::Sell).count(),
            profile
        );
        signals
    }

    /// Fuse one ticker's claims with its market and indicator data.
    pub fn analyze_ticker(
        &self,
        ticker: &str,
        claims: &[&Claim],
        stats: &MarketStats,
        tech: Option<&TechnicalIndicators>,
        profile: RiskProfile,
    ) -> SignalAnalysis {
        let params = profile.params();

        let fundamental = roles::fundamental_score(strongest(claims, Role::Fundamental), stats);
        let sentiment = roles::sentiment_score(strongest(claims, Role::Sentiment));
        let technical = roles::technical_score(strongest(claims, Role::Technical), stats, tech);

        let momentum = market::momentum(stats, tech);
        let (volatility, technical_volatility) = market::volatility(stats, tech);
        let risk_score = market::risk_score(claims, volatility, stats);

        let w = params.weights;
        let overall_signal = signed_unit(
            fundamental * w.fundamental + sentiment * w.sentiment + technical * w.technical + momentum * w.momentum,
        );

        let confidence = fused_confidence(claims);
        let recommendation = recommend(overall_signal, confidence, risk_score, params);

        let sizing = KellyPositionSizer::half_kelly(params.max_weight_per_position).calculate(
            overall_signal,
            confidence,
            risk_score,
            technical_volatility,
        );

        let time_horizon = time_horizon(momentum, oscillator(claims, tech), claims);

        let rationale = format!(
            "{:?} {}: signal {:+.2} (F {:+.2}, S {:+.2}, T {:+.2}, M {:+.2}), confidence {:.0}%, risk {:.2}, {} claims",
            recommendation,
            ticker,
            overall_signal,
            fundamental,
            sentiment,
            technical,
            momentum,
            confidence * 100.0,
            risk_score,
            claims.len()
        );

        tracing::debug!(
            ticker,
            overall_signal,
            confidence,
            risk_score,
            position_size = sizing.fraction,
            "Fused signal"
        );

        SignalAnalysis {
            ticker: ticker.to_string(),
            overall_signal,
            confidence,
            volatility,
            momentum,
            fundamental,
            sentiment,
            technical,
            risk_score,
            recommendation,
            rationale,
            time_horizon,
            position_size: sizing.fraction,
            sizing: SizingInputs {
                expected_return: sizing.expected_return,
                asset_volatility: sizing.asset_volatility,
                raw_kelly: sizing.raw_kelly_fraction,
            },
        }
    }
}

/// Highest-confidence claim for a role, if any.
fn strongest<'a>(claims: &[&'a Claim], role: Role) -> Option<&'a Claim> {
    claims
        .iter()
        .copied()
        .filter(|c| c.role == role)
        .max_by(|a, b| {
            a.bounded_confidence()
                .partial_cmp(&b.bounded_confidence())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// 0.6 mean claim confidence + 0.3 directional agreement + 0.1 data quality.
///
/// Agreement is one minus the spread of direction signs among claims that
/// take a side; HOLD calls abstain from it.
pub fn fused_confidence(claims: &[&Claim]) -> f64 {
    if claims.is_empty() {
        return 0.0;
    }

    let confidences: Vec<f64> = claims.iter().map(|c| c.bounded_confidence()).collect();
    let signs: Vec<f64> = claims
        .iter()
        .filter(|c| c.call.is_directional())
        .map(|c| c.call.sign())
        .collect();

    let agreement = unit(1.0 - std_dev(&signs));
    let flags_per_claim = claims.iter().map(|c| c.risk_flags.len()).sum::<usize>() as f64 / claims.len() as f64;
    let data_quality = unit(1.0 - DATA_QUALITY_PENALTY_PER_FLAG * flags_per_claim);

    unit(0.6 * mean(&confidences) + 0.3 * agreement + 0.1 * data_quality)
}

pub fn recommend(overall_signal: f64, confidence: f64, risk_score: f64, params: &ProfileParams) -> Recommendation {
    if confidence < params.min_confidence || risk_score > params.max_risk {
        Recommendation::Hold
    } else if overall_signal > params.buy_threshold {
        Recommendation::Buy
    } else if overall_signal < params.sell_threshold {
        Recommendation::Sell
    } else {
        Recommendation::Hold
    }
}

/// RSI from indicator data, else an "rsi" sub-signal reported by any claim.
fn oscillator(claims: &[&Claim], tech: Option<&TechnicalIndicators>) -> Option<f64> {
    tech.and_then(|t| t.rsi)
        .or_else(|| claims.iter().find_map(|c| c.sub_signals.get("rsi").copied()))
        .filter(|v| v.is_finite())
}

pub fn time_horizon(momentum: f64, oscillator: Option<f64>, claims: &[&Claim]) -> TimeHorizon {
    let extreme = oscillator.is_some_and(|rsi| !(30.0..=70.0).contains(&rsi));
    if momentum.abs() > SHORT_HORIZON_MOMENTUM && extreme {
        TimeHorizon::Short
    } else if claims
        .iter()
        .any(|c| c.role == Role::Fundamental && c.bounded_confidence() > LONG_HORIZON_CONFIDENCE)
    {
        TimeHorizon::Long
    } else {
        TimeHorizon::Medium
    }
}
