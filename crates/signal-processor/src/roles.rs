//! Per-role sub-scores.
//!
//! Each role blends its claim (confidence x direction) with a score derived
//! from market or indicator data. A missing claim never abstains: the
//! data-derived score stands in alone.

use decision_core::math::{liquidity_score, signed_unit};
use decision_core::{Claim, MarketStats, TechnicalIndicators};

/// Claim/fallback blend weights per role
const FUNDAMENTAL_CLAIM_WEIGHT: f64 = 0.7;
const TECHNICAL_CLAIM_WEIGHT: f64 = 0.6;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

const RSI_TERM_WEIGHT: f64 = 0.4;
const MACD_TERM_WEIGHT: f64 = 0.4;
const VOLATILITY_TERM_WEIGHT: f64 = 0.2;

/// Scale applied to the MACD histogram before tanh
const MACD_SCALE: f64 = 1.0;

/// Sentiment claims above this confidence get boosted, up to +15% at 1.0
const SENTIMENT_BOOST_FLOOR: f64 = 0.8;
const SENTIMENT_MAX_BOOST: f64 = 0.15;

/// Multiplicative attenuation for recognised risk-flag tags
const FLAG_PENALTIES: &[(&str, f64)] = &[
    ("low_coverage", 0.8),
    ("old_news", 0.7),
    ("stale_data", 0.7),
    ("single_source", 0.85),
    ("conflicting_sources", 0.75),
    ("low_liquidity", 0.9),
    ("unverified_source", 0.8),
];

/// Signed score of a single claim: confidence x direction sign.
pub fn claim_score(claim: &Claim) -> f64 {
    claim.bounded_confidence() * claim.call.sign()
}

fn blend(claim: Option<&Claim>, fallback: f64, claim_weight: f64) -> f64 {
    match claim {
        Some(c) => signed_unit(claim_weight * claim_score(c) + (1.0 - claim_weight) * fallback),
        None => signed_unit(fallback),
    }
}

fn normalize_flag(flag: &str) -> String {
    flag.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

/// Product of penalties for recognised flags; unknown tags are ignored.
pub fn flag_penalty(flags: &[String]) -> f64 {
    flags
        .iter()
        .filter_map(|f| {
            let key = normalize_flag(f);
            FLAG_PENALTIES.iter().find(|(name, _)| *name == key).map(|(_, p)| *p)
        })
        .product()
}

/// Liquidity bucket combined with 24h price momentum, squashed by tanh.
pub fn fundamental_fallback(stats: &MarketStats) -> f64 {
    (0.3 * liquidity_score(stats.volume_24h) + 0.7 * stats.price_change_24h / 10.0).tanh()
}

pub fn fundamental_score(claim: Option<&Claim>, stats: &MarketStats) -> f64 {
    blend(claim, fundamental_fallback(stats), FUNDAMENTAL_CLAIM_WEIGHT)
}

/// Sentiment has no market-derived opinion of its own: neutral without a claim.
pub fn sentiment_score(claim: Option<&Claim>) -> f64 {
    let Some(claim) = claim else {
        return 0.0;
    };
    let confidence = claim.bounded_confidence();
    let boost = if confidence > SENTIMENT_BOOST_FLOOR {
        1.0 + SENTIMENT_MAX_BOOST * (confidence - SENTIMENT_BOOST_FLOOR) / (1.0 - SENTIMENT_BOOST_FLOOR)
    } else {
        1.0
    };
    signed_unit(claim_score(claim) * flag_penalty(&claim.risk_flags) * boost)
}

/// Mean-reversion term: bullish below oversold, bearish above overbought.
pub fn rsi_term(rsi: f64) -> f64 {
    if rsi < RSI_OVERSOLD {
        signed_unit((RSI_OVERSOLD - rsi) / RSI_OVERSOLD)
    } else if rsi > RSI_OVERBOUGHT {
        signed_unit(-(rsi - RSI_OVERBOUGHT) / (100.0 - RSI_OVERBOUGHT))
    } else {
        0.0
    }
}

pub fn macd_term(histogram: f64) -> f64 {
    (histogram * MACD_SCALE).tanh()
}

/// Volatility proxy from indicator data: RSI distance from 50, else ADX.
pub fn volatility_proxy(tech: &TechnicalIndicators) -> Option<f64> {
    if let Some(rsi) = tech.rsi.filter(|r| r.is_finite()) {
        return Some(((rsi - 50.0).abs() / 50.0 * 1.5).min(1.0));
    }
    tech.adx.filter(|a| a.is_finite()).map(|adx| (adx / 50.0).clamp(0.0, 1.0))
}

/// Weighted RSI / MACD / volatility terms. The volatility term points in the MACD direction.
pub fn indicator_score(tech: &TechnicalIndicators) -> f64 {
    let rsi = tech.rsi.map(rsi_term).unwrap_or(0.0);
    let histogram = tech.histogram();
    let macd = histogram.map(macd_term).unwrap_or(0.0);
    let direction = histogram.map(|h| if h > 0.0 { 1.0 } else if h < 0.0 { -1.0 } else { 0.0 }).unwrap_or(0.0);
    let vol = volatility_proxy(tech).unwrap_or(0.0) * direction;

    signed_unit(RSI_TERM_WEIGHT * rsi + MACD_TERM_WEIGHT * macd + VOLATILITY_TERM_WEIGHT * vol)
}

pub fn technical_fallback(stats: &MarketStats, tech: Option<&TechnicalIndicators>) -> f64 {
    match tech {
        Some(t) => indicator_score(t),
        None => 0.5 * (stats.price_change_24h / 10.0).tanh(),
    }
}

pub fn technical_score(claim: Option<&Claim>, stats: &MarketStats, tech: Option<&TechnicalIndicators>) -> f64 {
    blend(claim, technical_fallback(stats, tech), TECHNICAL_CLAIM_WEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use decision_core::{Call, Role};

    fn stats(volume: f64, change: f64) -> MarketStats {
        MarketStats {
            volume_24h: volume,
            price_change_24h: change,
            ..Default::default()
        }
    }

    #[test]
    fn test_rsi_term_regions() {
        assert!(rsi_term(20.0) > 0.0);
        assert_eq!(rsi_term(50.0), 0.0);
        assert!(rsi_term(85.0) < 0.0);
        assert_relative_eq!(rsi_term(0.0), 1.0);
        assert_relative_eq!(rsi_term(100.0), -1.0);
    }

    #[test]
    fn test_flag_penalties_compound() {
        let flags = vec!["Low Coverage".to_string(), "old-news".to_string(), "whatever".to_string()];
        assert_relative_eq!(flag_penalty(&flags), 0.8 * 0.7, epsilon = 1e-12);
        assert_eq!(flag_penalty(&[]), 1.0);
    }

    #[test]
    fn test_sentiment_boost_caps_at_fifteen_percent() {
        let claim = Claim::new("s1", "X", Role::Sentiment, Call::Buy, 1.0);
        assert_relative_eq!(sentiment_score(Some(&claim)), 1.0);

        let claim = Claim::new("s2", "X", Role::Sentiment, Call::Buy, 0.8);
        assert_relative_eq!(sentiment_score(Some(&claim)), 0.8);

        let claim = Claim::new("s3", "X", Role::Sentiment, Call::Sell, 0.9).with_flags(&["old_news"]);
        assert_relative_eq!(sentiment_score(Some(&claim)), -0.9 * 0.7 * 1.075, epsilon = 1e-12);
    }

    #[test]
    fn test_missing_sentiment_claim_is_neutral() {
        assert_eq!(sentiment_score(None), 0.0);
    }

    #[test]
    fn test_fundamental_fallback_without_claim() {
        let s = stats(6_000_000.0, 0.0);
        assert_relative_eq!(fundamental_score(None, &s), 0.3f64.tanh(), epsilon = 1e-12);
        // a crash dominates liquidity
        assert!(fundamental_score(None, &stats(6_000_000.0, -20.0)) < 0.0);
    }

    #[test]
    fn test_market_data_still_modulates_confident_claims() {
        let claim = Claim::new("f1", "X", Role::Fundamental, Call::Buy, 0.9);
        let rallying = fundamental_score(Some(&claim), &stats(6_000_000.0, 8.0));
        let dumping = fundamental_score(Some(&claim), &stats(6_000_000.0, -8.0));
        assert!(rallying > dumping);
    }

    #[test]
    fn test_indicator_score_oversold_with_rising_macd() {
        let tech = TechnicalIndicators {
            rsi: Some(22.0),
            macd_histogram: Some(0.8),
            ..Default::default()
        };
        let score = indicator_score(&tech);
        assert!(score > 0.3);
        assert!(score <= 1.0);
    }

    #[test]
    fn test_volatility_proxy_prefers_rsi() {
        let tech = TechnicalIndicators {
            rsi: Some(80.0),
            adx: Some(10.0),
            ..Default::default()
        };
        assert_relative_eq!(volatility_proxy(&tech).unwrap(), 0.9, epsilon = 1e-12);
        let adx_only = TechnicalIndicators {
            adx: Some(75.0),
            ..Default::default()
        };
        assert_eq!(volatility_proxy(&adx_only), Some(1.0));
        assert_eq!(volatility_proxy(&TechnicalIndicators::default()), None);
    }
}
