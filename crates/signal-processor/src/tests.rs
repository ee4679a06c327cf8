use super::*;
use approx::assert_relative_eq;
use decision_core::Call;

fn stats(volume: f64, change: f64) -> MarketStats {
    MarketStats {
        volume_24h: volume,
        price_change_24h: change,
        ..Default::default()
    }
}

fn single(ticker: &str, s: MarketStats) -> HashMap<String, MarketStats> {
    HashMap::from([(ticker.to_string(), s)])
}

fn scenario_a_claims() -> Vec<Claim> {
    vec![
        Claim::new("f1", "X", Role::Fundamental, Call::Buy, 0.7),
        Claim::new("s1", "X", Role::Sentiment, Call::Buy, 0.6),
        Claim::new("t1", "X", Role::Technical, Call::Hold, 0.3),
    ]
}

#[test]
fn test_agreeing_claims_produce_buy() {
    let processor = SignalProcessor::new();
    let signals = processor.process_signals(
        &scenario_a_claims(),
        &single("X", stats(2_000_000.0, 0.0)),
        RiskProfile::Neutral,
        None,
    );

    assert_eq!(signals.len(), 1);
    let s = &signals[0];
    assert_eq!(s.recommendation, Recommendation::Buy);
    assert!(s.overall_signal > 0.1);
    assert_relative_eq!(s.confidence, 0.72, epsilon = 1e-9);
    assert_relative_eq!(s.risk_score, 0.0, epsilon = 1e-12);
    assert!(s.position_size > 0.0);
    assert!(s.rationale.contains("X"));
}

#[test]
fn test_no_claims_holds_on_zero_confidence() {
    let processor = SignalProcessor::new();
    let signals = processor.process_signals(&[], &single("Y", stats(8_000_000.0, 25.0)), RiskProfile::Bold, None);

    assert_eq!(signals.len(), 1);
    let s = &signals[0];
    assert_eq!(s.confidence, 0.0);
    assert_eq!(s.recommendation, Recommendation::Hold);
    // fallbacks still speak
    assert!(s.overall_signal > 0.3);
    assert!(s.fundamental > 0.0);
    assert_eq!(s.sentiment, 0.0);
}

#[test]
fn test_claims_without_market_data_are_skipped() {
    let processor = SignalProcessor::new();
    let claims = vec![
        Claim::new("a", "X", Role::Fundamental, Call::Buy, 0.9),
        Claim::new("b", "GHOST", Role::Fundamental, Call::Buy, 0.9),
    ];
    let signals = processor.process_signals(&claims, &single("X", stats(2_000_000.0, 1.0)), RiskProfile::Neutral, None);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].ticker, "X");
}

#[test]
fn test_output_sorted_by_overall_signal() {
    let processor = SignalProcessor::new();
    let market = HashMap::from([
        ("UP".to_string(), stats(2_000_000.0, 6.0)),
        ("FLAT".to_string(), stats(2_000_000.0, 0.0)),
        ("DOWN".to_string(), stats(2_000_000.0, -6.0)),
    ]);
    let claims = vec![
        Claim::new("1", "UP", Role::Fundamental, Call::Buy, 0.8),
        Claim::new("2", "DOWN", Role::Fundamental, Call::Sell, 0.8),
    ];
    let signals = processor.process_signals(&claims, &market, RiskProfile::Neutral, None);

    let order: Vec<&str> = signals.iter().map(|s| s.ticker.as_str()).collect();
    assert_eq!(order, vec!["UP", "FLAT", "DOWN"]);
    for pair in signals.windows(2) {
        assert!(pair[0].overall_signal >= pair[1].overall_signal);
    }
}

#[test]
fn test_outputs_stay_in_bounds() {
    let processor = SignalProcessor::new();
    let extremes = [
        stats(0.0, -400.0),
        stats(1e12, 400.0),
        MarketStats {
            volume_24h: 50_000.0,
            price_change_24h: -3.0,
            volume_change_24h: -90.0,
            spread: 0.2,
        },
    ];
    let tech = TechnicalIndicators {
        rsi: Some(99.0),
        macd_histogram: Some(-40.0),
        adx: Some(80.0),
        ..Default::default()
    };

    for profile in RiskProfile::ALL {
        for (i, s) in extremes.iter().enumerate() {
            let ticker = format!("T{i}");
            let claims = vec![
                Claim::new("f", &ticker, Role::Fundamental, Call::Sell, 7.0).with_flags(&["stale_data"; 12]),
                Claim::new("s", &ticker, Role::Sentiment, Call::Buy, -2.0),
                Claim::new("t", &ticker, Role::Technical, Call::Buy, f64::NAN),
            ];
            let technical = HashMap::from([(ticker.clone(), tech.clone())]);
            for tech_data in [None, Some(&technical)] {
                let out = processor.process_signals(&claims, &single(&ticker, *s), profile, tech_data);
                let a = &out[0];
                for v in [a.overall_signal, a.momentum, a.fundamental, a.sentiment, a.technical] {
                    assert!((-1.0..=1.0).contains(&v), "{v} out of [-1, 1]");
                }
                for v in [a.confidence, a.volatility, a.risk_score, a.position_size] {
                    assert!((0.0..=1.0).contains(&v), "{v} out of [0, 1]");
                }
            }
        }
    }
}

#[test]
fn test_sell_signal_sizes_to_zero() {
    let processor = SignalProcessor::new();
    let claims = vec![
        Claim::new("f", "Z", Role::Fundamental, Call::Sell, 0.9),
        Claim::new("s", "Z", Role::Sentiment, Call::Sell, 0.9),
        Claim::new("t", "Z", Role::Technical, Call::Sell, 0.9),
    ];
    let signals = processor.process_signals(&claims, &single("Z", stats(3_000_000.0, -4.0)), RiskProfile::Neutral, None);
    let s = &signals[0];
    assert_eq!(s.recommendation, Recommendation::Sell);
    assert_eq!(s.position_size, 0.0);
    assert!(s.sizing.expected_return < 0.0);
}

#[test]
fn test_position_size_grows_with_agreement_strength() {
    let processor = SignalProcessor::new();
    let market = single("X", stats(2_000_000.0, 0.0));
    let weak = vec![Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.7)];
    let strong = vec![
        Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.7),
        Claim::new("s", "X", Role::Sentiment, Call::Buy, 0.7),
    ];
    let weak_signal = &processor.process_signals(&weak, &market, RiskProfile::Averse, None)[0];
    let strong_signal = &processor.process_signals(&strong, &market, RiskProfile::Averse, None)[0];

    assert!(strong_signal.overall_signal > weak_signal.overall_signal);
    assert!(strong_signal.position_size >= weak_signal.position_size);
}

#[test]
fn test_confidence_penalises_disagreement() {
    let agree = [
        Claim::new("a", "X", Role::Fundamental, Call::Buy, 0.8),
        Claim::new("b", "X", Role::Sentiment, Call::Buy, 0.8),
    ];
    let disagree = [
        Claim::new("a", "X", Role::Fundamental, Call::Buy, 0.8),
        Claim::new("b", "X", Role::Sentiment, Call::Sell, 0.8),
    ];
    let agree_conf = fused_confidence(&agree.iter().collect::<Vec<_>>());
    let disagree_conf = fused_confidence(&disagree.iter().collect::<Vec<_>>());
    assert_relative_eq!(agree_conf, 0.88, epsilon = 1e-9);
    assert_relative_eq!(disagree_conf, 0.58, epsilon = 1e-9);
}

#[test]
fn test_risk_gate_forces_hold() {
    let params = RiskProfile::Averse.params();
    assert_eq!(recommend(0.9, 0.95, 0.6, params), Recommendation::Hold);
    assert_eq!(recommend(0.9, 0.65, 0.1, params), Recommendation::Hold);
    assert_eq!(recommend(0.3, 0.95, 0.1, params), Recommendation::Buy);
    assert_eq!(recommend(-0.3, 0.95, 0.1, params), Recommendation::Sell);
    assert_eq!(recommend(0.2, 0.95, 0.1, params), Recommendation::Hold);
}

#[test]
fn test_time_horizon_rules() {
    let fundamental = Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.85);
    let mut oversold = Claim::new("t", "X", Role::Technical, Call::Buy, 0.6);
    oversold.sub_signals.insert("rsi".to_string(), 24.0);

    let claims = vec![&oversold];
    assert_eq!(time_horizon(0.7, oscillator(&claims, None), &claims), TimeHorizon::Short);
    assert_eq!(time_horizon(0.2, oscillator(&claims, None), &claims), TimeHorizon::Medium);

    let claims = vec![&fundamental];
    assert_eq!(time_horizon(0.7, None, &claims), TimeHorizon::Long);
}
