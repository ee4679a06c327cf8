#[cfg(test)]
mod limit_checker_tests {
    use crate::{rules, LimitChecker, RiskLimits};
    use broker_trait::{BrokerPosition, PositionSide};
    use decision_core::{MarketStats, RiskProfile, RiskRequest, RiskService, RoundContext, Side, TargetWeight};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn target(symbol: &str, weight: f64, side: Side) -> TargetWeight {
        TargetWeight {
            symbol: symbol.to_string(),
            weight,
            side,
        }
    }

    fn liquid(symbols: &[&str]) -> HashMap<String, MarketStats> {
        symbols
            .iter()
            .map(|s| {
                (
                    s.to_string(),
                    MarketStats {
                        volume_24h: 5_000_000.0,
                        spread: 0.001,
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    fn losing_position(pl: Decimal) -> BrokerPosition {
        BrokerPosition {
            symbol: "OLD".to_string(),
            side: PositionSide::Long,
            market_value: dec!(10000) + pl,
            cost_basis: dec!(10000),
            unrealized_pl: pl,
        }
    }

    fn request<'a>(
        targets: &'a [TargetWeight],
        positions: &'a [BrokerPosition],
        stats: &'a HashMap<String, MarketStats>,
        profile: RiskProfile,
    ) -> RiskRequest<'a> {
        RiskRequest {
            target_weights: targets,
            current_positions: positions,
            market_stats: stats,
            risk_profile: profile,
            equity: 100_000.0,
        }
    }

    #[tokio::test]
    async fn clean_targets_pass() {
        let checker = LimitChecker::default();
        let targets = vec![target("A", 0.2, Side::Buy), target("B", 0.15, Side::Buy), target("C", 0.0, Side::Sell)];
        let stats = liquid(&["A", "B"]);
        let ctx = RoundContext::new(RiskProfile::Neutral);

        let verdict = checker
            .check_limits(&ctx, request(&targets, &[], &stats, RiskProfile::Neutral))
            .await
            .unwrap();
        assert!(verdict.ok, "{:?}", verdict.violations);
        assert!(!verdict.halt);
    }

    #[test]
    fn weight_cap_is_per_profile() {
        let checker = LimitChecker::default();
        let targets = vec![target("A", 0.2, Side::Buy)];
        let stats = liquid(&["A"]);

        let averse = checker.evaluate(&request(&targets, &[], &stats, RiskProfile::Averse));
        assert!(!averse.ok);
        assert_eq!(averse.violations[0].rule, rules::WEIGHT_CAP);
        assert_eq!(averse.violations[0].symbol.as_deref(), Some("A"));

        let bold = checker.evaluate(&request(&targets, &[], &stats, RiskProfile::Bold));
        assert!(bold.ok);
    }

    #[test]
    fn gross_exposure_and_count_limits() {
        let checker = LimitChecker::new(RiskLimits {
            max_gross_exposure: 0.5,
            ..Default::default()
        });
        let symbols: Vec<String> = (0..6).map(|i| format!("S{i}")).collect();
        let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
        let targets: Vec<TargetWeight> = refs.iter().map(|s| target(s, 0.1, Side::Buy)).collect();
        let stats = liquid(&refs);

        let verdict = checker.evaluate(&request(&targets, &[], &stats, RiskProfile::Averse));
        let rules_hit: Vec<&str> = verdict.violations.iter().map(|v| v.rule.as_str()).collect();
        assert!(rules_hit.contains(&rules::GROSS_EXPOSURE));
        assert!(rules_hit.contains(&rules::POSITION_COUNT));
        assert!(!verdict.halt);
    }

    #[test]
    fn illiquid_and_wide_spread_buys_flagged() {
        let checker = LimitChecker::default();
        let targets = vec![
            target("THIN", 0.1, Side::Buy),
            target("WIDE", 0.1, Side::Buy),
            target("GONE", 0.1, Side::Buy),
            target("EXIT", 0.0, Side::Sell),
        ];
        let mut stats = HashMap::new();
        stats.insert(
            "THIN".to_string(),
            MarketStats {
                volume_24h: 20_000.0,
                ..Default::default()
            },
        );
        stats.insert(
            "WIDE".to_string(),
            MarketStats {
                volume_24h: 9_000_000.0,
                spread: 0.05,
                ..Default::default()
            },
        );

        let verdict = checker.evaluate(&request(&targets, &[], &stats, RiskProfile::Neutral));
        let flagged: Vec<(&str, &str)> = verdict
            .violations
            .iter()
            .map(|v| (v.rule.as_str(), v.symbol.as_deref().unwrap_or("")))
            .collect();
        assert_eq!(
            flagged,
            vec![
                (rules::LOW_LIQUIDITY, "THIN"),
                (rules::WIDE_SPREAD, "WIDE"),
                (rules::LOW_LIQUIDITY, "GONE"),
            ]
        );
    }

    #[test]
    fn daily_loss_raises_halt() {
        let checker = LimitChecker::default();
        let stats = HashMap::new();

        let small = vec![losing_position(dec!(-4000))];
        let verdict = checker.evaluate(&request(&[], &small, &stats, RiskProfile::Bold));
        assert!(verdict.ok);

        let large = vec![losing_position(dec!(-6000))];
        let verdict = checker.evaluate(&request(&[], &large, &stats, RiskProfile::Bold));
        assert!(!verdict.ok);
        assert!(verdict.halt);
        assert_eq!(verdict.violations[0].rule, rules::DAILY_LOSS);
    }

    #[test]
    fn zero_equity_blocks_without_halting() {
        let checker = LimitChecker::default();
        let stats = HashMap::new();
        let mut req = request(&[], &[], &stats, RiskProfile::Neutral);
        req.equity = 0.0;
        let verdict = checker.evaluate(&req);
        assert!(!verdict.ok);
        assert!(!verdict.halt);
        assert_eq!(verdict.violations[0].rule, rules::NO_EQUITY);
    }
}
