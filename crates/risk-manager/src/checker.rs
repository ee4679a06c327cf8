use async_trait::async_trait;
use broker_trait::unrealized_pl;
use decision_core::{EngineError, RiskRequest, RiskService, RiskVerdict, RiskViolation, RoundContext, Side};
use rust_decimal::prelude::*;

use crate::models::{rules, RiskLimits};

/// Tolerance for float noise in weight sums
const WEIGHT_EPSILON: f64 = 1e-9;

/// Default risk service: static limit checks plus a daily-loss circuit breaker.
#[derive(Debug, Clone, Default)]
pub struct LimitChecker {
    limits: RiskLimits,
}

impl LimitChecker {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Run every check and collect all violations rather than stopping at the first.
    pub fn evaluate(&self, request: &RiskRequest<'_>) -> RiskVerdict {
        let params = request.risk_profile.params();
        let mut violations = Vec::new();
        let mut halt = false;

        // 1. Circuit breaker on open P&L
        if request.equity <= 0.0 {
            violations.push(violation(rules::NO_EQUITY, None, format!("Account equity is {:.2}", request.equity)));
        } else {
            let open_pl = unrealized_pl(request.current_positions).to_f64().unwrap_or(0.0);
            let daily_pl_percent = open_pl / request.equity * 100.0;
            if daily_pl_percent < -self.limits.daily_loss_halt_percent {
                halt = true;
                violations.push(violation(
                    rules::DAILY_LOSS,
                    None,
                    format!(
                        "Open loss {:.1}% exceeds halt limit of {:.1}%",
                        daily_pl_percent.abs(),
                        self.limits.daily_loss_halt_percent
                    ),
                ));
            }
        }

        // 2. Per-position cap
        for target in request.target_weights {
            if target.weight > params.max_weight_per_position + WEIGHT_EPSILON {
                violations.push(violation(
                    rules::WEIGHT_CAP,
                    Some(target.symbol.as_str()),
                    format!(
                        "Weight {:.1}% above {} cap of {:.1}%",
                        target.weight * 100.0,
                        request.risk_profile,
                        params.max_weight_per_position * 100.0
                    ),
                ));
            }
        }

        // 3. Gross exposure and position count
        let gross: f64 = request.target_weights.iter().map(|t| t.weight.max(0.0)).sum();
        if gross > self.limits.max_gross_exposure + WEIGHT_EPSILON {
            violations.push(violation(
                rules::GROSS_EXPOSURE,
                None,
                format!(
                    "Gross target exposure {:.1}% above {:.1}%",
                    gross * 100.0,
                    self.limits.max_gross_exposure * 100.0
                ),
            ));
        }

        let held = request
            .target_weights
            .iter()
            .filter(|t| t.side == Side::Buy && t.weight > 0.0)
            .count();
        if held > params.max_positions {
            violations.push(violation(
                rules::POSITION_COUNT,
                None,
                format!("{} positions above {} limit of {}", held, request.risk_profile, params.max_positions),
            ));
        }

        // 4. Market quality, for assets we are adding to
        for target in request.target_weights.iter().filter(|t| t.side == Side::Buy && t.weight > 0.0) {
            let Some(stats) = request.market_stats.get(&target.symbol) else {
                violations.push(violation(rules::LOW_LIQUIDITY, Some(target.symbol.as_str()), "No market data".to_string()));
                continue;
            };
            if stats.volume_24h < self.limits.min_liquidity_volume {
                violations.push(violation(
                    rules::LOW_LIQUIDITY,
                    Some(target.symbol.as_str()),
                    format!("24h volume {:.0} below {:.0}", stats.volume_24h, self.limits.min_liquidity_volume),
                ));
            }
            if stats.spread > self.limits.max_spread {
                violations.push(violation(
                    rules::WIDE_SPREAD,
                    Some(target.symbol.as_str()),
                    format!("Spread {:.4} above {:.4}", stats.spread, self.limits.max_spread),
                ));
            }
        }

        RiskVerdict {
            ok: violations.is_empty(),
            violations,
            halt,
        }
    }
}

fn violation(rule: &str, symbol: Option<&str>, detail: String) -> RiskViolation {
    RiskViolation {
        rule: rule.to_string(),
        symbol: symbol.map(str::to_string),
        detail,
    }
}

#[async_trait]
impl RiskService for LimitChecker {
    async fn check_limits(&self, ctx: &RoundContext, request: RiskRequest<'_>) -> Result<RiskVerdict, EngineError> {
        let verdict = self.evaluate(&request);
        if verdict.ok {
            tracing::info!(round_id = %ctx.round_id, "Risk check passed for {} targets", request.target_weights.len());
        } else {
            tracing::warn!(
                round_id = %ctx.round_id,
                halt = verdict.halt,
                "Risk check failed: {}",
                verdict.violations.iter().map(|v| v.detail.as_str()).collect::<Vec<_>>().join("; ")
            );
        }
        Ok(verdict)
    }
}
