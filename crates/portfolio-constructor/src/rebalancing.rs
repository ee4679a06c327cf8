use broker_trait::{BrokerOrderRequest, BrokerOrderSide, BrokerPosition};
use decision_core::{Side, TargetWeight};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One planned order: the notional needed to move a position to its target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: BrokerOrderSide,
    pub notional: Decimal,
    pub target_weight: f64,
    pub current_value: Decimal,
}

impl OrderIntent {
    pub fn to_request(&self, client_order_id: impl Into<String>) -> BrokerOrderRequest {
        let request = match self.side {
            BrokerOrderSide::Buy => BrokerOrderRequest::buy(&self.symbol, self.notional),
            BrokerOrderSide::Sell => BrokerOrderRequest::sell(&self.symbol, self.notional),
        };
        request.with_client_order_id(client_order_id)
    }
}

pub struct RebalanceCalculator;

impl RebalanceCalculator {
    /// Diff target weights against current positions.
    ///
    /// Buy targets aim for `weight x equity`. A sell target with zero weight
    /// flattens the long position; a non-zero sell weight trims that much.
    /// Diffs under `min_notional` are skipped. Sells come first so their
    /// proceeds fund the buys; otherwise target order is kept.
    pub fn calculate(
        targets: &[TargetWeight],
        positions: &[BrokerPosition],
        equity: Decimal,
        min_notional: Decimal,
    ) -> Vec<OrderIntent> {
        if equity <= Decimal::ZERO {
            tracing::warn!("Non-positive equity ({}), no orders planned", equity);
            return Vec::new();
        }

        let mut current_values: HashMap<&str, Decimal> = HashMap::new();
        for p in positions {
            *current_values.entry(p.symbol.as_str()).or_insert(Decimal::ZERO) += p.market_value;
        }

        let mut sells = Vec::new();
        let mut buys = Vec::new();

        for target in targets {
            let current = current_values.get(target.symbol.as_str()).copied().unwrap_or(Decimal::ZERO);
            let weight = Decimal::from_f64(target.weight.clamp(0.0, 1.0)).unwrap_or(Decimal::ZERO);

            let diff = match target.side {
                Side::Hold => continue,
                Side::Buy => equity * weight - current,
                Side::Sell => {
                    let held = current.max(Decimal::ZERO);
                    if weight.is_zero() {
                        -held
                    } else {
                        -(equity * weight).min(held)
                    }
                }
            }
            .round_dp(2);

            if diff.abs() < min_notional {
                continue;
            }

            let intent = OrderIntent {
                symbol: target.symbol.clone(),
                side: if diff > Decimal::ZERO { BrokerOrderSide::Buy } else { BrokerOrderSide::Sell },
                notional: diff.abs(),
                target_weight: target.weight,
                current_value: current,
            };
            match intent.side {
                BrokerOrderSide::Sell => sells.push(intent),
                BrokerOrderSide::Buy => buys.push(intent),
            }
        }

        sells.extend(buys);
        sells
    }
}
