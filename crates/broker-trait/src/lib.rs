use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Venue-agnostic execution types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub id: String,
    pub currency: String,
    pub equity: Decimal,
    pub cash: Decimal,
    pub trading_blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub side: PositionSide,
    /// Signed market value: negative for shorts.
    pub market_value: Decimal,
    pub cost_basis: Decimal,
    pub unrealized_pl: Decimal,
}

impl BrokerPosition {
    pub fn exposure(&self) -> Decimal {
        self.market_value.abs()
    }
}

/// Sum of absolute market values across positions.
pub fn gross_exposure(positions: &[BrokerPosition]) -> Decimal {
    positions.iter().map(BrokerPosition::exposure).sum()
}

/// Sum of unrealized P&L across positions.
pub fn unrealized_pl(positions: &[BrokerPosition]) -> Decimal {
    positions.iter().map(|p| p.unrealized_pl).sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerOrderSide {
    Buy,
    Sell,
}

/// Notional market order. Venues that only accept quantities convert on their side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrderRequest {
    pub symbol: String,
    pub notional: Decimal,
    pub side: BrokerOrderSide,
    #[serde(default)]
    pub client_order_id: Option<String>,
}

impl BrokerOrderRequest {
    pub fn buy(symbol: impl Into<String>, notional: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            notional,
            side: BrokerOrderSide::Buy,
            client_order_id: None,
        }
    }

    pub fn sell(symbol: impl Into<String>, notional: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            notional,
            side: BrokerOrderSide::Sell,
            client_order_id: None,
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub id: String,
    pub client_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub symbol: String,
    pub notional: Decimal,
    pub side: BrokerOrderSide,
    pub status: String,
}

// ---------------------------------------------------------------------------
// Execution adapter trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Account equity, cash and trading status
    async fn get_account(&self) -> Result<BrokerAccount>;

    /// All open positions
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>>;

    /// Submit a notional market order and return the venue's order record
    async fn place_order(&self, order: BrokerOrderRequest) -> Result<BrokerOrder>;

    /// Flatten every open position. Returns the closing orders that were sent.
    async fn emergency_close(&self) -> Result<Vec<BrokerOrder>>;

    /// Whether this is a paper/simulated venue
    fn is_paper(&self) -> bool;

    /// Venue name for logging
    fn broker_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, mv: Decimal, pl: Decimal) -> BrokerPosition {
        BrokerPosition {
            symbol: symbol.to_string(),
            side: if mv < Decimal::ZERO { PositionSide::Short } else { PositionSide::Long },
            market_value: mv,
            cost_basis: mv - pl,
            unrealized_pl: pl,
        }
    }

    #[test]
    fn test_gross_exposure_counts_shorts() {
        let positions = vec![position("BTC", dec!(1000), dec!(50)), position("ETH", dec!(-400), dec!(-20))];
        assert_eq!(gross_exposure(&positions), dec!(1400));
        assert_eq!(unrealized_pl(&positions), dec!(30));
    }

    #[test]
    fn test_order_request_builders() {
        let order = BrokerOrderRequest::sell("SOL", dec!(250)).with_client_order_id("r1-SOL");
        assert_eq!(order.side, BrokerOrderSide::Sell);
        assert_eq!(order.client_order_id.as_deref(), Some("r1-SOL"));

        let json = serde_json::to_value(&BrokerOrderRequest::buy("BTC", dec!(10))).unwrap();
        assert_eq!(json["side"], "buy");
    }
}
