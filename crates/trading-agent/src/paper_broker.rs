use anyhow::{bail, Result};
use async_trait::async_trait;
use broker_trait::{
    BrokerAccount, BrokerOrder, BrokerOrderRequest, BrokerOrderSide, BrokerPosition, ExecutionAdapter, PositionSide,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct Holding {
    market_value: Decimal,
    cost_basis: Decimal,
}

#[derive(Debug)]
struct Book {
    cash: Decimal,
    holdings: BTreeMap<String, Holding>,
    next_order: u64,
}

/// Long-only simulated venue. Fills every order immediately at its notional.
///
/// There is no price feed: holdings keep their value until [`PaperBroker::mark`]
/// revalues them.
pub struct PaperBroker {
    book: Mutex<Book>,
}

impl PaperBroker {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            book: Mutex::new(Book {
                cash: starting_cash,
                holdings: BTreeMap::new(),
                next_order: 1,
            }),
        }
    }

    /// Set a holding's market value, e.g. to simulate a drawdown.
    pub async fn mark(&self, symbol: &str, market_value: Decimal) {
        let mut book = self.book.lock().await;
        if let Some(h) = book.holdings.get_mut(symbol) {
            h.market_value = market_value;
        }
    }

    pub async fn cash(&self) -> Decimal {
        self.book.lock().await.cash
    }
}

fn fill(book: &mut Book, request: &BrokerOrderRequest) -> Result<BrokerOrder> {
    if request.notional <= Decimal::ZERO {
        bail!("Order notional must be positive, got {}", request.notional);
    }

    match request.side {
        BrokerOrderSide::Buy => {
            if request.notional > book.cash {
                bail!("Insufficient cash: {} requested, {} available", request.notional, book.cash);
            }
            book.cash -= request.notional;
            let h = book.holdings.entry(request.symbol.clone()).or_insert(Holding {
                market_value: Decimal::ZERO,
                cost_basis: Decimal::ZERO,
            });
            h.market_value += request.notional;
            h.cost_basis += request.notional;
        }
        BrokerOrderSide::Sell => {
            let Some(h) = book.holdings.get_mut(&request.symbol) else {
                bail!("No position in {} to sell", request.symbol);
            };
            let notional = request.notional.min(h.market_value);
            let fraction = if h.market_value > Decimal::ZERO {
                notional / h.market_value
            } else {
                Decimal::ONE
            };
            h.cost_basis -= h.cost_basis * fraction;
            h.market_value -= notional;
            let emptied = h.market_value <= Decimal::ZERO;
            book.cash += notional;
            if emptied {
                book.holdings.remove(&request.symbol);
            }
        }
    }

    let id = format!("paper-{}", book.next_order);
    book.next_order += 1;
    Ok(BrokerOrder {
        id,
        client_order_id: request.client_order_id.clone(),
        created_at: Utc::now(),
        symbol: request.symbol.clone(),
        notional: request.notional,
        side: request.side,
        status: "filled".to_string(),
    })
}

#[async_trait]
impl ExecutionAdapter for PaperBroker {
    async fn get_account(&self) -> Result<BrokerAccount> {
        let book = self.book.lock().await;
        let invested: Decimal = book.holdings.values().map(|h| h.market_value).sum();
        Ok(BrokerAccount {
            id: "paper".to_string(),
            currency: "USD".to_string(),
            equity: book.cash + invested,
            cash: book.cash,
            trading_blocked: false,
        })
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        let book = self.book.lock().await;
        Ok(book
            .holdings
            .iter()
            .map(|(symbol, h)| BrokerPosition {
                symbol: symbol.clone(),
                side: PositionSide::Long,
                market_value: h.market_value,
                cost_basis: h.cost_basis,
                unrealized_pl: h.market_value - h.cost_basis,
            })
            .collect())
    }

    async fn place_order(&self, order: BrokerOrderRequest) -> Result<BrokerOrder> {
        let mut book = self.book.lock().await;
        let filled = fill(&mut book, &order)?;
        tracing::debug!("Paper fill {} {:?} ${}", filled.symbol, filled.side, filled.notional);
        Ok(filled)
    }

    async fn emergency_close(&self) -> Result<Vec<BrokerOrder>> {
        let mut book = self.book.lock().await;
        let open: Vec<(String, Decimal)> = book
            .holdings
            .iter()
            .map(|(s, h)| (s.clone(), h.market_value))
            .collect();

        let mut closed = Vec::with_capacity(open.len());
        for (symbol, value) in open {
            if value <= Decimal::ZERO {
                book.holdings.remove(&symbol);
                continue;
            }
            closed.push(fill(&mut book, &BrokerOrderRequest::sell(symbol, value))?);
        }
        Ok(closed)
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "paper"
    }
}
