use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static allow-list of assets that move together closely enough that
/// holding several of them is close to one bet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationGroup {
    members: BTreeSet<String>,
}

impl CorrelationGroup {
    pub fn new<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            members: members
                .into_iter()
                .map(|s| base_symbol(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Major crypto assets
    pub fn majors() -> Self {
        Self::new(["BTC", "ETH", "SOL", "BNB", "XRP"])
    }

    /// Matches on the base asset, so `ETH-USD` and `eth/usdt` are both `ETH`.
    pub fn contains(&self, symbol: &str) -> bool {
        self.members.contains(&base_symbol(symbol))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

fn base_symbol(symbol: &str) -> String {
    symbol
        .split(['-', '/'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_uppercase()
}
