use async_trait::async_trait;
use chrono::{DateTime, Utc};
use decision_core::{
    Claim, ClaimGenerator, EngineError, Evidence, EvidenceProvider, EvidenceQuery, MarketDataProvider, MarketStats,
    NewsItem, Role, RoleContext, RoundContext, TechnicalIndicators, TechnicalProvider, UniverseFilters,
};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const ROUND_HEADER: &str = "x-round-id";

/// HTTP client for the data and analysis gateway.
///
/// One service fronts the universe, market data, technicals, the evidence
/// store and the per-role claim generators. Every request carries the id of
/// the round that issued it.
#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn fetch<T: DeserializeOwned>(&self, ctx: &RoundContext, request: RequestBuilder, what: &str) -> Result<T, EngineError> {
        let response = request
            .header(ROUND_HEADER, ctx.round_id.to_string())
            .send()
            .await
            .map_err(|e| EngineError::Collaborator(format!("{}: {}", what, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EngineError::MissingData(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Collaborator(format!("{} returned {}: {}", what, status, body)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| EngineError::Collaborator(format!("{}: invalid response: {}", what, e)))
    }

    async fn send(&self, ctx: &RoundContext, request: RequestBuilder, what: &str) -> Result<(), EngineError> {
        let response = request
            .header(ROUND_HEADER, ctx.round_id.to_string())
            .send()
            .await
            .map_err(|e| EngineError::Collaborator(format!("{}: {}", what, e)))?;

        if !response.status().is_success() {
            return Err(EngineError::Collaborator(format!("{} returned {}", what, response.status())));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataProvider for GatewayClient {
    async fn get_universe(&self, ctx: &RoundContext, filters: &UniverseFilters) -> Result<Vec<String>, EngineError> {
        let request = self.client.get(self.url("/universe")).query(&[
            ("min_volume", filters.min_volume.to_string()),
            ("limit", filters.limit.to_string()),
        ]);
        self.fetch(ctx, request, "universe").await
    }

    async fn get_market_stats(&self, ctx: &RoundContext, ticker: &str) -> Result<MarketStats, EngineError> {
        let request = self.client.get(self.url(&format!("/market-stats/{}", ticker)));
        self.fetch(ctx, request, &format!("market stats for {}", ticker)).await
    }
}

#[async_trait]
impl TechnicalProvider for GatewayClient {
    async fn get_technical_indicators(
        &self,
        ctx: &RoundContext,
        ticker: &str,
        timeframe: &str,
    ) -> Result<TechnicalIndicators, EngineError> {
        let request = self
            .client
            .get(self.url(&format!("/technical/{}", ticker)))
            .query(&[("timeframe", timeframe)]);
        self.fetch(ctx, request, &format!("technicals for {}", ticker)).await
    }
}

#[async_trait]
impl EvidenceProvider for GatewayClient {
    async fn search(
        &self,
        ctx: &RoundContext,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, EngineError> {
        let request = self.client.get(self.url("/news")).query(&[
            ("q", query.to_string()),
            ("from", from.to_rfc3339()),
            ("to", to.to_rfc3339()),
        ]);
        self.fetch(ctx, request, "news search").await
    }

    async fn put_news(&self, ctx: &RoundContext, items: &[NewsItem]) -> Result<(), EngineError> {
        if items.is_empty() {
            return Ok(());
        }
        let request = self.client.post(self.url("/news")).json(items);
        self.send(ctx, request, "store news").await
    }

    async fn put_evidence(&self, ctx: &RoundContext, evidence: &[Evidence]) -> Result<(), EngineError> {
        if evidence.is_empty() {
            return Ok(());
        }
        let request = self.client.post(self.url("/evidence")).json(evidence);
        self.send(ctx, request, "store evidence").await
    }

    async fn find_evidence(
        &self,
        ctx: &RoundContext,
        ticker: &str,
        query: &EvidenceQuery,
    ) -> Result<Vec<Evidence>, EngineError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(since) = query.since {
            params.push(("since", since.to_rfc3339()));
        }
        if let Some(min) = query.min_relevance {
            params.push(("min_relevance", min.to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let request = self
            .client
            .get(self.url(&format!("/evidence/{}", ticker)))
            .query(&params);
        self.fetch(ctx, request, &format!("evidence for {}", ticker)).await
    }
}

#[async_trait]
impl ClaimGenerator for GatewayClient {
    async fn run_role(&self, ctx: &RoundContext, role: Role, input: &RoleContext) -> Result<Vec<Claim>, EngineError> {
        let request = self
            .client
            .post(self.url(&format!("/roles/{}", role.as_str())))
            .json(input);
        let claims: Vec<Claim> = self.fetch(ctx, request, &format!("{} role", role)).await?;

        // A generator may only speak for its own role.
        let (own, foreign): (Vec<Claim>, Vec<Claim>) = claims.into_iter().partition(|c| c.role == role);
        if !foreign.is_empty() {
            tracing::warn!(round_id = %ctx.round_id, "Dropped {} claims from {} role tagged with another role", foreign.len(), role);
        }
        Ok(own)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client = GatewayClient::new("http://localhost:8010/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8010");
        assert_eq!(client.url("/universe"), "http://localhost:8010/universe");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_collaborator_error() {
        let client = GatewayClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let ctx = RoundContext::new(decision_core::RiskProfile::Neutral);
        let err = client.get_universe(&ctx, &UniverseFilters::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::Collaborator(_)));
    }
}
