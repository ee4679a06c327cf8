//! Seams to the collaborators around the decision core.
//!
//! Every call receives the [`RoundContext`] of the round that issued it, so
//! implementations can tag their own logs and reject calls from a stale round.

use async_trait::async_trait;
use broker_trait::BrokerPosition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    Claim, EngineError, Evidence, MarketStats, NewsItem, RiskProfile, RiskVerdict, Role, RoleContext,
    Round, RoundArtifact, RoundContext, TargetWeight, TechnicalIndicators, VerificationOutcome,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UniverseFilters {
    pub min_volume: f64,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvidenceQuery {
    pub since: Option<DateTime<Utc>>,
    pub min_relevance: Option<f64>,
    pub limit: Option<usize>,
}

/// Universe and per-asset market statistics
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_universe(&self, ctx: &RoundContext, filters: &UniverseFilters) -> Result<Vec<String>, EngineError>;

    async fn get_market_stats(&self, ctx: &RoundContext, ticker: &str) -> Result<MarketStats, EngineError>;
}

#[async_trait]
pub trait TechnicalProvider: Send + Sync {
    async fn get_technical_indicators(
        &self,
        ctx: &RoundContext,
        ticker: &str,
        timeframe: &str,
    ) -> Result<TechnicalIndicators, EngineError>;
}

/// News search plus the evidence store
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn search(
        &self,
        ctx: &RoundContext,
        query: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<NewsItem>, EngineError>;

    async fn put_news(&self, ctx: &RoundContext, items: &[NewsItem]) -> Result<(), EngineError>;

    async fn put_evidence(&self, ctx: &RoundContext, evidence: &[Evidence]) -> Result<(), EngineError>;

    async fn find_evidence(
        &self,
        ctx: &RoundContext,
        ticker: &str,
        query: &EvidenceQuery,
    ) -> Result<Vec<Evidence>, EngineError>;
}

/// Opaque analysis role producing structured claims
#[async_trait]
pub trait ClaimGenerator: Send + Sync {
    async fn run_role(&self, ctx: &RoundContext, role: Role, input: &RoleContext) -> Result<Vec<Claim>, EngineError>;
}

#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    async fn verify_claims(
        &self,
        ctx: &RoundContext,
        claims: Vec<Claim>,
        evidence: &[Evidence],
        cutoff: DateTime<Utc>,
    ) -> Result<VerificationOutcome, EngineError>;
}

#[derive(Debug, Clone)]
pub struct RiskRequest<'a> {
    pub target_weights: &'a [TargetWeight],
    pub current_positions: &'a [BrokerPosition],
    pub market_stats: &'a HashMap<String, MarketStats>,
    pub risk_profile: RiskProfile,
    pub equity: f64,
}

#[async_trait]
pub trait RiskService: Send + Sync {
    async fn check_limits(&self, ctx: &RoundContext, request: RiskRequest<'_>) -> Result<RiskVerdict, EngineError>;
}

/// Write-only persistence of round lifecycle and artifacts
#[async_trait]
pub trait RoundSink: Send + Sync {
    async fn start_round(&self, round: &Round) -> Result<(), EngineError>;

    /// Claims of a round, verified or not. Sinks that keep only summaries may ignore them.
    async fn record_claims(&self, _round: &Round, _verified: &[Claim], _rejected: &[Claim]) -> Result<(), EngineError> {
        Ok(())
    }

    async fn record_artifact(&self, artifact: &RoundArtifact) -> Result<(), EngineError>;

    async fn end_round(&self, round: &Round) -> Result<(), EngineError>;
}
