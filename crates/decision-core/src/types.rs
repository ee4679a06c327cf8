use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::profile::RiskProfile;

/// Analysis role that produced a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Fundamental,
    Sentiment,
    Technical,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Fundamental, Role::Sentiment, Role::Technical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Fundamental => "fundamental",
            Role::Sentiment => "sentiment",
            Role::Technical => "technical",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional call carried by a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Call {
    Buy,
    Sell,
    Hold,
}

impl Call {
    /// Parse free text leniently; anything unrecognised is a HOLD.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "BUY" | "LONG" | "STRONG BUY" => Call::Buy,
            "SELL" | "SHORT" | "STRONG SELL" => Call::Sell,
            _ => Call::Hold,
        }
    }

    /// BUY -> +1, SELL -> -1, HOLD -> 0
    pub fn sign(&self) -> f64 {
        match self {
            Call::Buy => 1.0,
            Call::Sell => -1.0,
            Call::Hold => 0.0,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Call::Hold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Call::Buy => "BUY",
            Call::Sell => "SELL",
            Call::Hold => "HOLD",
        }
    }
}

impl<'de> Deserialize<'de> for Call {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Call::parse(&text))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Bearish => "bearish",
            Direction::Neutral => "neutral",
        }
    }

    pub fn sign(&self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Bearish => -1.0,
            Direction::Neutral => 0.0,
        }
    }
}

/// One analysis role's opinion on one ticker for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub ticker: String,
    pub role: Role,
    pub call: Call,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub magnitude: Option<f64>,
    pub confidence: f64,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub sub_signals: HashMap<String, f64>,
}

impl Claim {
    pub fn new(id: impl Into<String>, ticker: impl Into<String>, role: Role, call: Call, confidence: f64) -> Self {
        Self {
            id: id.into(),
            ticker: ticker.into(),
            role,
            call,
            direction: None,
            magnitude: None,
            confidence,
            evidence_ids: Vec::new(),
            risk_flags: Vec::new(),
            rationale: None,
            sub_signals: HashMap::new(),
        }
    }

    pub fn with_evidence(mut self, ids: &[&str]) -> Self {
        self.evidence_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_flags(mut self, flags: &[&str]) -> Self {
        self.risk_flags = flags.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Bullish/bearish sign: the explicit direction when given, else the call's.
    pub fn direction_sign(&self) -> f64 {
        self.direction.map(|d| d.sign()).unwrap_or_else(|| self.call.sign())
    }

    /// Confidence clamped into [0, 1]; upstream generators are not trusted to respect it.
    pub fn bounded_confidence(&self) -> f64 {
        if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Kind-specific payload of an evidence item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EvidenceKind {
    News {
        headline: String,
        #[serde(default)]
        url: Option<String>,
    },
    Market {
        metric: String,
        value: f64,
    },
    Tech {
        indicator: String,
        value: f64,
    },
}

/// An atomic, timestamped observation. `observed_at` is the publish time for news.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub ticker: String,
    pub source: String,
    pub relevance: f64,
    #[serde(default)]
    pub impact: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub observed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EvidenceKind,
}

/// News item as returned by the evidence provider's search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub title: String,
    pub source: String,
    #[serde(default)]
    pub url: Option<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub relevance: Option<f64>,
    #[serde(default)]
    pub sentiment: Option<f64>,
}

impl NewsItem {
    pub fn into_evidence(self, ticker: &str) -> Evidence {
        Evidence {
            id: self.id,
            ticker: ticker.to_string(),
            source: self.source,
            relevance: self.relevance.unwrap_or(0.5).clamp(0.0, 1.0),
            impact: self.sentiment.map(|s| s.clamp(-1.0, 1.0)),
            confidence: None,
            observed_at: self.published_at,
            kind: EvidenceKind::News {
                headline: self.title,
                url: self.url,
            },
        }
    }
}

/// 24h market statistics for one ticker. Changes are in percent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MarketStats {
    pub volume_24h: f64,
    pub price_change_24h: f64,
    pub volume_change_24h: f64,
    pub spread: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub macd: Option<f64>,
    #[serde(default)]
    pub macd_signal: Option<f64>,
    #[serde(default)]
    pub macd_histogram: Option<f64>,
    #[serde(default)]
    pub adx: Option<f64>,
    #[serde(default)]
    pub extra: HashMap<String, f64>,
}

impl TechnicalIndicators {
    /// MACD histogram, derived from line minus signal when not reported directly
    pub fn histogram(&self) -> Option<f64> {
        self.macd_histogram
            .or_else(|| Some(self.macd? - self.macd_signal?))
            .filter(|h| h.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Hold,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

/// Numbers behind a signal's half-Kelly position size
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SizingInputs {
    pub expected_return: f64,
    pub asset_volatility: f64,
    pub raw_kelly: f64,
}

/// Fused per-ticker signal for one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalAnalysis {
    pub ticker: String,
    pub overall_signal: f64,
    pub confidence: f64,
    pub volatility: f64,
    pub momentum: f64,
    pub fundamental: f64,
    pub sentiment: f64,
    pub technical: f64,
    pub risk_score: f64,
    pub recommendation: Recommendation,
    pub rationale: String,
    pub time_horizon: TimeHorizon,
    pub position_size: f64,
    pub sizing: SizingInputs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub ticker: String,
    pub avg_confidence: f64,
    pub coverage: f64,
    pub liquidity: f64,
    pub final_score: f64,
    pub claim_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DirectionMismatch,
    ConfidenceGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_gap(gap: f64) -> Self {
        if gap >= 0.5 {
            Severity::High
        } else if gap >= 0.25 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub ticker: String,
    pub roles: (Role, Role),
    pub kind: ConflictKind,
    pub confidence_gap: f64,
    pub severity: Severity,
    pub claim_ids: (String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
    Hold,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Hold => "hold",
        }
    }
}

impl From<Recommendation> for Side {
    fn from(rec: Recommendation) -> Self {
        match rec {
            Recommendation::Buy => Side::Buy,
            Recommendation::Sell => Side::Sell,
            Recommendation::Hold => Side::Hold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetWeight {
    pub symbol: String,
    pub weight: f64,
    pub side: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Running,
    Completed,
    Failed,
}

impl RoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundStatus::Running => "running",
            RoundStatus::Completed => "completed",
            RoundStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RoundStatus,
    pub claims_count: usize,
    pub orders_count: usize,
    pub total_pnl: f64,
}

impl Round {
    pub fn start(ctx: &RoundContext) -> Self {
        Self {
            id: ctx.round_id,
            started_at: ctx.started_at,
            ended_at: None,
            status: RoundStatus::Running,
            claims_count: 0,
            orders_count: 0,
            total_pnl: 0.0,
        }
    }

    pub fn finish(&mut self, status: RoundStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// Per-round context handed to every collaborator call.
#[derive(Debug, Clone)]
pub struct RoundContext {
    pub round_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub profile: RiskProfile,
}

impl RoundContext {
    pub fn new(profile: RiskProfile) -> Self {
        Self {
            round_id: Uuid::new_v4(),
            started_at: Utc::now(),
            profile,
        }
    }
}

/// Bundle handed to a claim generator
#[derive(Debug, Clone, Serialize)]
pub struct RoleContext {
    pub round_id: Uuid,
    pub universe: Vec<String>,
    pub facts: Vec<Evidence>,
    pub market_stats: HashMap<String, MarketStats>,
    pub risk_profile: RiskProfile,
    pub timestamp: DateTime<Utc>,
}

/// A reason a claim (or one of its evidence references) failed verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub claim_id: String,
    pub evidence_id: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub verified: Vec<Claim>,
    pub rejected: Vec<Claim>,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskViolation {
    pub rule: String,
    pub symbol: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub ok: bool,
    pub violations: Vec<RiskViolation>,
    /// Raised when the breach is severe enough to stop trading altogether
    #[serde(default)]
    pub halt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedOrder {
    pub symbol: String,
    pub side: Side,
    pub notional: f64,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

/// Everything a round produced, for persistence and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundArtifact {
    pub round: Round,
    pub profile: RiskProfile,
    pub universe_size: usize,
    pub verified_claims: usize,
    pub rejected_claims: usize,
    pub violations: Vec<Violation>,
    pub signals: Vec<SignalAnalysis>,
    pub consensus: Vec<ConsensusRecord>,
    pub conflicts: Vec<Conflict>,
    pub target_weights: Vec<TargetWeight>,
    pub risk: Option<RiskVerdict>,
    pub orders: Vec<SubmittedOrder>,
    pub skipped: bool,
}
