use async_trait::async_trait;
use chrono::{DateTime, Utc};
use decision_core::{Claim, ClaimVerifier, EngineError, Evidence, RoundContext, VerificationOutcome, Violation};
use std::collections::HashMap;

pub const DEFAULT_MIN_RELEVANCE: f64 = 0.3;

/// Checks each claim's evidence references for existence, freshness and relevance.
///
/// A claim survives when at least one of its references passes all three checks.
/// Every failing reference is reported, including those of surviving claims.
#[derive(Debug, Clone)]
pub struct EvidenceVerifier {
    min_relevance: f64,
}

impl Default for EvidenceVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_RELEVANCE)
    }
}

impl EvidenceVerifier {
    pub fn new(min_relevance: f64) -> Self {
        Self {
            min_relevance: min_relevance.clamp(0.0, 1.0),
        }
    }

    pub fn verify(&self, claims: Vec<Claim>, evidence: &[Evidence], cutoff: DateTime<Utc>) -> VerificationOutcome {
        let index: HashMap<&str, &Evidence> = evidence.iter().map(|e| (e.id.as_str(), e)).collect();
        let mut outcome = VerificationOutcome::default();

        for claim in claims {
            if claim.evidence_ids.is_empty() {
                outcome.violations.push(Violation {
                    claim_id: claim.id.clone(),
                    evidence_id: None,
                    reason: "no evidence cited".to_string(),
                });
                outcome.rejected.push(claim);
                continue;
            }

            let mut passing = 0;
            for evidence_id in &claim.evidence_ids {
                match self.check(evidence_id, &claim, &index, cutoff) {
                    Ok(()) => passing += 1,
                    Err(reason) => outcome.violations.push(Violation {
                        claim_id: claim.id.clone(),
                        evidence_id: Some(evidence_id.clone()),
                        reason,
                    }),
                }
            }

            if passing > 0 {
                outcome.verified.push(claim);
            } else {
                outcome.rejected.push(claim);
            }
        }

        outcome
    }

    fn check(
        &self,
        evidence_id: &str,
        claim: &Claim,
        index: &HashMap<&str, &Evidence>,
        cutoff: DateTime<Utc>,
    ) -> Result<(), String> {
        let Some(evidence) = index.get(evidence_id) else {
            return Err("unknown evidence".to_string());
        };
        if evidence.observed_at < cutoff {
            return Err(format!(
                "stale: observed {} before cutoff {}",
                evidence.observed_at.to_rfc3339(),
                cutoff.to_rfc3339()
            ));
        }
        if evidence.relevance < self.min_relevance {
            return Err(format!(
                "low relevance {:.2} < {:.2}",
                evidence.relevance, self.min_relevance
            ));
        }
        if !evidence.ticker.eq_ignore_ascii_case(&claim.ticker) {
            return Err(format!("evidence is about {}, not {}", evidence.ticker, claim.ticker));
        }
        Ok(())
    }
}

#[async_trait]
impl ClaimVerifier for EvidenceVerifier {
    async fn verify_claims(
        &self,
        ctx: &RoundContext,
        claims: Vec<Claim>,
        evidence: &[Evidence],
        cutoff: DateTime<Utc>,
    ) -> Result<VerificationOutcome, EngineError> {
        let total = claims.len();
        let outcome = self.verify(claims, evidence, cutoff);
        tracing::info!(
            round_id = %ctx.round_id,
            "Verified {}/{} claims ({} violations)",
            outcome.verified.len(),
            total,
            outcome.violations.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use decision_core::{Call, EvidenceKind, Role};

    fn evidence(id: &str, ticker: &str, relevance: f64, age_hours: i64) -> Evidence {
        Evidence {
            id: id.to_string(),
            ticker: ticker.to_string(),
            source: "test".to_string(),
            relevance,
            impact: None,
            confidence: None,
            observed_at: Utc::now() - Duration::hours(age_hours),
            kind: EvidenceKind::Market {
                metric: "volume_24h".to_string(),
                value: 1.0,
            },
        }
    }

    #[test]
    fn test_partition_and_violations() {
        let facts = vec![
            evidence("fresh", "X", 0.9, 1),
            evidence("old", "X", 0.9, 48),
            evidence("weak", "X", 0.1, 1),
            evidence("other", "Y", 0.9, 1),
        ];
        let claims = vec![
            Claim::new("ok", "X", Role::Fundamental, Call::Buy, 0.8).with_evidence(&["fresh", "old"]),
            Claim::new("stale", "X", Role::Sentiment, Call::Buy, 0.8).with_evidence(&["old", "weak"]),
            Claim::new("ghost", "X", Role::Technical, Call::Sell, 0.8).with_evidence(&["missing"]),
            Claim::new("bare", "X", Role::Technical, Call::Buy, 0.8),
            Claim::new("crossed", "X", Role::Technical, Call::Buy, 0.8).with_evidence(&["other"]),
        ];

        let cutoff = Utc::now() - Duration::hours(24);
        let outcome = EvidenceVerifier::default().verify(claims, &facts, cutoff);

        let verified: Vec<&str> = outcome.verified.iter().map(|c| c.id.as_str()).collect();
        let rejected: Vec<&str> = outcome.rejected.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(verified, vec!["ok"]);
        assert_eq!(rejected, vec!["stale", "ghost", "bare", "crossed"]);

        // old (ok), old + weak (stale), missing, bare, other
        assert_eq!(outcome.violations.len(), 6);
        assert!(outcome.violations.iter().any(|v| v.reason.starts_with("stale")));
        assert!(outcome.violations.iter().any(|v| v.reason.starts_with("low relevance")));
        assert!(outcome.violations.iter().any(|v| v.reason == "unknown evidence"));
    }
}
