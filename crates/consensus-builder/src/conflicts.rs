use decision_core::{Claim, Conflict, ConflictKind, Severity};
use std::collections::BTreeMap;

/// Confidence difference on the same call above which two roles are flagged
pub const DEFAULT_CONFIDENCE_GAP: f64 = 0.3;

/// Compare claims pairwise across roles, per ticker.
///
/// Direction comes from the claim's explicit bullish/bearish tag when present,
/// otherwise from its call. Opposite directions are a [`ConflictKind::DirectionMismatch`]; its gap
/// is half the distance between the signed confidences, so two confident,
/// opposed roles rate high. Matching calls whose confidences differ by more
/// than `gap_threshold` are a [`ConflictKind::ConfidenceGap`]. Advisory only.
pub fn detect_conflicts(claims: &[Claim], gap_threshold: f64) -> Vec<Conflict> {
    let mut by_ticker: BTreeMap<&str, Vec<&Claim>> = BTreeMap::new();
    for claim in claims {
        by_ticker.entry(claim.ticker.as_str()).or_default().push(claim);
    }

    let mut conflicts = Vec::new();
    for (ticker, group) in by_ticker {
        for (i, a) in group.iter().enumerate() {
            for b in &group[i + 1..] {
                if a.role == b.role {
                    continue;
                }
                if let Some(conflict) = compare(ticker, a, b, gap_threshold) {
                    conflicts.push(conflict);
                }
            }
        }
    }

    if !conflicts.is_empty() {
        tracing::info!(
            "Detected {} role conflicts ({} high severity)",
            conflicts.len(),
            conflicts.iter().filter(|c| c.severity == Severity::High).count()
        );
    }
    conflicts
}

fn compare(ticker: &str, a: &Claim, b: &Claim, gap_threshold: f64) -> Option<Conflict> {
    let (ca, cb) = (a.bounded_confidence(), b.bounded_confidence());
    let (sa, sb) = (a.direction_sign(), b.direction_sign());

    let (kind, gap) = if sa * sb < 0.0 {
        let gap = (ca * sa - cb * sb).abs() / 2.0;
        (ConflictKind::DirectionMismatch, gap)
    } else if sa == sb && (ca - cb).abs() > gap_threshold {
        (ConflictKind::ConfidenceGap, (ca - cb).abs())
    } else {
        return None;
    };

    Some(Conflict {
        ticker: ticker.to_string(),
        roles: (a.role, b.role),
        kind,
        confidence_gap: gap,
        severity: Severity::from_gap(gap),
        claim_ids: (a.id.clone(), b.id.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use decision_core::{Call, Direction, Role};

    #[test]
    fn test_opposed_roles_conflict() {
        let claims = vec![
            Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.8),
            Claim::new("s", "X", Role::Sentiment, Call::Sell, 0.6),
        ];
        let conflicts = detect_conflicts(&claims, DEFAULT_CONFIDENCE_GAP);
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.kind, ConflictKind::DirectionMismatch);
        assert_eq!(c.roles, (Role::Fundamental, Role::Sentiment));
        assert_relative_eq!(c.confidence_gap, 0.7, epsilon = 1e-12);
        assert_eq!(c.severity, Severity::High);
    }

    #[test]
    fn test_confidence_gap_on_same_call() {
        let claims = vec![
            Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.9),
            Claim::new("t", "X", Role::Technical, Call::Buy, 0.55),
            Claim::new("s", "X", Role::Sentiment, Call::Buy, 0.7),
        ];
        let conflicts = detect_conflicts(&claims, 0.3);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::ConfidenceGap);
        assert_eq!(conflicts[0].severity, Severity::Medium);
        assert_eq!(conflicts[0].claim_ids, ("f".to_string(), "t".to_string()));
    }

    #[test]
    fn test_hold_and_same_role_never_conflict() {
        let claims = vec![
            Claim::new("a", "X", Role::Technical, Call::Buy, 0.9),
            Claim::new("b", "X", Role::Technical, Call::Sell, 0.9),
            Claim::new("c", "X", Role::Sentiment, Call::Hold, 0.1),
            Claim::new("d", "Y", Role::Fundamental, Call::Sell, 0.9),
        ];
        // a/b share a role; c holds; d is alone on its ticker
        assert!(detect_conflicts(&claims, 0.3).is_empty());
    }

    #[test]
    fn test_explicit_direction_drives_mismatch() {
        let claims = vec![
            Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.8),
            Claim::new("s", "X", Role::Sentiment, Call::Hold, 0.6).with_direction(Direction::Bearish),
        ];
        let conflicts = detect_conflicts(&claims, DEFAULT_CONFIDENCE_GAP);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::DirectionMismatch);
        assert_relative_eq!(conflicts[0].confidence_gap, 0.7, epsilon = 1e-12);

        // a neutral tag silences an opposing call
        let neutral = vec![
            Claim::new("f", "X", Role::Fundamental, Call::Buy, 0.8),
            Claim::new("t", "X", Role::Technical, Call::Sell, 0.7).with_direction(Direction::Neutral),
        ];
        assert!(detect_conflicts(&neutral, DEFAULT_CONFIDENCE_GAP).is_empty());
    }
}
