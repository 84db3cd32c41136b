//! Verification metrics computed over a fully labeled claim set.

use serde::{Deserialize, Serialize};

use crate::types::{EntailmentLabel, VerifiedClaim};

/// Aggregate verification metrics.
///
/// Ratios are taken against the total claim count, so neutral claims count
/// toward neither ratio and an empty set yields all zeros.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct VerificationMetrics {
    pub entailment_ratio: f64,
    pub contradiction_ratio: f64,
    pub avg_confidence: f64,
}

impl VerificationMetrics {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Compute metrics from labeled claims.
    pub fn from_claims(claims: &[VerifiedClaim]) -> Self {
        if claims.is_empty() {
            return Self::zero();
        }

        let total = claims.len() as f64;
        let count = |label: EntailmentLabel| {
            claims.iter().filter(|c| c.entailment == label).count() as f64
        };
        let confidence_sum: f64 = claims.iter().map(|c| c.confidence).sum();

        Self {
            entailment_ratio: count(EntailmentLabel::Entailment) / total,
            contradiction_ratio: count(EntailmentLabel::Contradiction) / total,
            avg_confidence: confidence_sum / total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Claim, Entailment};
    use proptest::prelude::*;

    fn verified(label: EntailmentLabel, confidence: f64) -> VerifiedClaim {
        VerifiedClaim::new(Claim::new("claim"), Entailment::new(label, confidence))
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(VerificationMetrics::from_claims(&[]), VerificationMetrics::zero());
    }

    #[test]
    fn test_three_claim_scenario() {
        let claims = vec![
            verified(EntailmentLabel::Entailment, 0.9),
            verified(EntailmentLabel::Neutral, 0.5),
            verified(EntailmentLabel::Contradiction, 0.8),
        ];
        let metrics = VerificationMetrics::from_claims(&claims);

        assert!((metrics.entailment_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert!((metrics.contradiction_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert!((metrics.avg_confidence - 2.2 / 3.0).abs() < 1e-9);
    }

    fn label_strategy() -> impl Strategy<Value = EntailmentLabel> {
        prop_oneof![
            Just(EntailmentLabel::Entailment),
            Just(EntailmentLabel::Contradiction),
            Just(EntailmentLabel::Neutral),
        ]
    }

    proptest! {
        #[test]
        fn prop_metrics_are_bounded(
            items in prop::collection::vec((label_strategy(), -1.0f64..2.0), 0..40)
        ) {
            let claims: Vec<_> = items.iter().map(|(l, c)| verified(*l, *c)).collect();
            let metrics = VerificationMetrics::from_claims(&claims);

            prop_assert!(metrics.entailment_ratio + metrics.contradiction_ratio <= 1.0 + 1e-9);
            prop_assert!((0.0..=1.0).contains(&metrics.entailment_ratio));
            prop_assert!((0.0..=1.0).contains(&metrics.contradiction_ratio));
            prop_assert!((0.0..=1.0 + 1e-9).contains(&metrics.avg_confidence));
        }
    }
}
