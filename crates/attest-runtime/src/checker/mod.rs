//! Evidence checker: labels every claim against its cited evidence.
//!
//! The checker resolves provenance texts, runs the tier chain, attaches
//! exactly one label to every claim and records verification metrics. It
//! never fails: collaborator errors degrade to the next tier and finally to
//! neutral defaults.

mod provenance;
mod tiers;

use serde_json::json;
use std::sync::Arc;

use attest_core::{Claim, Entailment, RunState, Stage, VerificationMetrics, VerifiedClaim};

use crate::cache::ProvenanceCache;
use crate::providers::{CompletionConfig, LlmProvider};
use crate::stores::EvidenceStore;
use crate::usage::UsageTracker;

pub use provenance::{cited_ids, resolve_provenance, Provenance};
pub use tiers::{chunk_size, Tier, TierChain, TierContext};

/// Which path produced the labels of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckPath {
    /// A tier of the chain succeeded
    Tier(Tier),

    /// No cited evidence resolved; every claim defaulted to neutral
    NoProvenance,

    /// Every tier of the chain failed; every claim defaulted to neutral
    Exhausted,
}

impl CheckPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckPath::Tier(tier) => tier.as_str(),
            CheckPath::NoProvenance => "no_provenance",
            CheckPath::Exhausted => "exhausted",
        }
    }
}

/// Result of checking one claim set.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub verified: Vec<VerifiedClaim>,
    pub metrics: VerificationMetrics,
    pub path: CheckPath,
}

/// Labels claims by entailment against their cited evidence.
pub struct EvidenceChecker {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn EvidenceStore>,
    config: CompletionConfig,
    chain: TierChain,
    cache: Option<ProvenanceCache>,
    usage: Arc<UsageTracker>,
}

impl EvidenceChecker {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<dyn EvidenceStore>,
        config: CompletionConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            chain: TierChain::default_chain(),
            cache: None,
            usage: Arc::new(UsageTracker::new()),
        }
    }

    pub fn with_chain(mut self, chain: TierChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_cache(mut self, cache: ProvenanceCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Label `state.claims` into `state.verified_claims` and log metrics
    /// under the `verification` stage.
    pub async fn verify(&self, state: &mut RunState) {
        self.verify_tracked(state, &self.usage).await;
    }

    pub(crate) async fn verify_tracked(&self, state: &mut RunState, usage: &UsageTracker) {
        if state.claims.is_empty() {
            tracing::info!("No claims to verify");
            log_metrics(state, &VerificationMetrics::zero());
            return;
        }

        let outcome = self.check_claims_tracked(&state.claims, usage).await;

        state.verified_claims = outcome.verified;
        log_metrics(state, &outcome.metrics);
        state.log_metric(Stage::Verification, [("tier", json!(outcome.path.as_str()))]);
    }

    /// Label a claim set without touching any run state.
    pub async fn check_claims(&self, claims: &[Claim]) -> CheckOutcome {
        self.check_claims_tracked(claims, &self.usage).await
    }

    async fn check_claims_tracked(&self, claims: &[Claim], usage: &UsageTracker) -> CheckOutcome {
        if claims.is_empty() {
            return CheckOutcome {
                verified: Vec::new(),
                metrics: VerificationMetrics::zero(),
                path: CheckPath::NoProvenance,
            };
        }

        let provenance = resolve_provenance(claims, self.store.as_ref(), self.cache.as_ref()).await;

        if !provenance.has_evidence() {
            tracing::warn!(
                claims = claims.len(),
                cited = provenance.len(),
                "No provenance text resolved; labeling all claims neutral"
            );
            return CheckOutcome {
                verified: label_all_neutral(claims),
                metrics: VerificationMetrics::zero(),
                path: CheckPath::NoProvenance,
            };
        }

        let ctx = TierContext {
            provider: self.provider.as_ref(),
            config: &self.config,
            usage,
            provenance: &provenance,
        };

        let (path, results) = match self.chain.run(&ctx, claims).await {
            Some((tier, results)) => (CheckPath::Tier(tier), results),
            None => {
                tracing::warn!(claims = claims.len(), "All entailment tiers failed; labeling all claims neutral");
                let defaults = vec![Entailment::neutral_default(); claims.len()];
                (CheckPath::Exhausted, defaults)
            }
        };

        let verified: Vec<VerifiedClaim> = claims
            .iter()
            .cloned()
            .zip(results)
            .map(|(claim, result)| VerifiedClaim::new(claim, result))
            .collect();
        let metrics = VerificationMetrics::from_claims(&verified);

        tracing::info!(
            claims = verified.len(),
            evidence = provenance.resolved_count(),
            path = path.as_str(),
            entailment_ratio = metrics.entailment_ratio,
            contradiction_ratio = metrics.contradiction_ratio,
            avg_confidence = metrics.avg_confidence,
            "Verification complete"
        );

        CheckOutcome {
            verified,
            metrics,
            path,
        }
    }
}

fn label_all_neutral(claims: &[Claim]) -> Vec<VerifiedClaim> {
    claims
        .iter()
        .cloned()
        .map(|claim| VerifiedClaim::new(claim, Entailment::neutral_default()))
        .collect()
}

fn log_metrics(state: &mut RunState, metrics: &VerificationMetrics) {
    if let Err(e) = state.log_serialized(Stage::Verification, metrics) {
        tracing::warn!(error = %e, "Failed to record verification metrics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderError;
    use crate::stores::{EvidenceChunk, InMemoryEvidenceStore};
    use crate::testing::{CountingEvidenceStore, ScriptedProvider};
    use attest_core::{Citation, EntailmentLabel};
    use proptest::prelude::*;

    fn cite(id: &str) -> Citation {
        Citation {
            id: id.to_string(),
            score: 0.9,
            source: "fungi.pdf".to_string(),
        }
    }

    fn evidence_store() -> Arc<InMemoryEvidenceStore> {
        let store = InMemoryEvidenceStore::new();
        store.insert(EvidenceChunk::new("c1", "Porcini are edible mushrooms.", "fungi.pdf"), vec![1.0, 0.0]);
        store.insert(EvidenceChunk::new("c2", "Fly agaric is poisonous.", "fungi.pdf"), vec![0.0, 1.0]);
        Arc::new(store)
    }

    fn cited_claims(n: usize) -> Vec<Claim> {
        (0..n)
            .map(|i| Claim::cited(format!("claim {i}"), cite(if i % 2 == 0 { "c1" } else { "c2" })))
            .collect()
    }

    fn batch_reply(labels: &[(&str, f64)]) -> String {
        let items: Vec<serde_json::Value> = labels
            .iter()
            .map(|(l, c)| json!({"label": l, "confidence": c}))
            .collect();
        json!({ "claims": items }).to_string()
    }

    fn checker(provider: Arc<ScriptedProvider>, store: Arc<dyn EvidenceStore>) -> EvidenceChecker {
        EvidenceChecker::new(provider, store, CompletionConfig::default())
    }

    #[tokio::test]
    async fn test_full_batch_success_metrics() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(batch_reply(&[
            ("entailment", 0.9),
            ("neutral", 0.5),
            ("contradiction", 0.8),
        ]));

        let mut state = RunState::new();
        state.claims = cited_claims(3);
        checker(provider.clone(), evidence_store()).verify(&mut state).await;

        let metrics = state.verification_metrics();
        assert!((metrics.entailment_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert!((metrics.contradiction_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert!((metrics.avg_confidence - 2.2 / 3.0).abs() < 1e-9);
        assert_eq!(state.verification.get("tier"), Some(&json!("full_batch")));
        assert_eq!(state.verified_claims[2].entailment, EntailmentLabel::Contradiction);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_full_batch_falls_through_to_chunks() {
        let provider = Arc::new(ScriptedProvider::new());
        // Full batch returns 2 of 5 judgements, then chunks of 3 and 2 succeed
        provider
            .push_text(batch_reply(&[("entailment", 0.9), ("entailment", 0.9)]))
            .push_text(batch_reply(&[("entailment", 0.8), ("neutral", 0.6), ("entailment", 0.7)]))
            .push_text(batch_reply(&[("contradiction", 0.9), ("entailment", 0.5)]));

        let mut state = RunState::new();
        state.claims = cited_claims(5);
        checker(provider.clone(), evidence_store()).verify(&mut state).await;

        assert_eq!(state.verified_claims.len(), 5);
        assert_eq!(state.verification.get("tier"), Some(&json!("chunked_batch")));
        assert_eq!(state.verified_claims[3].entailment, EntailmentLabel::Contradiction);
        assert!((state.verification_metrics().entailment_ratio - 0.6).abs() < 1e-9);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_all_tiers_fail_yields_neutral_zero() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(ProviderError::Timeout(std::time::Duration::from_secs(30)));

        let mut state = RunState::new();
        state.claims = cited_claims(4);
        checker(provider.clone(), evidence_store()).verify(&mut state).await;

        assert_eq!(state.verified_claims.len(), 4);
        assert!(state
            .verified_claims
            .iter()
            .all(|c| c.entailment == EntailmentLabel::Neutral && c.confidence == 0.0));
        assert_eq!(state.verification_metrics(), VerificationMetrics::zero());
        // 1 full batch + 2 chunks; the defaulted chunks stand
        assert_eq!(provider.call_count(), 3);
        assert_eq!(state.verification.get("tier"), Some(&json!("chunked_batch")));
    }

    #[tokio::test]
    async fn test_failed_chunks_do_not_reach_per_claim() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("garbage").push_text("garbage").push_text("garbage");
        for _ in 0..4 {
            provider.push_text(r#"{"label":"entailment","confidence":0.9}"#);
        }

        let mut state = RunState::new();
        state.claims = (0..4).map(|i| Claim::cited(format!("claim {i}"), cite("c1"))).collect();
        checker(provider.clone(), evidence_store()).verify(&mut state).await;

        assert_eq!(state.verification.get("tier"), Some(&json!("chunked_batch")));
        assert!(state
            .verified_claims
            .iter()
            .all(|c| c.entailment == EntailmentLabel::Neutral && c.confidence == 0.0));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_per_claim_tier_labels_each_claim() {
        let provider = Arc::new(ScriptedProvider::new());
        provider
            .push_text("not json")
            .push_text(r#"{"label":"entailment","confidence":0.95}"#)
            .push_text(r#"{"label":"entailment","confidence":0.85}"#)
            .push_text(r#"{"label":"contradiction","confidence":0.6}"#)
            .push_text(r#"{"label":"neutral","confidence":0.4}"#);

        let mut state = RunState::new();
        state.claims = cited_claims(4);
        checker(provider.clone(), evidence_store())
            .with_chain(TierChain::new().add(Tier::FullBatch).add(Tier::PerClaim))
            .verify(&mut state)
            .await;

        assert_eq!(state.verification.get("tier"), Some(&json!("per_claim")));
        let labels: Vec<EntailmentLabel> = state.verified_claims.iter().map(|c| c.entailment).collect();
        assert_eq!(
            labels,
            vec![
                EntailmentLabel::Entailment,
                EntailmentLabel::Entailment,
                EntailmentLabel::Contradiction,
                EntailmentLabel::Neutral
            ]
        );
        assert!(provider.calls()[1].prompt().contains("Porcini are edible mushrooms."));
        assert!(provider.calls()[2].prompt().contains("Fly agaric is poisonous."));
    }

    #[tokio::test]
    async fn test_chunks_label_their_own_evidence() {
        let provider = Arc::new(ScriptedProvider::new());
        provider
            .push_text("garbage")
            .push_text(batch_reply(&[("entailment", 0.9); 3]))
            .push_text(batch_reply(&[("contradiction", 0.8); 3]));

        let mut state = RunState::new();
        state.claims = (0..6)
            .map(|i| Claim::cited(format!("claim {i}"), cite(if i < 3 { "c1" } else { "c2" })))
            .collect();
        checker(provider.clone(), evidence_store()).verify(&mut state).await;

        assert_eq!(state.verification.get("tier"), Some(&json!("chunked_batch")));
        let calls = provider.calls();
        assert_eq!(calls.len(), 3);

        let full = calls[0].prompt();
        assert!(full.contains("Evidence A: \"\"\"Porcini are edible mushrooms.\"\"\""));
        assert!(full.contains("Evidence B: \"\"\"Fly agaric is poisonous.\"\"\""));

        let first = calls[1].prompt();
        assert!(first.contains("Evidence A: \"\"\"Porcini are edible mushrooms.\"\"\""));
        assert!(!first.contains("Fly agaric is poisonous."));
        assert!(!first.contains("Evidence B"));

        let second = calls[2].prompt();
        assert!(second.contains("Evidence A: \"\"\"Fly agaric is poisonous.\"\"\""));
        assert!(!second.contains("Porcini are edible mushrooms."));
        assert!(!second.contains("Evidence B"));
        assert!(second.contains("1. Claim: \"\"\"claim 3\"\"\" (uses Evidence A)"));
    }

    #[tokio::test]
    async fn test_empty_claims_make_no_calls() {
        let provider = Arc::new(ScriptedProvider::new());
        let store = Arc::new(CountingEvidenceStore::new(evidence_store()));

        let mut state = RunState::new();
        checker(provider.clone(), store.clone()).verify(&mut state).await;

        assert_eq!(state.verification_metrics(), VerificationMetrics::zero());
        assert_eq!(state.verification.len(), 3);
        assert!(state.verified_claims.is_empty());
        assert_eq!(provider.call_count(), 0);
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_provenance_short_circuits() {
        let provider = Arc::new(ScriptedProvider::new());
        let store = Arc::new(CountingEvidenceStore::new(evidence_store()).fail_lookup("c1"));

        let mut state = RunState::new();
        state.claims = vec![
            Claim::cited("claim a", cite("c1")),
            Claim::cited("claim b", cite("unknown")),
            Claim::new("claim c"),
        ];
        checker(provider.clone(), store).verify(&mut state).await;

        assert_eq!(provider.call_count(), 0);
        assert_eq!(state.verified_claims.len(), 3);
        assert!(state
            .verified_claims
            .iter()
            .all(|c| c.entailment == EntailmentLabel::Neutral && c.confidence == 0.0));
        assert_eq!(state.verification.get("tier"), Some(&json!("no_provenance")));
        assert_eq!(state.verification_metrics(), VerificationMetrics::zero());
    }

    #[tokio::test]
    async fn test_exhausted_custom_chain() {
        let provider = Arc::new(ScriptedProvider::new());
        let checker = checker(provider.clone(), evidence_store())
            .with_chain(TierChain::new().add(Tier::FullBatch));

        let outcome = checker.check_claims(&cited_claims(2)).await;

        assert_eq!(outcome.path, CheckPath::Exhausted);
        assert_eq!(outcome.verified.len(), 2);
        assert_eq!(outcome.metrics, VerificationMetrics::zero());
    }

    #[tokio::test]
    async fn test_usage_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(batch_reply(&[("entailment", 0.9)]));
        let usage = Arc::new(UsageTracker::new());

        let checker = checker(provider, evidence_store()).with_usage(usage.clone());
        checker.check_claims(&cited_claims(1)).await;

        assert_eq!(usage.snapshot().llm_calls, 1);
        assert_eq!(usage.snapshot().prompt_tokens, 10);
    }

    fn label_name() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("entailment"), Just("contradiction"), Just("neutral")]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_one_bounded_label_per_claim(
            replies in proptest::collection::vec((label_name(), -0.5f64..1.5), 0..8),
            n in 1usize..8,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let provider = Arc::new(ScriptedProvider::new());
                let items: Vec<(&str, f64)> = replies.clone();
                provider.push_text(batch_reply(&items));

                let outcome = checker(provider, evidence_store()).check_claims(&cited_claims(n)).await;

                prop_assert_eq!(outcome.verified.len(), n);
                prop_assert!(outcome.verified.iter().all(|c| (0.0..=1.0).contains(&c.confidence)));
                prop_assert!(outcome.metrics.entailment_ratio + outcome.metrics.contradiction_ratio <= 1.0 + 1e-12);
                Ok(())
            })?;
        }
    }
}
