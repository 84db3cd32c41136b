//! Entailment strategies tried in order until one succeeds.
//!
//! ```text
//! FullBatch ──fail──▶ ChunkedBatch ──fail──▶ PerClaim
//! ```
//!
//! Exactly one tier's output labels the whole claim set. Tier results are
//! never merged.

use serde::{Deserialize, Serialize};

use attest_core::schema::{batch_schema, entailment_schema};
use attest_core::{decode_batch_response, decode_single_response, Claim, Entailment};

use super::provenance::Provenance;
use crate::prompts::{batch_entailment_prompt, entailment_prompt};
use crate::providers::{CompletionConfig, LlmProvider, ResponseFormat};
use crate::usage::{complete_tracked, UsageTracker};

/// Name of the structured output schema sent to providers.
const SCHEMA_NAME: &str = "verification";

/// One entailment strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// One structured call covering every claim
    FullBatch,

    /// Contiguous chunks, each its own structured call
    ChunkedBatch,

    /// One call per claim
    PerClaim,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::FullBatch => "full_batch",
            Tier::ChunkedBatch => "chunked_batch",
            Tier::PerClaim => "per_claim",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chunk size for the chunked tier: `max(3, ceil(n / 3))`.
pub fn chunk_size(total: usize) -> usize {
    total.div_ceil(3).max(3)
}

/// Collaborators a tier needs for one verification call.
pub struct TierContext<'a> {
    pub provider: &'a dyn LlmProvider,
    pub config: &'a CompletionConfig,
    pub usage: &'a UsageTracker,
    pub provenance: &'a Provenance,
}

impl TierContext<'_> {
    /// One batch call over `claims`, decoded and length-checked.
    async fn batch_call(&self, tier: Tier, claims: &[Claim]) -> Option<Vec<Entailment>> {
        let prompt = batch_entailment_prompt(claims, self.provenance);
        let config = self
            .config
            .with_format(ResponseFormat::json_schema(SCHEMA_NAME, batch_schema()));

        let response = match complete_tracked(self.provider, self.usage, prompt, &config).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(tier = %tier, claims = claims.len(), error = %e, "Batch completion failed");
                return None;
            }
        };

        match decode_batch_response(&response.content, claims.len()) {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!(tier = %tier, claims = claims.len(), error = %e, "Batch response rejected");
                None
            }
        }
    }

    /// One single-pair call, defaulting to neutral on any failure.
    async fn single_call(&self, claim: &Claim) -> Entailment {
        let prompt = entailment_prompt(self.provenance.premise_for(claim), &claim.text);
        let config = self
            .config
            .with_format(ResponseFormat::json_schema(SCHEMA_NAME, entailment_schema()));

        let response = match complete_tracked(self.provider, self.usage, prompt, &config).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Per-claim completion failed; defaulting to neutral");
                return Entailment::neutral_default();
            }
        };

        decode_single_response(&response.content).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Per-claim response rejected; defaulting to neutral");
            Entailment::neutral_default()
        })
    }

    /// Run one tier. `None` means the tier failed and the next should run.
    pub async fn run(&self, tier: Tier, claims: &[Claim]) -> Option<Vec<Entailment>> {
        match tier {
            Tier::FullBatch => self.batch_call(tier, claims).await,
            Tier::ChunkedBatch => self.chunked(claims).await,
            Tier::PerClaim => {
                let mut results = Vec::with_capacity(claims.len());
                for claim in claims {
                    results.push(self.single_call(claim).await);
                }
                Some(results)
            }
        }
    }

    /// Chunks run in order. A failed chunk is defaulted to neutral on its own,
    /// even when every chunk fails; the tier fails only on a count mismatch.
    async fn chunked(&self, claims: &[Claim]) -> Option<Vec<Entailment>> {
        let size = chunk_size(claims.len());
        let mut results = Vec::with_capacity(claims.len());

        for (index, chunk) in claims.chunks(size).enumerate() {
            match self.batch_call(Tier::ChunkedBatch, chunk).await {
                Some(chunk_results) => results.extend(chunk_results),
                None => {
                    tracing::warn!(chunk = index + 1, claims = chunk.len(), "Chunk failed; using neutral defaults");
                    results.extend(std::iter::repeat(Entailment::neutral_default()).take(chunk.len()));
                }
            }
        }

        if results.len() != claims.len() {
            return None;
        }
        Some(results)
    }
}

/// Ordered list of tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierChain {
    tiers: Vec<Tier>,
}

impl TierChain {
    pub fn new() -> Self {
        Self { tiers: Vec::new() }
    }

    pub fn add(mut self, tier: Tier) -> Self {
        self.tiers.push(tier);
        self
    }

    /// FullBatch, then ChunkedBatch, then PerClaim.
    pub fn default_chain() -> Self {
        Self::new()
            .add(Tier::FullBatch)
            .add(Tier::ChunkedBatch)
            .add(Tier::PerClaim)
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Try each tier in order and return the first success.
    pub async fn run(&self, ctx: &TierContext<'_>, claims: &[Claim]) -> Option<(Tier, Vec<Entailment>)> {
        for tier in &self.tiers {
            if let Some(results) = ctx.run(*tier, claims).await {
                return Some((*tier, results));
            }
            tracing::warn!(tier = %tier, claims = claims.len(), "Entailment tier failed");
        }
        None
    }
}

impl Default for TierChain {
    fn default() -> Self {
        Self::default_chain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;
    use attest_core::EntailmentLabel;

    fn claims(n: usize) -> Vec<Claim> {
        (0..n).map(|i| Claim::new(format!("claim {i}"))).collect()
    }

    fn batch_reply(labels: &[(&str, f64)]) -> String {
        let items: Vec<serde_json::Value> = labels
            .iter()
            .map(|(l, c)| serde_json::json!({"label": l, "confidence": c}))
            .collect();
        serde_json::json!({ "claims": items }).to_string()
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(1), 3);
        assert_eq!(chunk_size(5), 3);
        assert_eq!(chunk_size(9), 3);
        assert_eq!(chunk_size(10), 4);
        assert_eq!(chunk_size(30), 10);
    }

    #[test]
    fn test_default_chain_order() {
        let chain = TierChain::default_chain();
        assert_eq!(chain.tiers(), &[Tier::FullBatch, Tier::ChunkedBatch, Tier::PerClaim]);
    }

    #[tokio::test]
    async fn test_chunk_failure_is_isolated() {
        let provider = ScriptedProvider::new();
        // 4 claims: chunk size 3, so chunks of 3 and 1
        provider
            .push_text("garbage")
            .push_text(batch_reply(&[("entailment", 0.9)]));

        let usage = UsageTracker::new();
        let provenance = Provenance::default();
        let config = CompletionConfig::default();
        let ctx = TierContext {
            provider: &provider,
            config: &config,
            usage: &usage,
            provenance: &provenance,
        };

        let results = ctx.run(Tier::ChunkedBatch, &claims(4)).await.unwrap();

        assert_eq!(results.len(), 4);
        assert!(results[..3].iter().all(|r| *r == Entailment::neutral_default()));
        assert_eq!(results[3].label, EntailmentLabel::Entailment);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_chunked_tier_stands_when_every_chunk_fails() {
        let provider = ScriptedProvider::new();
        let usage = UsageTracker::new();
        let provenance = Provenance::default();
        let config = CompletionConfig::default();
        let ctx = TierContext {
            provider: &provider,
            config: &config,
            usage: &usage,
            provenance: &provenance,
        };

        let results = ctx.run(Tier::ChunkedBatch, &claims(7)).await.unwrap();

        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| *r == Entailment::neutral_default()));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(usage.snapshot().failed_calls, 3);
    }

    #[tokio::test]
    async fn test_per_claim_defaults_individual_failures() {
        let provider = ScriptedProvider::new();
        provider
            .push_text(r#"{"label":"contradiction","confidence":0.7}"#)
            .push_text(r#"{"label":"maybe","confidence":0.7}"#);

        let usage = UsageTracker::new();
        let provenance = Provenance::default();
        let config = CompletionConfig::default();
        let ctx = TierContext {
            provider: &provider,
            config: &config,
            usage: &usage,
            provenance: &provenance,
        };

        let results = ctx.run(Tier::PerClaim, &claims(3)).await.unwrap();

        assert_eq!(results[0], Entailment::new(EntailmentLabel::Contradiction, 0.7));
        assert_eq!(results[1], Entailment::neutral_default());
        assert_eq!(results[2], Entailment::neutral_default());
    }

    #[tokio::test]
    async fn test_batch_calls_request_structured_output() {
        let provider = ScriptedProvider::new();
        provider.push_text(batch_reply(&[("neutral", 0.4), ("neutral", 0.4)]));

        let usage = UsageTracker::new();
        let provenance = Provenance::default();
        let config = CompletionConfig::default();
        let ctx = TierContext {
            provider: &provider,
            config: &config,
            usage: &usage,
            provenance: &provenance,
        };

        let (tier, results) = TierChain::default_chain().run(&ctx, &claims(2)).await.unwrap();

        assert_eq!(tier, Tier::FullBatch);
        assert_eq!(results.len(), 2);
        match &provider.calls()[0].response_format {
            ResponseFormat::JsonSchema { name, schema } => {
                assert_eq!(name, "verification");
                assert_eq!(schema, &batch_schema());
            }
            other => panic!("unexpected format {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let provider = ScriptedProvider::new();
        let usage = UsageTracker::new();
        let provenance = Provenance::default();
        let config = CompletionConfig::default();
        let ctx = TierContext {
            provider: &provider,
            config: &config,
            usage: &usage,
            provenance: &provenance,
        };

        assert!(TierChain::new().run(&ctx, &claims(2)).await.is_none());
        assert_eq!(provider.call_count(), 0);
    }
}
