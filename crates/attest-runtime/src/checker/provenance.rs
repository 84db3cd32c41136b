//! Provenance resolution: cited chunk ids to evidence texts.

use futures::future::join_all;
use std::collections::BTreeMap;

use attest_core::Claim;

use crate::cache::ProvenanceCache;
use crate::stores::EvidenceStore;

/// Evidence texts for the chunk ids cited by a claim set.
///
/// Every cited id is present; an id whose lookup failed or found nothing
/// maps to the empty string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    texts: BTreeMap<String, String>,
}

impl Provenance {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            texts: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Evidence text for a chunk id, empty when unresolved.
    pub fn text(&self, chunk_id: &str) -> &str {
        self.texts.get(chunk_id).map(String::as_str).unwrap_or("")
    }

    /// Evidence text cited by a claim, empty when uncited or unresolved.
    pub fn premise_for(&self, claim: &Claim) -> &str {
        claim.citation_id().map(|id| self.text(id)).unwrap_or("")
    }

    /// Whether at least one id resolved to non-empty text.
    pub fn has_evidence(&self) -> bool {
        self.texts.values().any(|t| !t.is_empty())
    }

    /// Number of cited ids.
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.texts.values().filter(|t| !t.is_empty()).count()
    }
}

/// Distinct cited chunk ids, in first-appearance order.
pub fn cited_ids(claims: &[Claim]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in claims.iter().filter_map(Claim::citation_id) {
        if !ids.iter().any(|seen| seen == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Resolve evidence texts for every distinct cited id.
///
/// A failed lookup resolves that id to the empty string and never affects
/// the others.
pub async fn resolve_provenance(
    claims: &[Claim],
    store: &dyn EvidenceStore,
    cache: Option<&ProvenanceCache>,
) -> Provenance {
    let ids = cited_ids(claims);

    let lookups = ids.iter().map(|id| async move {
        if let Some(cache) = cache {
            if let Some(text) = cache.get(id).await {
                return (id.clone(), text);
            }
        }

        let text = match store.get_by_id(id).await {
            Ok(Some(chunk)) => chunk.text,
            Ok(None) => {
                tracing::warn!(chunk_id = %id, "Cited evidence chunk not found");
                String::new()
            }
            Err(e) => {
                tracing::warn!(chunk_id = %id, error = %e, "Evidence lookup failed");
                String::new()
            }
        };

        if let Some(cache) = cache {
            cache.insert(id, &text).await;
        }
        (id.clone(), text)
    });

    Provenance {
        texts: join_all(lookups).await.into_iter().collect(),
    }
}
