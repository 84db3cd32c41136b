//! Completion usage accounting for a pipeline.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::prompts::SYSTEM_PROMPT;
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
};

/// Accumulated completion usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Number of completion calls made, failed ones included
    pub llm_calls: u32,

    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Calls that returned an error
    pub failed_calls: u32,
}

impl LlmUsage {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Usage accrued since an earlier snapshot.
    pub fn since(&self, earlier: &LlmUsage) -> LlmUsage {
        LlmUsage {
            llm_calls: self.llm_calls.saturating_sub(earlier.llm_calls),
            prompt_tokens: self.prompt_tokens.saturating_sub(earlier.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_sub(earlier.completion_tokens),
            failed_calls: self.failed_calls.saturating_sub(earlier.failed_calls),
        }
    }
}

/// Thread-safe usage tracker shared by the nodes of a pipeline.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call.
    pub fn record(&self, usage: &TokenUsage) {
        let mut current = self.usage.write();
        current.llm_calls += 1;
        current.prompt_tokens += usage.prompt_tokens;
        current.completion_tokens += usage.completion_tokens;
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut current = self.usage.write();
        current.llm_calls += 1;
        current.failed_calls += 1;
    }

    /// Fold in usage accounted elsewhere.
    pub fn absorb(&self, other: &LlmUsage) {
        let mut current = self.usage.write();
        current.llm_calls += other.llm_calls;
        current.prompt_tokens += other.prompt_tokens;
        current.completion_tokens += other.completion_tokens;
        current.failed_calls += other.failed_calls;
    }

    pub fn snapshot(&self) -> LlmUsage {
        *self.usage.read()
    }

    pub fn reset(&self) {
        *self.usage.write() = LlmUsage::default();
    }
}

/// Send one user prompt and account for the call.
pub(crate) async fn complete_tracked(
    provider: &dyn LlmProvider,
    usage: &UsageTracker,
    prompt: String,
    config: &CompletionConfig,
) -> Result<CompletionResponse, ProviderError> {
    tracing::debug!(
        provider = provider.name(),
        model = %config.model,
        prompt_tokens = provider.estimate_tokens(&prompt),
        "Sending completion"
    );

    let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];
    let result = provider.complete(messages, config).await;

    match &result {
        Ok(response) => usage.record(&response.usage),
        Err(_) => usage.record_failure(),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let tracker = UsageTracker::new();
        tracker.record(&TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 20,
        });
        tracker.record_failure();

        let usage = tracker.snapshot();
        assert_eq!(usage.llm_calls, 2);
        assert_eq!(usage.failed_calls, 1);
        assert_eq!(usage.total_tokens(), 120);

        let other = UsageTracker::new();
        other.absorb(&usage);
        assert_eq!(other.snapshot(), usage);

        tracker.reset();
        assert_eq!(tracker.snapshot(), LlmUsage::default());
    }

    #[test]
    fn test_since() {
        let earlier = LlmUsage {
            llm_calls: 1,
            prompt_tokens: 10,
            completion_tokens: 5,
            failed_calls: 0,
        };
        let later = LlmUsage {
            llm_calls: 4,
            prompt_tokens: 70,
            completion_tokens: 9,
            failed_calls: 2,
        };

        let delta = later.since(&earlier);
        assert_eq!(delta.llm_calls, 3);
        assert_eq!(delta.prompt_tokens, 60);
        assert_eq!(delta.failed_calls, 2);
    }
}
