//! Compaction (spec §4.6.5, §4.7.2.a).
//!
//! `conduit-providers::LlmProvider` exposes only `complete`, not a
//! separate remote-compaction RPC (DESIGN.md records this as the
//! resolution of SPEC_FULL's provider-adapter expansion): every provider
//! is compacted the same way — send history plus a fixed compaction
//! prompt, take the last assistant message as the summary, then replace
//! the history prefix via [`conduit_providers::translate::local_compaction`].

use conduit_providers::{LlmProvider, LlmRequest, ProviderError, WebSearchMode};
use conduit_types::ConversationItem;

pub const COMPACTION_PROMPT: &str =
    "Summarize this conversation so far in enough detail that work can continue \
     without the full transcript. Focus on what was done, what remains, and any \
     decisions made.";

/// Sends `history` plus the fixed compaction prompt to `provider` and
/// returns the compacted replacement history.
///
/// # Errors
/// Propagates the provider's error unchanged; the caller classifies it
/// exactly like any other `complete` failure.
pub async fn compact(
    provider: &dyn LlmProvider,
    history: &[ConversationItem],
    model: &str,
) -> Result<Vec<ConversationItem>, ProviderError> {
    let mut request_history = history.to_vec();
    request_history.push(ConversationItem::UserMessage { content: COMPACTION_PROMPT.to_string() });

    let request = LlmRequest {
        history: request_history,
        tool_specs: Vec::new(),
        base_instructions: String::new(),
        developer_instructions: String::new(),
        user_instructions: String::new(),
        previous_response_id: None,
        web_search_mode: WebSearchMode::Off,
        model: model.to_string(),
        reasoning_effort: None,
        temperature: None,
        max_output_tokens: None,
    };

    let response = provider.complete(&request).await?;
    let summary = response
        .items
        .iter()
        .rev()
        .find_map(|item| match item {
            ConversationItem::AssistantMessage { content } => Some(content.clone()),
            _ => None,
        })
        .unwrap_or_default();

    Ok(conduit_providers::translate::local_compaction(history, &summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_providers::{FinishReason, LlmResponse, MockProvider, TokenUsage};

    #[tokio::test]
    async fn compaction_replaces_history_with_marker_and_summary() {
        let provider = MockProvider::new(vec![LlmResponse {
            items: vec![ConversationItem::AssistantMessage { content: "did X, next is Y".to_string() }],
            finish_reason: FinishReason::Stop,
            token_usage: TokenUsage::default(),
            response_id: None,
        }]);

        let history = vec![ConversationItem::UserMessage { content: "do X then Y".to_string() }];
        let compacted = compact(&provider, &history, "mock-model").await.unwrap();

        assert!(matches!(compacted[0], ConversationItem::Compaction { .. }));
        match &compacted[1] {
            ConversationItem::AssistantMessage { content } => assert!(content.contains("did X, next is Y")),
            other => panic!("expected assistant summary, got {other:?}"),
        }
    }
}
