//! Deterministic provider used by the test suite and as the no-network
//! fallback (§2 expansion, §6 expansion).
//!
//! Scripted: each call to [`MockProvider::complete`] pops the next queued
//! response. Once the queue is empty it returns a single plain
//! `AssistantMessage` echoing that the mock ran out of script, rather than
//! erroring — a test harness that runs out of canned turns should see that
//! in the transcript, not get a panic.

use std::sync::Mutex;

use conduit_types::ConversationItem;

use crate::{CompleteFut, FinishReason, LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage};

/// A provider whose responses are scripted ahead of time.
pub struct MockProvider {
    queue: Mutex<Vec<LlmResponse>>,
}

impl MockProvider {
    /// Responses are popped front-to-back in the order given.
    #[must_use]
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        let mut queue = responses;
        queue.reverse();
        Self { queue: Mutex::new(queue) }
    }

    /// A provider with no scripted responses; every call falls through to
    /// the out-of-script message.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    fn out_of_script() -> LlmResponse {
        LlmResponse {
            items: vec![ConversationItem::AssistantMessage {
                content: "mock provider: no scripted response remains".to_string(),
            }],
            finish_reason: FinishReason::Stop,
            token_usage: TokenUsage::default(),
            response_id: None,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::empty()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn complete<'a>(&'a self, _request: &'a LlmRequest) -> CompleteFut<'a> {
        Box::pin(async move {
            let mut queue = self.queue.lock().expect("mock provider queue mutex poisoned");
            let response = queue.pop().unwrap_or_else(Self::out_of_script);
            Ok::<LlmResponse, ProviderError>(response)
        })
    }
}
