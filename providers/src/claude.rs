//! Anthropic Messages API adapter.
//!
//! Grounded in the teacher's `claude.rs`/`sse_types.rs` split: a typed SSE
//! event enum driving an incremental accumulator, sent through the shared
//! retry policy in [`crate::retry`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};

use conduit_types::{CallId, ConversationItem};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::translate::instructions_hierarchy;
use crate::{
    CompleteFut, FinishReason, LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage,
    drain_next_sse_event, extract_sse_data, find_sse_event_boundary, http_client, read_capped_error_body,
};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct ClaudeProvider {
    api_key: String,
}

impl ClaudeProvider {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let (system, _developer) =
            instructions_hierarchy(&request.base_instructions, &request.user_instructions, &request.developer_instructions, false);
        let messages = build_messages(&request.history);
        let tools: Vec<Value> = request.tool_specs.iter().map(tool_to_claude_schema).collect();

        let mut body = json!({
            "model": request.model,
            "system": system,
            "messages": messages,
            "max_tokens": request.max_output_tokens.filter(|&t| t > 0).unwrap_or(DEFAULT_MAX_TOKENS),
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(temperature) = request.temperature.filter(|&t| t > 0.0) {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

fn tool_to_claude_schema(spec: &conduit_types::ToolSpec) -> Value {
    use conduit_types::ParameterSchema;
    let input_schema = match &spec.parameter_schema {
        ParameterSchema::RawJsonSchema(raw) => raw.clone(),
        ParameterSchema::Flat(params) => {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for p in params {
                properties.insert(p.name.clone(), json!({"type": p.type_name, "description": p.description}));
                if p.required {
                    required.push(p.name.clone());
                }
            }
            json!({"type": "object", "properties": properties, "required": required})
        }
    };
    json!({"name": spec.name, "description": spec.description, "input_schema": input_schema})
}

/// Walks the flat history into Claude's alternating user/assistant message
/// array: an assistant message's text and `tool_use` blocks are followed by
/// a user message carrying the matching `tool_result` blocks.
fn build_messages(history: &[ConversationItem]) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut assistant_blocks: Vec<Value> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    let flush_assistant = |messages: &mut Vec<Value>, blocks: &mut Vec<Value>| {
        if !blocks.is_empty() {
            messages.push(json!({"role": "assistant", "content": std::mem::take(blocks)}));
        }
    };
    let flush_results = |messages: &mut Vec<Value>, results: &mut Vec<Value>| {
        if !results.is_empty() {
            messages.push(json!({"role": "user", "content": std::mem::take(results)}));
        }
    };

    for item in history {
        match item {
            ConversationItem::UserMessage { content } => {
                flush_assistant(&mut messages, &mut assistant_blocks);
                flush_results(&mut messages, &mut pending_results);
                messages.push(json!({"role": "user", "content": [{"type": "text", "text": content}]}));
            }
            ConversationItem::AssistantMessage { content } => {
                flush_results(&mut messages, &mut pending_results);
                assistant_blocks.push(json!({"type": "text", "text": content}));
            }
            ConversationItem::FunctionCall { call_id, tool_name, arguments_json } => {
                flush_results(&mut messages, &mut pending_results);
                let input: Value = serde_json::from_str(arguments_json).unwrap_or(Value::Object(serde_json::Map::new()));
                assistant_blocks.push(json!({"type": "tool_use", "id": call_id.as_str(), "name": tool_name, "input": input}));
            }
            ConversationItem::FunctionCallOutput { call_id, content, .. } => {
                flush_assistant(&mut messages, &mut assistant_blocks);
                pending_results.push(json!({"type": "tool_result", "tool_use_id": call_id.as_str(), "content": content}));
            }
            ConversationItem::WebSearchCall { .. } | ConversationItem::Compaction { .. } => {}
            _ if item.is_internal_marker() => {}
            _ => {}
        }
    }
    flush_assistant(&mut messages, &mut assistant_blocks);
    flush_results(&mut messages, &mut pending_results);
    messages
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClaudeEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: MessageStartInfo },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: usize, content_block: ContentBlockStart },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: usize, delta: ContentDelta },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaInfo, usage: Option<UsageInfo> },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStartInfo {
    #[serde(default)]
    usage: UsageInfo,
}

#[derive(Debug, Default, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlockStart {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentDelta {
    #[serde(rename = "text_delta")]
    Text { text: String },
    #[serde(rename = "input_json_delta")]
    InputJson { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInfo {
    stop_reason: Option<String>,
}

enum Block {
    Text(String),
    ToolUse { id: String, name: String, partial_json: String },
}

fn finish_reason_from_stop_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("tool_use") => FinishReason::ToolCalls,
        Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

async fn stream_to_response(response: reqwest::Response) -> Result<LlmResponse, ProviderError> {
    use futures_util::StreamExt;

    let mut blocks: HashMap<usize, Block> = HashMap::new();
    let mut order: Vec<usize> = Vec::new();
    let mut usage = TokenUsage::default();
    let mut finish_reason = FinishReason::Stop;
    let mut buffer = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProviderError::Transport(e.to_string()))?;
        buffer.extend_from_slice(&chunk);

        while find_sse_event_boundary(&buffer).is_some() {
            let Some(event_bytes) = drain_next_sse_event(&mut buffer) else { break };
            let event_str = String::from_utf8_lossy(&event_bytes);
            let Some(data) = extract_sse_data(&event_str) else { continue };
            if data == "[DONE]" {
                continue;
            }
            let Ok(event) = serde_json::from_str::<ClaudeEvent>(&data) else { continue };
            match event {
                ClaudeEvent::MessageStart { message } => usage.input_tokens = message.usage.input_tokens,
                ClaudeEvent::ContentBlockStart { index, content_block } => {
                    order.push(index);
                    let block = match content_block {
                        ContentBlockStart::Text => Block::Text(String::new()),
                        ContentBlockStart::ToolUse { id, name } => Block::ToolUse { id, name, partial_json: String::new() },
                        ContentBlockStart::Other => continue,
                    };
                    blocks.insert(index, block);
                }
                ClaudeEvent::ContentBlockDelta { index, delta } => match (blocks.get_mut(&index), delta) {
                    (Some(Block::Text(text)), ContentDelta::Text { text: delta_text }) => text.push_str(&delta_text),
                    (Some(Block::ToolUse { partial_json, .. }), ContentDelta::InputJson { partial_json: delta_json }) => {
                        partial_json.push_str(&delta_json);
                    }
                    _ => {}
                },
                ClaudeEvent::MessageDelta { delta, usage: delta_usage } => {
                    finish_reason = finish_reason_from_stop_reason(delta.stop_reason.as_deref());
                    if let Some(u) = delta_usage {
                        usage.output_tokens = u.output_tokens;
                    }
                }
                ClaudeEvent::MessageStop | ClaudeEvent::Other => {}
            }
        }
    }

    let mut items = Vec::new();
    for index in order {
        let Some(block) = blocks.remove(&index) else { continue };
        match block {
            Block::Text(text) => {
                if !text.is_empty() {
                    items.push(ConversationItem::AssistantMessage { content: text });
                }
            }
            Block::ToolUse { id, name, partial_json } => {
                let call_id = CallId::new(id).map_err(|e| ProviderError::Decode(e.to_string()))?;
                items.push(ConversationItem::FunctionCall { call_id, tool_name: name, arguments_json: partial_json });
            }
        }
    }

    Ok(LlmResponse { items, finish_reason, token_usage: usage, response_id: None })
}

impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn complete<'a>(&'a self, request: &'a LlmRequest) -> CompleteFut<'a> {
        Box::pin(async move {
            let body = self.build_body(request);
            let config = RetryConfig::default();
            let outcome = send_with_retry(
                || {
                    http_client()
                        .post(API_URL)
                        .header("x-api-key", &self.api_key)
                        .header("anthropic-version", ANTHROPIC_VERSION)
                        .json(&body)
                },
                None,
                &config,
            )
            .await;

            match outcome {
                RetryOutcome::Success(response) => stream_to_response(response).await,
                RetryOutcome::HttpError(response) => {
                    let status = response.status().as_u16();
                    let message = read_capped_error_body(response).await;
                    Err(ProviderError::Http { status, message })
                }
                RetryOutcome::ConnectionError { source, .. } | RetryOutcome::NonRetryable(source) => {
                    Err(ProviderError::Transport(source.to_string()))
                }
            }
        })
    }
}
