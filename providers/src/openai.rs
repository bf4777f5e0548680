//! OpenAI Responses API adapter.
//!
//! Streams SSE but, unlike the Claude adapter, only acts on the terminal
//! `response.completed` event (it carries the full `output` array) — this
//! mirrors the teacher's preference for parsing one authoritative object
//! over hand-accumulating every delta when the vendor offers both.

use serde::Deserialize;
use serde_json::{Value, json};

use conduit_types::{CallId, ConversationItem};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::translate::{instructions_hierarchy, is_reasoning_model, sampling_params};
use crate::{
    CompleteFut, FinishReason, LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage,
    drain_next_sse_event, extract_sse_data, find_sse_event_boundary, http_client, read_capped_error_body,
};

const API_URL: &str = "https://api.openai.com/v1/responses";

pub struct OpenAiProvider {
    api_key: String,
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let (instructions, _) =
            instructions_hierarchy(&request.base_instructions, &request.user_instructions, &request.developer_instructions, false);
        let input = build_input(&request.history);
        let tools: Vec<Value> = request.tool_specs.iter().map(tool_to_openai_schema).collect();
        let effort = request.reasoning_effort.as_deref().or(if is_reasoning_model(&request.model) { Some("medium") } else { None });
        let sampling = sampling_params(&request.model, request.temperature, request.max_output_tokens, effort);

        let mut body = json!({
            "model": request.model,
            "instructions": instructions,
            "input": input,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        if let Some(previous) = &request.previous_response_id {
            body["previous_response_id"] = json!(previous);
        }
        if let Some(t) = sampling.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(effort) = sampling.reasoning_effort {
            body["reasoning"] = json!({"effort": effort});
        }
        if let Some(max_tokens) = sampling.max_output_tokens {
            body["max_output_tokens"] = json!(max_tokens);
        }
        body
    }
}

fn tool_to_openai_schema(spec: &conduit_types::ToolSpec) -> Value {
    use conduit_types::ParameterSchema;
    let parameters = match &spec.parameter_schema {
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
    json!({"type": "function", "name": spec.name, "description": spec.description, "parameters": parameters})
}

/// Builds the Responses API's flat `input` item array. Unlike Claude's
/// alternating-message shape, each history item becomes its own item.
fn build_input(history: &[ConversationItem]) -> Vec<Value> {
    let mut input = Vec::new();
    for item in history {
        match item {
            ConversationItem::UserMessage { content } => {
                input.push(json!({"type": "message", "role": "user", "content": [{"type": "input_text", "text": content}]}));
            }
            ConversationItem::AssistantMessage { content } => {
                input.push(json!({"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": content}]}));
            }
            ConversationItem::FunctionCall { call_id, tool_name, arguments_json } => {
                input.push(json!({"type": "function_call", "call_id": call_id.as_str(), "name": tool_name, "arguments": arguments_json}));
            }
            ConversationItem::FunctionCallOutput { call_id, content, .. } => {
                input.push(json!({"type": "function_call_output", "call_id": call_id.as_str(), "output": content}));
            }
            ConversationItem::WebSearchCall { .. } | ConversationItem::Compaction { .. } => {}
            _ if item.is_internal_marker() => {}
            _ => {}
        }
    }
    input
}

#[derive(Debug, Deserialize)]
struct CompletedEnvelope {
    response: CompletedResponse,
}

#[derive(Debug, Deserialize)]
struct CompletedResponse {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
    #[serde(default)]
    usage: UsageInfo,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: String,
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
enum OutputItem {
    #[serde(rename = "message")]
    Message { content: Vec<MessageContent> },
    #[serde(rename = "function_call")]
    FunctionCall { call_id: String, name: String, arguments: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(default)]
    text: String,
}

fn finish_reason_from(status: &str, incomplete_reason: Option<&str>, has_function_calls: bool) -> FinishReason {
    if has_function_calls {
        return FinishReason::ToolCalls;
    }
    if status == "incomplete" && incomplete_reason == Some("max_output_tokens") {
        return FinishReason::Length;
    }
    FinishReason::Stop
}

fn response_to_llm_response(completed: CompletedResponse) -> Result<LlmResponse, ProviderError> {
    let has_function_calls = completed.output.iter().any(|o| matches!(o, OutputItem::FunctionCall { .. }));
    let finish_reason =
        finish_reason_from(&completed.status, completed.incomplete_details.as_ref().map(|d| d.reason.as_str()), has_function_calls);

    let mut items = Vec::new();
    for output in completed.output {
        match output {
            OutputItem::Message { content } => {
                let text: String = content.into_iter().map(|c| c.text).collect();
                if !text.is_empty() {
                    items.push(ConversationItem::AssistantMessage { content: text });
                }
            }
            OutputItem::FunctionCall { call_id, name, arguments } => {
                let call_id = CallId::new(call_id).map_err(|e| ProviderError::Decode(e.to_string()))?;
                items.push(ConversationItem::FunctionCall { call_id, tool_name: name, arguments_json: arguments });
            }
            OutputItem::Other => {}
        }
    }

    Ok(LlmResponse {
        items,
        finish_reason,
        token_usage: TokenUsage { input_tokens: completed.usage.input_tokens, output_tokens: completed.usage.output_tokens },
        response_id: Some(completed.id),
    })
}

async fn stream_to_response(response: reqwest::Response) -> Result<LlmResponse, ProviderError> {
    use futures_util::StreamExt;

    let mut buffer = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProviderError::Transport(e.to_string()))?;
        buffer.extend_from_slice(&chunk);

        while find_sse_event_boundary(&buffer).is_some() {
            let Some(event_bytes) = drain_next_sse_event(&mut buffer) else { break };
            let event_str = String::from_utf8_lossy(&event_bytes);
            let Some(data) = extract_sse_data(&event_str) else { continue };
            if !event_str.contains("response.completed") {
                continue;
            }
            let envelope: CompletedEnvelope = serde_json::from_str(&data).map_err(|e| ProviderError::Decode(e.to_string()))?;
            return response_to_llm_response(envelope.response);
        }
    }

    Err(ProviderError::Decode("stream ended without a response.completed event".to_string()))
}

impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete<'a>(&'a self, request: &'a LlmRequest) -> CompleteFut<'a> {
        Box::pin(async move {
            let body = self.build_body(request);
            let config = RetryConfig::default();
            let outcome =
                send_with_retry(|| http_client().post(API_URL).bearer_auth(&self.api_key).json(&body), None, &config).await;

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_input_maps_every_item_kind_to_its_own_entry() {
        let history = vec![
            ConversationItem::UserMessage { content: "hi".to_string() },
            ConversationItem::AssistantMessage { content: "hello".to_string() },
            ConversationItem::FunctionCall { call_id: CallId::new("c1").unwrap(), tool_name: "shell".to_string(), arguments_json: "{}".to_string() },
            ConversationItem::FunctionCallOutput { call_id: CallId::new("c1").unwrap(), content: "ok".to_string(), success: Some(true) },
        ];
        let input = build_input(&history);
        assert_eq!(input.len(), 4);
        assert_eq!(input[2]["type"], "function_call");
        assert_eq!(input[3]["type"], "function_call_output");
    }

    #[test]
    fn finish_reason_prefers_tool_calls_over_incomplete() {
        assert_eq!(finish_reason_from("incomplete", Some("max_output_tokens"), true), FinishReason::ToolCalls);
        assert_eq!(finish_reason_from("incomplete", Some("max_output_tokens"), false), FinishReason::Length);
        assert_eq!(finish_reason_from("completed", None, false), FinishReason::Stop);
    }

    #[test]
    fn response_to_llm_response_carries_response_id_forward() {
        let completed = CompletedResponse {
            id: "resp_123".to_string(),
            status: "completed".to_string(),
            incomplete_details: None,
            usage: UsageInfo { input_tokens: 10, output_tokens: 5 },
            output: vec![OutputItem::Message { content: vec![MessageContent { text: "done".to_string() }] }],
        };
        let response = response_to_llm_response(completed).unwrap();
        assert_eq!(response.response_id.as_deref(), Some("resp_123"));
        assert_eq!(response.token_usage.input_tokens, 10);
    }
}
