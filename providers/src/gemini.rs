//! Google Gemini adapter.
//!
//! A thinner sibling of [`crate::openai`]/[`crate::claude`]: Gemini's
//! `generateContent` endpoint is called without `alt=sse`, so there is no
//! stream to accumulate, only one JSON body to decode. Reasoning-style
//! `thinkingConfig` is intentionally left unset; the shared
//! [`crate::translate::is_reasoning_model`] rule was written against
//! OpenAI's `o1*`/`o3*`/`o4*` family and doesn't apply to Gemini model ids.

use serde::Deserialize;
use serde_json::{Value, json};

use conduit_types::{CallId, ConversationItem};

use crate::retry::{RetryConfig, RetryOutcome, send_with_retry};
use crate::translate::instructions_hierarchy;
use crate::{CompleteFut, FinishReason, LlmProvider, LlmRequest, LlmResponse, ProviderError, TokenUsage, http_client, read_capped_error_body};

const API_URL_TEMPLATE: &str = "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent";

pub struct GeminiProvider {
    api_key: String,
}

impl GeminiProvider {
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into() }
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let (system, _developer) =
            instructions_hierarchy(&request.base_instructions, &request.user_instructions, &request.developer_instructions, false);
        let contents = build_contents(&request.history);
        let tools: Vec<Value> = request.tool_specs.iter().map(tool_to_gemini_schema).collect();

        let mut body = json!({ "contents": contents });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if !tools.is_empty() {
            body["tools"] = json!([{"functionDeclarations": tools}]);
        }

        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = request.temperature.filter(|&t| t > 0.0) {
            generation_config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_output_tokens.filter(|&t| t > 0) {
            generation_config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }
        body
    }
}

fn tool_to_gemini_schema(spec: &conduit_types::ToolSpec) -> Value {
    use conduit_types::ParameterSchema;
    let parameters = match &spec.parameter_schema {
        ParameterSchema::RawJsonSchema(raw) => raw.clone(),
        ParameterSchema::Flat(params) => {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for p in params {
                properties.insert(p.name.clone(), json!({"type": p.type_name.to_uppercase(), "description": p.description}));
                if p.required {
                    required.push(p.name.clone());
                }
            }
            json!({"type": "OBJECT", "properties": properties, "required": required})
        }
    };
    json!({"name": spec.name, "description": spec.description, "parameters": parameters})
}

/// Walks the flat history into Gemini's `user`/`model` content array, one
/// entry per turn: a function call's result is folded into the next `user`
/// entry as a `functionResponse` part, mirroring how Claude folds
/// `tool_result` blocks into the following user message.
fn build_contents(history: &[ConversationItem]) -> Vec<Value> {
    let mut contents = Vec::new();
    let mut model_parts: Vec<Value> = Vec::new();
    let mut pending_responses: Vec<Value> = Vec::new();

    let flush_model = |contents: &mut Vec<Value>, parts: &mut Vec<Value>| {
        if !parts.is_empty() {
            contents.push(json!({"role": "model", "parts": std::mem::take(parts)}));
        }
    };
    let flush_responses = |contents: &mut Vec<Value>, responses: &mut Vec<Value>| {
        if !responses.is_empty() {
            contents.push(json!({"role": "user", "parts": std::mem::take(responses)}));
        }
    };

    for item in history {
        match item {
            ConversationItem::UserMessage { content } => {
                flush_model(&mut contents, &mut model_parts);
                flush_responses(&mut contents, &mut pending_responses);
                contents.push(json!({"role": "user", "parts": [{"text": content}]}));
            }
            ConversationItem::AssistantMessage { content } => {
                flush_responses(&mut contents, &mut pending_responses);
                model_parts.push(json!({"text": content}));
            }
            ConversationItem::FunctionCall { call_id, tool_name, arguments_json } => {
                flush_responses(&mut contents, &mut pending_responses);
                let args: Value = serde_json::from_str(arguments_json).unwrap_or(Value::Object(serde_json::Map::new()));
                model_parts.push(json!({"functionCall": {"name": tool_name, "args": args, "id": call_id.as_str()}}));
            }
            ConversationItem::FunctionCallOutput { call_id, content, .. } => {
                flush_model(&mut contents, &mut model_parts);
                pending_responses.push(json!({
                    "functionResponse": {"name": call_id.as_str(), "response": {"content": content}}
                }));
            }
            ConversationItem::WebSearchCall { .. } | ConversationItem::Compaction { .. } => {}
            _ if item.is_internal_marker() => {}
            _ => {}
        }
    }
    flush_model(&mut contents, &mut model_parts);
    flush_responses(&mut contents, &mut pending_responses);
    contents
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    #[serde(rename = "usageMetadata")]
    usage_metadata: UsageMetadata,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
    #[serde(default)]
    #[serde(rename = "finishReason")]
    finish_reason: String,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CandidatePart {
    Text { text: String },
    FunctionCall { #[serde(rename = "functionCall")] function_call: FunctionCallPart },
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Default, Deserialize)]
struct UsageMetadata {
    #[serde(default)]
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: u32,
    #[serde(default)]
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: u32,
}

fn finish_reason_from(raw: &str, has_function_calls: bool) -> FinishReason {
    if has_function_calls {
        return FinishReason::ToolCalls;
    }
    if raw == "MAX_TOKENS" {
        return FinishReason::Length;
    }
    FinishReason::Stop
}

fn response_to_llm_response(response: GenerateContentResponse) -> Result<LlmResponse, ProviderError> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(ProviderError::Decode("no candidates in response".to_string()));
    };

    let has_function_calls = candidate.content.parts.iter().any(|p| matches!(p, CandidatePart::FunctionCall { .. }));
    let finish_reason = finish_reason_from(&candidate.finish_reason, has_function_calls);

    let mut items = Vec::new();
    let mut call_index = 0u32;
    for part in candidate.content.parts {
        match part {
            CandidatePart::Text { text } => {
                if !text.is_empty() {
                    items.push(ConversationItem::AssistantMessage { content: text });
                }
            }
            CandidatePart::FunctionCall { function_call } => {
                // Gemini doesn't assign call ids; synthesize one so the
                // `functionResponse.name` round-trip in `build_contents`
                // has something stable to key on.
                let call_id = CallId::new(format!("{}-{call_index}", function_call.name)).map_err(|e| ProviderError::Decode(e.to_string()))?;
                call_index += 1;
                let arguments_json = serde_json::to_string(&function_call.args).unwrap_or_else(|_| "{}".to_string());
                items.push(ConversationItem::FunctionCall { call_id, tool_name: function_call.name, arguments_json });
            }
            CandidatePart::Other(_) => {}
        }
    }

    Ok(LlmResponse {
        items,
        finish_reason,
        token_usage: TokenUsage {
            input_tokens: response.usage_metadata.prompt_token_count,
            output_tokens: response.usage_metadata.candidates_token_count,
        },
        response_id: None,
    })
}

impl LlmProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn complete<'a>(&'a self, request: &'a LlmRequest) -> CompleteFut<'a> {
        Box::pin(async move {
            let body = self.build_body(request);
            let url = API_URL_TEMPLATE.replace("{model}", &request.model);
            let config = RetryConfig::default();
            let outcome = send_with_retry(|| http_client().post(&url).header("x-goog-api-key", &self.api_key).json(&body), None, &config).await;

            match outcome {
                RetryOutcome::Success(response) => {
                    let bytes = response.bytes().await.map_err(|e| ProviderError::Transport(e.to_string()))?;
                    let decoded: GenerateContentResponse = serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode(e.to_string()))?;
                    response_to_llm_response(decoded)
                }
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
    fn build_contents_folds_function_call_output_into_next_user_turn() {
        let history = vec![
            ConversationItem::UserMessage { content: "hi".to_string() },
            ConversationItem::AssistantMessage { content: "calling a tool".to_string() },
            ConversationItem::FunctionCall { call_id: CallId::new("c1").unwrap(), tool_name: "shell".to_string(), arguments_json: "{}".to_string() },
            ConversationItem::FunctionCallOutput { call_id: CallId::new("c1").unwrap(), content: "ok".to_string(), success: Some(true) },
        ];
        let contents = build_contents(&history);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
        assert!(contents[2]["parts"][0]["functionResponse"].is_object());
    }

    #[test]
    fn finish_reason_prefers_tool_calls_over_max_tokens() {
        assert_eq!(finish_reason_from("MAX_TOKENS", true), FinishReason::ToolCalls);
        assert_eq!(finish_reason_from("MAX_TOKENS", false), FinishReason::Length);
        assert_eq!(finish_reason_from("STOP", false), FinishReason::Stop);
    }

    #[test]
    fn response_to_llm_response_maps_function_call_with_synthesized_id() {
        let response = GenerateContentResponse {
            candidates: vec![Candidate {
                content: CandidateContent {
                    parts: vec![CandidatePart::FunctionCall { function_call: FunctionCallPart { name: "shell".to_string(), args: json!({"command": ["echo", "hi"]}) } }],
                },
                finish_reason: "STOP".to_string(),
            }],
            usage_metadata: UsageMetadata { prompt_token_count: 12, candidates_token_count: 4 },
        };
        let llm_response = response_to_llm_response(response).unwrap();
        assert_eq!(llm_response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(llm_response.items.len(), 1);
    }

    #[test]
    fn response_with_no_candidates_is_a_decode_error() {
        let response = GenerateContentResponse { candidates: vec![], usage_metadata: UsageMetadata::default() };
        assert!(response_to_llm_response(response).is_err());
    }
}
