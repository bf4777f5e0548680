//! Pure, unit-testable request-shaping logic shared by every vendor module.
//!
//! Nothing in this module performs IO; vendor modules call into it to turn
//! a [`crate::LlmRequest`] into wire-format JSON and to fold wire-format
//! output items back into [`ConversationItem`]s.

use conduit_types::ConversationItem;

/// One bundled turn of assistant output: zero or more assistant-message
/// items followed by zero or more function calls, in original order.
/// Consecutive `function_call` items that follow an `assistant_message`
/// bundle into one assistant turn; a run of function calls with no
/// preceding assistant message is an orphan (tool-calls-only) bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantBundle {
    pub assistant_text: Option<String>,
    pub tool_calls: Vec<(String, String, String)>,
}

/// Groups a history slice (as produced by one LLM turn) into assistant
/// bundles, dropping internal markers and any `function_call_output`
/// (which belongs to the *next* request's tool-result section).
#[must_use]
pub fn bundle_assistant_turns(items: &[ConversationItem]) -> Vec<AssistantBundle> {
    let mut bundles = Vec::new();
    let mut current: Option<AssistantBundle> = None;

    for item in items {
        match item {
            ConversationItem::AssistantMessage { content } => {
                if let Some(bundle) = current.take() {
                    bundles.push(bundle);
                }
                current = Some(AssistantBundle {
                    assistant_text: Some(content.clone()),
                    tool_calls: Vec::new(),
                });
            }
            ConversationItem::FunctionCall { call_id, tool_name, arguments_json } => {
                current
                    .get_or_insert_with(AssistantBundle::default)
                    .tool_calls
                    .push((call_id.as_str().to_string(), tool_name.clone(), arguments_json.clone()));
            }
            ConversationItem::FunctionCallOutput { .. } => {
                if let Some(bundle) = current.take() {
                    bundles.push(bundle);
                }
            }
            _ if item.is_internal_marker() => {}
            _ => {
                if let Some(bundle) = current.take() {
                    bundles.push(bundle);
                }
            }
        }
    }
    if let Some(bundle) = current.take() {
        bundles.push(bundle);
    }
    bundles
}

/// Builds the combined system prompt from base and user instructions, and
/// separately returns the developer block (when the provider supports a
/// dedicated developer/system slot) or `None` if it should instead be
/// concatenated by the caller with [`DEVELOPER_DELIMITER`].
#[must_use]
pub fn instructions_hierarchy(
    base_instructions: &str,
    user_instructions: &str,
    developer_instructions: &str,
    supports_developer_block: bool,
) -> (String, Option<String>) {
    let system_prompt = [base_instructions, user_instructions]
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let developer_instructions = developer_instructions.trim();
    if developer_instructions.is_empty() {
        return (system_prompt, None);
    }
    if supports_developer_block {
        (system_prompt, Some(developer_instructions.to_string()))
    } else {
        let combined = if system_prompt.is_empty() {
            developer_instructions.to_string()
        } else {
            format!("{system_prompt}{DEVELOPER_DELIMITER}{developer_instructions}")
        };
        (combined, None)
    }
}

pub const DEVELOPER_DELIMITER: &str = "\n\n---\n\n";

/// True for model IDs the reasoning-effort rule applies to: `o1*`, `o3*`,
/// `o4*`, or anything containing `codex`.
#[must_use]
pub fn is_reasoning_model(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    lower.starts_with("o1") || lower.starts_with("o3") || lower.starts_with("o4") || lower.contains("codex")
}

/// Sampling parameters to attach to a request, after applying the
/// reasoning-model rule: reasoning models omit temperature entirely and
/// attach `reasoning_effort` instead; all others attach temperature only
/// when positive and `max_output_tokens` only when positive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub reasoning_effort: Option<&'static str>,
    pub max_output_tokens: Option<u32>,
}

#[must_use]
pub fn sampling_params(
    model: &str,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
    reasoning_effort: Option<&'static str>,
) -> SamplingParams {
    let max_output_tokens = max_output_tokens.filter(|&t| t > 0);
    if is_reasoning_model(model) {
        SamplingParams { temperature: None, reasoning_effort, max_output_tokens }
    } else {
        SamplingParams {
            temperature: temperature.filter(|&t| t > 0.0),
            reasoning_effort: None,
            max_output_tokens,
        }
    }
}

/// Extracts a human-readable query/URL/pattern from a raw provider
/// web-search payload, falling back to `"web search"` when nothing usable
/// is present.
#[must_use]
pub fn web_search_summary(raw: &serde_json::Value) -> String {
    raw.get("query")
        .or_else(|| raw.get("url"))
        .or_else(|| raw.get("pattern"))
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "web search".to_string())
}

/// Rough token estimate (bytes / 4) used only to bound the compaction
/// tail; never used for billing.
fn estimate_tokens(s: &str) -> usize {
    s.len().div_ceil(4)
}

const COMPACTION_TAIL_TOKEN_BUDGET: usize = 20_000;
pub const COMPACTION_SUMMARY_PREFIX: &str = "Summary of prior conversation:\n\n";

/// Builds the local-compaction replacement history: a `Compaction` marker,
/// an assistant message carrying [`COMPACTION_SUMMARY_PREFIX`] + `summary`,
/// then as many trailing `UserMessage`/`AssistantMessage` items (walked
/// backwards, skipping compaction and turn markers) as fit in a 20,000
/// token budget.
#[must_use]
pub fn local_compaction(history: &[ConversationItem], summary: &str) -> Vec<ConversationItem> {
    let mut tail: Vec<ConversationItem> = Vec::new();
    let mut budget = COMPACTION_TAIL_TOKEN_BUDGET;

    for item in history.iter().rev() {
        let text = match item {
            ConversationItem::UserMessage { content } | ConversationItem::AssistantMessage { content } => {
                content.as_str()
            }
            ConversationItem::Compaction { .. } | ConversationItem::TurnStarted { .. } | ConversationItem::TurnComplete { .. } => {
                continue;
            }
            _ => continue,
        };
        let cost = estimate_tokens(text);
        if cost > budget {
            break;
        }
        budget -= cost;
        tail.push(item.clone());
    }
    tail.reverse();

    let mut compacted = vec![
        ConversationItem::Compaction { summary: summary.to_string() },
        ConversationItem::AssistantMessage {
            content: format!("{COMPACTION_SUMMARY_PREFIX}{summary}"),
        },
    ];
    compacted.extend(tail);
    compacted
}
