//! The durable turn orchestrator (spec §4.7.1-§4.7.4): the deterministic
//! driver that alternates LLM calls and tool dispatch over one `Session`.
//!
//! `run_turn` is the single public entry point. Everything else in this
//! module is plumbing for the four suspension points the loop can stop at
//! (an LLM request boundary, a tool-dispatch boundary, an approval/
//! escalation wait, a sub-agent `wait`) without ever taking an illegal
//! `Phase` transition — every `set_phase` call below corresponds to one
//! arm of `Phase::can_transition_to`.
//!
//! `escalation_pending` is reserved for sandbox-denied retries; nothing in
//! this crate's `ToolOutput` carries a sandbox-denial signal distinct from
//! an ordinary failure, so this orchestrator never transitions into it.
//! `ApprovalKind::Escalation` exists on the approval request type but is
//! never constructed here; see DESIGN.md's Open Question decisions for why
//! every policy or safety hit, `Forbidden` rules included, is routed
//! through `approval_pending` instead.

use std::collections::HashMap;
use std::time::Duration;

use conduit_exec::ExecPolicy;
use conduit_providers::{LlmProvider, LlmRequest, LlmResponse, ProviderError};
use conduit_providers::retry::{RetryConfig, calculate_retry_delay};
use conduit_types::{CallId, ConversationItem, ErrorKind, Phase, ToolInvocation, ToolOutput, TurnId};
use serde_json::Value;

use crate::approval::{self, ApprovalKind, ApprovalRequest};
use crate::cancel::CancelToken;
use crate::compaction;
use crate::error::EngineError;
use crate::intercepted;
use crate::session::Session;

fn set_phase(session: &mut Session, next: Phase) {
    let current = session.turn_ledger.phase.0;
    debug_assert!(current.can_transition_to(next), "illegal phase transition {current:?} -> {next:?}");
    session.turn_ledger.phase = conduit_types::PhaseOrIdle(next);
}

fn cancelled_output() -> ToolOutput {
    ToolOutput::failed("cancelled")
}

fn parse_arguments(arguments_json: &str) -> serde_json::Map<String, Value> {
    serde_json::from_str::<Value>(arguments_json).ok().and_then(|v| v.as_object().cloned()).unwrap_or_default()
}

/// Default heartbeat for a tool with no registered spec (shouldn't happen
/// in practice, since only enabled, spec-registered tools reach dispatch).
const FALLBACK_HEARTBEAT_MS: u64 = 5_000;

fn to_invocation(
    session: &Session,
    call_id: CallId,
    tool_name: String,
    arguments: serde_json::Map<String, Value>,
    cwd: Option<String>,
) -> ToolInvocation {
    let heartbeat_ms = session.specs.get(&tool_name).map(|spec| spec.default_timeout_ms).unwrap_or(FALLBACK_HEARTBEAT_MS);
    ToolInvocation {
        call_id,
        tool_name,
        arguments: arguments.into_iter().collect(),
        cwd,
        sandbox_policy: None,
        env_policy: None,
        session_id: None,
        mcp_ref: None,
        heartbeat: Duration::from_millis(heartbeat_ms),
    }
}

fn build_request(session: &Session, previous_response_id: Option<String>) -> LlmRequest {
    let history: Vec<ConversationItem> = session.history.iter().filter(|item| !item.is_internal_marker()).cloned().collect();
    LlmRequest {
        history,
        tool_specs: session.specs.resolve(&session.config.enabled_tools),
        base_instructions: session.config.base_instructions.clone(),
        developer_instructions: session.config.developer_instructions.clone(),
        user_instructions: session.config.user_instructions.clone(),
        previous_response_id,
        web_search_mode: session.config.web_search_mode,
        model: session.config.model.clone(),
        reasoning_effort: session.config.reasoning_effort.clone(),
        temperature: session.config.temperature,
        max_output_tokens: session.config.max_output_tokens,
    }
}

fn finish_cancelled(session: &mut Session, turn_id: &TurnId) -> Result<(), EngineError> {
    set_phase(session, Phase::Done);
    session.history.push(ConversationItem::TurnComplete { turn_id: turn_id.clone() });
    session.turn_ledger.tools_in_flight.clear();
    session.turn_ledger.pending_approvals.clear();
    Err(EngineError::Cancelled)
}

fn finish_done(session: &mut Session, turn_id: &TurnId) -> Result<(), EngineError> {
    set_phase(session, Phase::Done);
    session.history.push(ConversationItem::TurnComplete { turn_id: turn_id.clone() });
    session.turn_ledger.tools_in_flight.clear();
    session.turn_ledger.pending_approvals.clear();
    Ok(())
}

/// Calls the provider, retrying transient/api-limit failures with backoff
/// and compacting once on context overflow (spec §4.6.5, §4.7.2.a, §7).
/// Returns `Ok(None)` if cancellation wins a race at any suspension point.
async fn call_llm_with_retry(session: &mut Session, previous_response_id: Option<String>, cancel: &mut CancelToken) -> Result<Option<LlmResponse>, EngineError> {
    let retry_config = RetryConfig::default();
    let mut attempt = 0u32;
    let mut compacted_once = false;

    loop {
        let request = build_request(session, previous_response_id.clone());
        let completion = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(None),
            result = session.provider.complete(&request) => result,
        };

        let err: ProviderError = match completion {
            Ok(response) => return Ok(Some(response)),
            Err(err) => err,
        };

        match err.kind() {
            ErrorKind::ContextOverflow => {
                if compacted_once {
                    return Err(EngineError::CompactionExhausted);
                }
                compacted_once = true;
                let compacted = compaction::compact(session.provider.as_ref(), &session.history, &session.config.model)
                    .await
                    .map_err(|e| EngineError::from_provider_fatal(&e))?;
                session.history = compacted;
                attempt = 0;
            }
            ErrorKind::Transient | ErrorKind::ApiLimit => {
                if attempt >= retry_config.max_retries {
                    return Err(EngineError::from_provider_fatal(&err));
                }
                let delay = calculate_retry_delay(attempt, &retry_config, None);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Ok(None),
                    () = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            ErrorKind::Fatal | ErrorKind::Validation | ErrorKind::ToolError => {
                return Err(EngineError::from_provider_fatal(&err));
            }
        }
    }
}

/// Runs one user turn to completion: appends `user_message`, alternates
/// LLM calls and tool dispatch until the model stops requesting tools, and
/// appends the matching `turn_started`/`turn_complete` pair (spec §4.7.1).
///
/// # Errors
/// Returns [`EngineError::Cancelled`] if `cancel` fires at any suspension
/// point, [`EngineError::CompactionExhausted`] if context overflows twice
/// in a row even after compaction, or a wrapped fatal provider/policy
/// error otherwise. A denied approval or a failed tool call is not an
/// error here: it is recorded in history as a `function_call_output` and
/// the loop continues.
pub async fn run_turn(session: &mut Session, user_message: String, mut cancel: CancelToken) -> Result<(), EngineError> {
    let turn_id = TurnId::new(uuid::Uuid::new_v4().to_string()).expect("uuid is never empty");
    session.history.push(ConversationItem::UserMessage { content: user_message });
    session.history.push(ConversationItem::TurnStarted { turn_id: turn_id.clone() });
    session.turn_ledger.turn_id = Some(turn_id.clone());

    let mut previous_response_id: Option<String> = None;

    loop {
        set_phase(session, Phase::LlmCalling);
        if cancel.is_cancelled() {
            return finish_cancelled(session, &turn_id);
        }

        let response = match call_llm_with_retry(session, previous_response_id.clone(), &mut cancel).await {
            Ok(Some(response)) => response,
            Ok(None) => return finish_cancelled(session, &turn_id),
            Err(err) => {
                set_phase(session, Phase::Done);
                session.history.push(ConversationItem::TurnComplete { turn_id: turn_id.clone() });
                return Err(err);
            }
        };

        previous_response_id = response.response_id.clone();
        session.history.extend(response.items.iter().cloned());

        let calls: Vec<(CallId, String, String)> = response
            .items
            .iter()
            .filter_map(|item| item.as_function_call().map(|(id, name, args)| (id.clone(), name.to_string(), args.to_string())))
            .collect();

        if calls.is_empty() {
            return finish_done(session, &turn_id);
        }

        set_phase(session, Phase::ToolExecuting);

        let mut normal_calls = Vec::new();
        for (call_id, tool_name, arguments_json) in calls {
            if conduit_tools::is_intercepted(&tool_name) {
                let is_user_input = tool_name == "request_user_input";
                if is_user_input {
                    set_phase(session, Phase::ApprovalPending);
                }

                let outcome = {
                    let dispatch_fut = intercepted::dispatch(session, &call_id, &tool_name, &arguments_json);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        output = dispatch_fut => Some(output),
                    }
                };

                match outcome {
                    Some(output) => {
                        if is_user_input {
                            set_phase(session, Phase::ToolExecuting);
                        }
                        session.history.push(ConversationItem::FunctionCallOutput { call_id, content: output.content, success: output.success });
                    }
                    None if is_user_input => return finish_cancelled(session, &turn_id),
                    None => {
                        session.history.push(ConversationItem::FunctionCallOutput { call_id, content: cancelled_output().content, success: Some(false) });
                        set_phase(session, Phase::LlmCalling);
                        break;
                    }
                }
            } else {
                normal_calls.push((call_id, tool_name, arguments_json));
            }
        }

        if cancel.is_cancelled() {
            return finish_cancelled(session, &turn_id);
        }

        let mut to_dispatch = Vec::new();
        for (call_id, tool_name, arguments_json) in normal_calls {
            let arguments = parse_arguments(&arguments_json);
            let handler = session.tools.get(&tool_name);
            let probe = to_invocation(session, call_id.clone(), tool_name.clone(), arguments.clone(), session.config.cwd.clone());
            let is_mutating = handler.as_ref().is_none_or(|h| h.is_mutating(&probe));

            let requirement = approval::classify(&tool_name, &arguments, is_mutating, &session.policy, session.config.approval_mode);

            if !requirement.requires_approval {
                to_dispatch.push((call_id, tool_name, arguments));
                continue;
            }

            set_phase(session, Phase::ApprovalPending);
            session.turn_ledger.pending_approvals.push(call_id.clone());
            let request = ApprovalRequest {
                call_id: call_id.clone(),
                tool_name: tool_name.clone(),
                description: requirement.description,
                justification: requirement.justification,
                kind: ApprovalKind::Policy,
            };

            let decision = {
                let approval_fut = session.approval.request_approval(&request);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    granted = approval_fut => Some(granted),
                }
            };

            session.turn_ledger.pending_approvals.retain(|id| id != &call_id);

            match decision {
                None => return finish_cancelled(session, &turn_id),
                Some(true) => {
                    set_phase(session, Phase::ToolExecuting);
                    to_dispatch.push((call_id, tool_name, arguments));
                }
                Some(false) => {
                    set_phase(session, Phase::ToolExecuting);
                    session.history.push(ConversationItem::FunctionCallOutput {
                        call_id,
                        content: "denied by user".to_string(),
                        success: Some(false),
                    });
                }
            }
        }

        if to_dispatch.is_empty() {
            continue;
        }

        let invocations: Vec<ToolInvocation> = to_dispatch
            .iter()
            .cloned()
            .map(|(call_id, tool_name, arguments)| to_invocation(session, call_id, tool_name, arguments, session.config.cwd.clone()))
            .collect();
        session.turn_ledger.tools_in_flight = invocations.iter().map(|inv| inv.call_id.clone()).collect();

        let dispatch_fut = conduit_tools::dispatch_batch(&session.tools, &invocations);
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            results = dispatch_fut => Some(results),
        };

        session.turn_ledger.tools_in_flight.clear();

        match outcome {
            Some(results) => {
                let mut by_id: HashMap<CallId, ToolOutput> = results.into_iter().collect();
                for (call_id, _, _) in &to_dispatch {
                    if let Some(output) = by_id.remove(call_id) {
                        session.history.push(ConversationItem::FunctionCallOutput { call_id: call_id.clone(), content: output.content, success: output.success });
                    }
                }
            }
            None => {
                for (call_id, _, _) in &to_dispatch {
                    let output = cancelled_output();
                    session.history.push(ConversationItem::FunctionCallOutput { call_id: call_id.clone(), content: output.content, success: output.success });
                }
                set_phase(session, Phase::LlmCalling);
                continue;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{AutoApprove, AutoDeny};
    use crate::cancel::cancel_pair;
    use crate::mcp::NullMcpBridge;
    use crate::session::SessionConfig;
    use conduit_providers::{FinishReason, MockProvider, TokenUsage, WebSearchMode};
    use conduit_tools::{SpecRegistry, ToolRegistry};
    use std::sync::Arc;

    fn test_session(provider: MockProvider, approval: Arc<dyn crate::approval::HumanInTheLoop>, approval_mode: conduit_types::ApprovalMode) -> Session {
        let mut tools = ToolRegistry::new();
        conduit_tools::builtins::register_all(&mut tools);
        let mut specs = SpecRegistry::new();
        conduit_tools::specs::register_all(&mut specs);

        let config = SessionConfig {
            model: "mock-model".to_string(),
            base_instructions: String::new(),
            developer_instructions: String::new(),
            user_instructions: String::new(),
            web_search_mode: WebSearchMode::Off,
            approval_mode,
            cwd: None,
            enabled_tools: vec!["shell".to_string()],
            temperature: None,
            max_output_tokens: None,
            reasoning_effort: None,
        };
        Session::new(config, Arc::new(provider), Arc::new(tools), Arc::new(specs), Arc::new(ExecPolicy::empty()), approval, Arc::new(NullMcpBridge))
    }

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            items: vec![ConversationItem::AssistantMessage { content: text.to_string() }],
            finish_reason: FinishReason::Stop,
            token_usage: TokenUsage::default(),
            response_id: None,
        }
    }

    fn shell_call_response(call_id: &str, argv: &[&str]) -> LlmResponse {
        LlmResponse {
            items: vec![ConversationItem::FunctionCall {
                call_id: CallId::new(call_id).unwrap(),
                tool_name: "shell".to_string(),
                arguments_json: serde_json::json!({ "command": argv }).to_string(),
            }],
            finish_reason: FinishReason::ToolCalls,
            token_usage: TokenUsage::default(),
            response_id: None,
        }
    }

    #[tokio::test]
    async fn turn_with_no_tool_calls_completes_and_pairs_turn_markers() {
        let provider = MockProvider::new(vec![text_response("hello")]);
        let mut session = test_session(provider, Arc::new(AutoApprove), conduit_types::ApprovalMode::Never);
        let (_handle, cancel) = cancel_pair();

        run_turn(&mut session, "hi".to_string(), cancel).await.unwrap();

        assert!(matches!(session.turn_ledger.phase.0, Phase::Done));
        conduit_types::check_history_invariants(&session.history).unwrap();
        assert!(session.history.iter().any(|item| matches!(item, ConversationItem::AssistantMessage { content } if content == "hello")));
    }

    #[tokio::test]
    async fn never_mode_runs_shell_call_without_approval_and_records_output() {
        let provider = MockProvider::new(vec![shell_call_response("1", &["echo", "hi"]), text_response("done")]);
        let mut session = test_session(provider, Arc::new(AutoApprove), conduit_types::ApprovalMode::Never);
        let (_handle, cancel) = cancel_pair();

        run_turn(&mut session, "run echo".to_string(), cancel).await.unwrap();

        let output = session.history.iter().find_map(|item| match item {
            ConversationItem::FunctionCallOutput { call_id, content, .. } if call_id.as_str() == "1" => Some(content.clone()),
            _ => None,
        });
        assert!(output.is_some());
        conduit_types::check_history_invariants(&session.history).unwrap();
    }

    #[tokio::test]
    async fn denied_approval_records_failed_output_and_continues_turn() {
        let provider = MockProvider::new(vec![shell_call_response("1", &["rm", "-rf", "/tmp/x"]), text_response("acknowledged")]);
        let mut session = test_session(provider, Arc::new(AutoDeny), conduit_types::ApprovalMode::Prompt);
        let (_handle, cancel) = cancel_pair();

        run_turn(&mut session, "delete it".to_string(), cancel).await.unwrap();

        let output = session.history.iter().find_map(|item| match item {
            ConversationItem::FunctionCallOutput { call_id, content, success } if call_id.as_str() == "1" => Some((content.clone(), *success)),
            _ => None,
        });
        assert_eq!(output, Some(("denied by user".to_string(), Some(false))));
        assert!(session.history.iter().any(|item| matches!(item, ConversationItem::AssistantMessage { content } if content == "acknowledged")));
    }

    #[tokio::test]
    async fn blacklisted_shell_command_is_rejected_even_in_never_approval_mode() {
        let provider = MockProvider::new(vec![shell_call_response("1", &["rm", "-rf", "/"]), text_response("acknowledged")]);
        let mut session = test_session(provider, Arc::new(AutoApprove), conduit_types::ApprovalMode::Never);
        let (_handle, cancel) = cancel_pair();

        run_turn(&mut session, "wipe it".to_string(), cancel).await.unwrap();

        let output = session.history.iter().find_map(|item| match item {
            ConversationItem::FunctionCallOutput { call_id, content, success } if call_id.as_str() == "1" => Some((content.clone(), *success)),
            _ => None,
        });
        let (content, success) = output.expect("shell call should have produced an output");
        assert_eq!(success, Some(false));
        assert!(content.contains("root filesystem"), "blacklist reason missing from output: {content}");
        conduit_types::check_history_invariants(&session.history).unwrap();
    }

    #[tokio::test]
    async fn cancellation_before_first_llm_call_returns_cancelled_with_legal_phase() {
        let provider = MockProvider::new(vec![text_response("unused")]);
        let mut session = test_session(provider, Arc::new(AutoApprove), conduit_types::ApprovalMode::Never);
        let (handle, cancel) = cancel_pair();
        handle.cancel();

        let result = run_turn(&mut session, "hi".to_string(), cancel).await;

        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert!(matches!(session.turn_ledger.phase.0, Phase::Done));
        conduit_types::check_history_invariants(&session.history).unwrap();
    }
}
