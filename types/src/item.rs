//! The conversation item sum type and its history invariants.

use serde::{Deserialize, Serialize};

use crate::ids::{CallId, TurnId};

/// One element of the insertion-ordered conversation history.
///
/// `turn_started`/`turn_complete` are internal markers: the provider adapter
/// (§4.6) must never serialize them into a provider request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    UserMessage { content: String },
    AssistantMessage { content: String },
    FunctionCall {
        call_id: CallId,
        tool_name: String,
        arguments_json: String,
    },
    FunctionCallOutput {
        call_id: CallId,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
    },
    WebSearchCall { query: String },
    /// An opaque remote-compaction blob, or a local textual summary.
    Compaction { summary: String },
    TurnStarted { turn_id: TurnId },
    TurnComplete { turn_id: TurnId },
}

impl ConversationItem {
    /// Internal markers are never sent to a provider (§4.6.1).
    #[must_use]
    pub fn is_internal_marker(&self) -> bool {
        matches!(self, Self::TurnStarted { .. } | Self::TurnComplete { .. })
    }

    #[must_use]
    pub fn as_function_call(&self) -> Option<(&CallId, &str, &str)> {
        match self {
            Self::FunctionCall { call_id, tool_name, arguments_json } => {
                Some((call_id, tool_name.as_str(), arguments_json.as_str()))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function_call_output(&self) -> Option<&CallId> {
        match self {
            Self::FunctionCallOutput { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// A violation of one of the history invariants in the relevant section
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HistoryInvariantError {
    #[error("function_call_output for {0} has no matching prior function_call")]
    UnmatchedOutput(String),
    #[error("function_call {0} has more than one function_call_output")]
    DuplicateOutput(String),
    #[error("turn_started for {0} is not paired with exactly one turn_complete")]
    UnpairedTurn(String),
}

/// Checks the three history invariants from the relevant section over a full history
/// slice. Intended for tests and for defensive checks at compaction
/// boundaries, not for the hot path of every history mutation.
pub fn check_history_invariants(history: &[ConversationItem]) -> Result<(), HistoryInvariantError> {
    use std::collections::HashSet;

    let mut seen_calls: HashSet<&str> = HashSet::new();
    let mut matched_outputs: HashSet<&str> = HashSet::new();
    let mut open_turns: Vec<&str> = Vec::new();

    for item in history {
        match item {
            ConversationItem::FunctionCall { call_id, .. } => {
                seen_calls.insert(call_id.as_str());
            }
            ConversationItem::FunctionCallOutput { call_id, .. } => {
                if !seen_calls.contains(call_id.as_str()) {
                    return Err(HistoryInvariantError::UnmatchedOutput(
                        call_id.as_str().to_string(),
                    ));
                }
                if !matched_outputs.insert(call_id.as_str()) {
                    return Err(HistoryInvariantError::DuplicateOutput(
                        call_id.as_str().to_string(),
                    ));
                }
            }
            ConversationItem::TurnStarted { turn_id } => {
                open_turns.push(turn_id.as_str());
            }
            ConversationItem::TurnComplete { turn_id } => {
                match open_turns.pop() {
                    Some(open) if open == turn_id.as_str() => {}
                    _ => {
                        return Err(HistoryInvariantError::UnpairedTurn(
                            turn_id.as_str().to_string(),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ConversationItem {
        ConversationItem::FunctionCall {
            call_id: CallId::new(id).unwrap(),
            tool_name: "shell".into(),
            arguments_json: "{}".into(),
        }
    }

    fn output(id: &str) -> ConversationItem {
        ConversationItem::FunctionCallOutput {
            call_id: CallId::new(id).unwrap(),
            content: "ok".into(),
            success: Some(true),
        }
    }

    #[test]
    fn internal_markers_are_flagged() {
        let turn = ConversationItem::TurnStarted { turn_id: TurnId::new("t1").unwrap() };
        assert!(turn.is_internal_marker());
        assert!(!call("1").is_internal_marker());
    }

    #[test]
    fn valid_history_passes() {
        let turn_id = TurnId::new("t1").unwrap();
        let history = vec![
            ConversationItem::UserMessage { content: "hi".into() },
            ConversationItem::TurnStarted { turn_id: turn_id.clone() },
            call("1"),
            output("1"),
            ConversationItem::TurnComplete { turn_id },
        ];
        assert!(check_history_invariants(&history).is_ok());
    }

    #[test]
    fn output_before_call_is_rejected() {
        let history = vec![output("1"), call("1")];
        assert_eq!(
            check_history_invariants(&history),
            Err(HistoryInvariantError::UnmatchedOutput("1".into()))
        );
    }

    #[test]
    fn duplicate_output_is_rejected() {
        let history = vec![call("1"), output("1"), output("1")];
        assert_eq!(
            check_history_invariants(&history),
            Err(HistoryInvariantError::DuplicateOutput("1".into()))
        );
    }

    #[test]
    fn unpaired_turn_is_rejected() {
        let history = vec![ConversationItem::TurnStarted { turn_id: TurnId::new("t1").unwrap() }];
        assert_eq!(
            check_history_invariants(&history),
            Err(HistoryInvariantError::UnpairedTurn("t1".into()))
        );
    }
}
