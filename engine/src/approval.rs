//! Approval requirement classification (spec §4.7.2.d, §4.7.3) and the
//! [`HumanInTheLoop`] collaborator interface the orchestrator suspends on.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use conduit_exec::{ExecPolicy, is_known_safe, parse_shell_lc};
use conduit_types::{ApprovalMode, CallId, Decision};
use serde_json::Value;

/// One question posed by the intercepted `request_user_input` tool
/// (spec §4.7.3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Why a human decision is being requested: a policy/safety hit on an
/// ordinary tool call, or a sandbox-denied escalation. Spec §4.7.3: "the
/// same mechanism under a different phase label."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    Policy,
    Escalation,
}

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub call_id: CallId,
    pub tool_name: String,
    pub description: String,
    pub justification: Option<String>,
    pub kind: ApprovalKind,
}

pub type ApprovalFut<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
pub type AnswersFut<'a> = Pin<Box<dyn Future<Output = HashMap<String, String>> + Send + 'a>>;

/// The human-in-the-loop collaborator: approvals/escalations (§4.7.3) and
/// `request_user_input` answers. Out of scope for this crate is *how* a
/// host renders the prompt (TUI, CLI stdin, a remote RPC) — it only pins
/// the interface the deterministic core suspends on.
pub trait HumanInTheLoop: Send + Sync {
    fn request_approval<'a>(&'a self, request: &'a ApprovalRequest) -> ApprovalFut<'a>;
    fn request_user_input<'a>(&'a self, call_id: &'a CallId, questions: &'a [Question]) -> AnswersFut<'a>;
}

/// Approves every request unconditionally. Useful for `never`/`on-failure`
/// sessions and for tests that don't exercise the approval path.
pub struct AutoApprove;

impl HumanInTheLoop for AutoApprove {
    fn request_approval<'a>(&'a self, _request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        Box::pin(async { true })
    }

    fn request_user_input<'a>(&'a self, _call_id: &'a CallId, questions: &'a [Question]) -> AnswersFut<'a> {
        Box::pin(async move { questions.iter().map(|q| (q.id.clone(), String::new())).collect() })
    }
}

/// Denies every request unconditionally. Useful for fully unattended runs
/// where a prompt hit should fail closed.
pub struct AutoDeny;

impl HumanInTheLoop for AutoDeny {
    fn request_approval<'a>(&'a self, _request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        Box::pin(async { false })
    }

    fn request_user_input<'a>(&'a self, _call_id: &'a CallId, questions: &'a [Question]) -> AnswersFut<'a> {
        Box::pin(async move { questions.iter().map(|q| (q.id.clone(), String::new())).collect() })
    }
}

/// Routes approval requests and user-input questions to an external
/// consumer over an mpsc channel, pairing each with a oneshot reply slot.
/// This is the shape `conduit-cli` wires to a stdin prompt; it makes no
/// assumption about what's on the other end.
pub struct ChannelApprovalSink {
    approvals: tokio::sync::mpsc::UnboundedSender<(ApprovalRequest, tokio::sync::oneshot::Sender<bool>)>,
    #[allow(clippy::type_complexity)]
    questions: tokio::sync::mpsc::UnboundedSender<(
        CallId,
        Vec<Question>,
        tokio::sync::oneshot::Sender<HashMap<String, String>>,
    )>,
}

#[allow(clippy::type_complexity)]
pub type ApprovalReceiver =
    tokio::sync::mpsc::UnboundedReceiver<(ApprovalRequest, tokio::sync::oneshot::Sender<bool>)>;
#[allow(clippy::type_complexity)]
pub type QuestionReceiver = tokio::sync::mpsc::UnboundedReceiver<(
    CallId,
    Vec<Question>,
    tokio::sync::oneshot::Sender<HashMap<String, String>>,
)>;

impl ChannelApprovalSink {
    #[must_use]
    pub fn new() -> (Self, ApprovalReceiver, QuestionReceiver) {
        let (approvals_tx, approvals_rx) = tokio::sync::mpsc::unbounded_channel();
        let (questions_tx, questions_rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { approvals: approvals_tx, questions: questions_tx }, approvals_rx, questions_rx)
    }
}

impl HumanInTheLoop for ChannelApprovalSink {
    fn request_approval<'a>(&'a self, request: &'a ApprovalRequest) -> ApprovalFut<'a> {
        Box::pin(async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if self.approvals.send((request.clone(), tx)).is_err() {
                return false;
            }
            rx.await.unwrap_or(false)
        })
    }

    fn request_user_input<'a>(&'a self, call_id: &'a CallId, questions: &'a [Question]) -> AnswersFut<'a> {
        Box::pin(async move {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if self.questions.send((call_id.clone(), questions.to_vec(), tx)).is_err() {
                return HashMap::new();
            }
            rx.await.unwrap_or_default()
        })
    }
}

/// The approval-mode fallback heuristic consulted by [`ExecPolicy::check`]
/// when no rule matches (spec §4.7.2.d): `never`/`on-failure` allow,
/// `unless-trusted` allows known-safe commands and prompts otherwise,
/// anything else (the `prompt` default) always prompts.
#[must_use]
pub fn approval_mode_fallback(mode: ApprovalMode) -> impl Fn(&[String]) -> Decision {
    move |cmd: &[String]| match mode {
        ApprovalMode::Never | ApprovalMode::OnFailure => Decision::Allow,
        ApprovalMode::UnlessTrusted => {
            if is_known_safe(cmd) {
                Decision::Allow
            } else {
                Decision::Prompt
            }
        }
        ApprovalMode::Prompt => Decision::Prompt,
    }
}

/// The outcome of classifying one non-intercepted function call.
pub struct Requirement {
    pub requires_approval: bool,
    pub description: String,
    pub justification: Option<String>,
}

/// Extracts the `command` argv from a `shell` tool's arguments, if present
/// and well-formed.
fn shell_argv(arguments: &serde_json::Map<String, Value>) -> Option<Vec<String>> {
    let items = arguments.get("command")?.as_array()?;
    items.iter().map(|v| v.as_str().map(str::to_string)).collect()
}

/// Computes the approval requirement for one function call (spec
/// §4.7.2.d). `shell` calls go through the full safety-classifier +
/// exec-policy pipeline, including recursive `-lc` script inspection;
/// every other tool falls back to the approval-mode heuristic alone,
/// since the policy engine has no notion of a "command" to classify for
/// `apply_patch`/`read_file`/`list_dir`/MCP tools (documented in
/// DESIGN.md). A tool that isn't mutating never requires approval.
#[must_use]
pub fn classify(
    tool_name: &str,
    arguments: &serde_json::Map<String, Value>,
    is_mutating: bool,
    policy: &ExecPolicy,
    approval_mode: ApprovalMode,
) -> Requirement {
    if !is_mutating {
        return Requirement { requires_approval: false, description: tool_name.to_string(), justification: None };
    }

    let fallback = approval_mode_fallback(approval_mode);

    if tool_name == "shell" {
        if let Some(argv) = shell_argv(arguments) {
            let description = argv.join(" ");
            let sub_commands = parse_shell_lc(&argv).unwrap_or_else(|| vec![argv.clone()]);
            let evaluation = policy.check_multiple(&sub_commands, Some(&fallback));
            return Requirement {
                requires_approval: evaluation.decision != Decision::Allow,
                description,
                justification: evaluation.justification,
            };
        }
        return Requirement {
            requires_approval: fallback(&[]) != Decision::Allow,
            description: "shell (unparseable command)".to_string(),
            justification: None,
        };
    }

    Requirement {
        requires_approval: fallback(&[]) != Decision::Allow,
        description: tool_name.to_string(),
        justification: None,
    }
}
