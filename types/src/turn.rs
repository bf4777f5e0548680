//! Turn ledger types.

use serde::{Deserialize, Serialize};

use crate::ids::{CallId, TurnId};

/// The orchestrator's current phase for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    LlmCalling,
    ToolExecuting,
    ApprovalPending,
    EscalationPending,
    Done,
    Terminated,
}

impl Phase {
    /// The legal successor phases from this phase,
    /// used by tests to assert the orchestrator never takes an illegal
    /// transition.
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::{ApprovalPending, Done, EscalationPending, Idle, LlmCalling, Terminated, ToolExecuting};
        matches!(
            (self, next),
            (Idle, LlmCalling)
                | (LlmCalling, ToolExecuting)
                | (LlmCalling, ApprovalPending)
                | (LlmCalling, EscalationPending)
                | (LlmCalling, Done)
                | (ToolExecuting, LlmCalling)
                | (ApprovalPending, ToolExecuting)
                | (ApprovalPending, Done)
                | (EscalationPending, ToolExecuting)
                | (EscalationPending, Done)
                | (Done, Idle)
                | (Done, Terminated)
        )
    }
}

/// Per-turn bookkeeping: which calls are in flight and which approvals are
/// still pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnLedger {
    pub turn_id: Option<TurnId>,
    pub phase: PhaseOrIdle,
    pub tools_in_flight: Vec<CallId>,
    pub pending_approvals: Vec<CallId>,
}

/// `Phase` without a meaningful default; wraps `Phase::Idle` for
/// `#[derive(Default)]` on `TurnLedger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseOrIdle(pub Phase);

impl Default for PhaseOrIdle {
    fn default() -> Self {
        Self(Phase::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_to_llm_calling_is_legal() {
        assert!(Phase::Idle.can_transition_to(Phase::LlmCalling));
    }

    #[test]
    fn idle_to_tool_executing_is_illegal() {
        assert!(!Phase::Idle.can_transition_to(Phase::ToolExecuting));
    }

    #[test]
    fn approval_pending_can_deny_to_done() {
        assert!(Phase::ApprovalPending.can_transition_to(Phase::Done));
    }

    #[test]
    fn done_can_restart_or_terminate() {
        assert!(Phase::Done.can_transition_to(Phase::Idle));
        assert!(Phase::Done.can_transition_to(Phase::Terminated));
        assert!(!Phase::Done.can_transition_to(Phase::LlmCalling));
    }
}
