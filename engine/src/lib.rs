//! Turn orchestrator, MCP bridge interface, and sub-agent arena.
//!
//! This crate is the deterministic core (spec §4.7): everything that
//! decides what happens next from history, tool output, and approval
//! decisions alone, with every side effect (the provider call, the tool
//! handler, the human prompt) pushed behind a trait a host implements.

mod approval;
mod cancel;
mod compaction;
mod error;
mod intercepted;
mod mcp;
mod orchestrator;
mod session;
mod specs;
mod subagent;

pub use approval::{
    ApprovalFut, ApprovalKind, ApprovalRequest, AnswersFut, AutoApprove, AutoDeny, ChannelApprovalSink,
    ApprovalReceiver, HumanInTheLoop, Question, QuestionReceiver, Requirement, approval_mode_fallback, classify,
};
pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use compaction::{COMPACTION_PROMPT, compact};
pub use error::EngineError;
pub use intercepted::{PlanStep, PlanStepStatus};
pub use mcp::{McpBridge, McpCleanupFut, McpInitFut, McpInitResult, McpServerConfig, NullMcpBridge};
pub use orchestrator::run_turn;
pub use session::{Session, SessionConfig};
pub use specs::register_agent_specs;
pub use subagent::{
    AgentControlError, AgentHandle, AgentStatus, AgentType, close_agent, resume_agent, send_input, spawn_agent, wait,
};
