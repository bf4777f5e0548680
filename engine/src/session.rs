//! The `Session` type: one turn ledger, one history, one tool registry,
//! one provider, one sub-agent arena (SPEC_FULL.md §4.7 expansion).

use std::collections::HashMap;
use std::sync::Arc;

use conduit_exec::ExecPolicy;
use conduit_providers::{LlmProvider, WebSearchMode};
use conduit_tools::{SpecRegistry, ToolRegistry};
use conduit_types::{AgentId, ApprovalMode, ConversationItem, TurnLedger};

use crate::approval::HumanInTheLoop;
use crate::intercepted::PlanStep;
use crate::mcp::McpBridge;
use crate::subagent::AgentHandle;

/// Model/provider configuration a session was constructed with. Kept
/// separate from the rest of `Session` so a sub-agent can share it by
/// `Arc` without sharing mutable history/ledger state.
#[derive(Clone)]
pub struct SessionConfig {
    pub model: String,
    pub base_instructions: String,
    pub developer_instructions: String,
    pub user_instructions: String,
    pub web_search_mode: WebSearchMode,
    pub approval_mode: ApprovalMode,
    pub cwd: Option<String>,
    pub enabled_tools: Vec<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub reasoning_effort: Option<String>,
}

/// Everything a turn of the orchestrator reads or mutates. A sub-agent is
/// just another `Session` with its own history/ledger/agents map, sharing
/// the `Arc`-wrapped collaborators (`provider`, `tools`, `policy`,
/// `approval`, `mcp`) of whichever session spawned it (spec §4.7.4).
pub struct Session {
    pub config: SessionConfig,
    pub history: Vec<ConversationItem>,
    pub turn_ledger: TurnLedger,
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
    pub specs: Arc<SpecRegistry>,
    pub policy: Arc<ExecPolicy>,
    pub approval: Arc<dyn HumanInTheLoop>,
    pub mcp: Arc<dyn McpBridge>,
    pub agents: HashMap<AgentId, AgentHandle>,
    pub plan: Vec<PlanStep>,
}

impl Session {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        specs: Arc<SpecRegistry>,
        policy: Arc<ExecPolicy>,
        approval: Arc<dyn HumanInTheLoop>,
        mcp: Arc<dyn McpBridge>,
    ) -> Self {
        Self {
            config,
            history: Vec::new(),
            turn_ledger: TurnLedger::default(),
            provider,
            tools,
            specs,
            policy,
            approval,
            mcp,
            agents: HashMap::new(),
            plan: Vec::new(),
        }
    }

    /// A sub-agent session sharing this session's collaborators but
    /// starting from empty history, optionally overriding the tool set
    /// (spec §4.7.4's "inheriting or overriding the agent type").
    #[must_use]
    pub fn spawn_child(&self, enabled_tools: Option<Vec<String>>) -> Self {
        let mut config = self.config.clone();
        if let Some(enabled_tools) = enabled_tools {
            config.enabled_tools = enabled_tools;
        }
        Self::new(
            config,
            self.provider.clone(),
            self.tools.clone(),
            self.specs.clone(),
            self.policy.clone(),
            self.approval.clone(),
            self.mcp.clone(),
        )
    }
}
