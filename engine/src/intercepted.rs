//! Intercepted tool dispatch (spec §4.5, §4.7.2.d, §4.7.3, §4.7.4): the
//! seven function calls the orchestrator answers itself instead of routing
//! through `conduit_tools::ToolRegistry`.

use std::collections::HashMap;

use conduit_types::{AgentId, CallId, ToolOutput};
use serde::{Deserialize, Serialize};

use crate::approval::Question;
use crate::session::Session;
use crate::subagent::{self, AgentStatus, AgentType};

/// One line of the plan shown to the user, as set by `update_plan`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: PlanStepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Deserialize)]
struct SpawnAgentArgs {
    agent_type: String,
    task: String,
    #[serde(default)]
    enabled_tools: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct SendInputArgs {
    agent_id: String,
    message: String,
    #[serde(default)]
    interrupt: bool,
}

#[derive(Deserialize)]
struct WaitArgs {
    agent_ids: Vec<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Deserialize)]
struct AgentIdArgs {
    agent_id: String,
}

#[derive(Deserialize)]
struct UpdatePlanArgs {
    steps: Vec<PlanStep>,
}

#[derive(Deserialize)]
struct RequestUserInputArgs {
    questions: Vec<Question>,
}

fn bad_arguments(err: impl std::fmt::Display) -> ToolOutput {
    ToolOutput::failed(format!("invalid arguments: {err}"))
}

fn parse_agent_id(raw: &str) -> Result<AgentId, ToolOutput> {
    AgentId::new(raw).map_err(bad_arguments)
}

/// Runs one intercepted call and returns the synthetic
/// `function_call_output` (spec §4.7.2.d: "dispatch to the in-orchestrator
/// interpreter, append the synthetic function_call_output").
pub async fn dispatch(session: &mut Session, call_id: &CallId, tool_name: &str, arguments_json: &str) -> ToolOutput {
    match tool_name {
        "spawn_agent" => spawn_agent(session, arguments_json),
        "send_input" => send_input(session, arguments_json),
        "wait" => wait(session, arguments_json).await,
        "close_agent" => close_agent(session, arguments_json),
        "resume_agent" => resume_agent(session, arguments_json),
        "update_plan" => update_plan(session, arguments_json),
        "request_user_input" => request_user_input(session, call_id, arguments_json).await,
        other => ToolOutput::failed(format!("unknown intercepted tool: {other}")),
    }
}

fn spawn_agent(session: &mut Session, arguments_json: &str) -> ToolOutput {
    let args: SpawnAgentArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let agent_id = subagent::spawn_agent(session, AgentType::parse(&args.agent_type), args.task, args.enabled_tools);
    ToolOutput::ok(serde_json::json!({ "agent_id": agent_id.as_str() }).to_string())
}

fn send_input(session: &Session, arguments_json: &str) -> ToolOutput {
    let args: SendInputArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let agent_id = match parse_agent_id(&args.agent_id) {
        Ok(id) => id,
        Err(output) => return output,
    };
    match subagent::send_input(session, &agent_id, args.message, args.interrupt) {
        Ok(()) => ToolOutput::ok("message queued"),
        Err(err) => ToolOutput::failed(err.to_string()),
    }
}

async fn wait(session: &Session, arguments_json: &str) -> ToolOutput {
    let args: WaitArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let mut agent_ids = Vec::with_capacity(args.agent_ids.len());
    for raw in &args.agent_ids {
        match parse_agent_id(raw) {
            Ok(id) => agent_ids.push(id),
            Err(output) => return output,
        }
    }
    let timeout_ms = args.timeout_ms.unwrap_or(30_000);
    let statuses = subagent::wait(session, &agent_ids, timeout_ms).await;
    let serializable: HashMap<String, AgentStatus> =
        statuses.into_iter().map(|(id, status)| (id.as_str().to_string(), status)).collect();
    ToolOutput::informational(serde_json::to_string(&serializable).unwrap_or_else(|_| "{}".to_string()))
}

fn close_agent(session: &mut Session, arguments_json: &str) -> ToolOutput {
    let args: AgentIdArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let agent_id = match parse_agent_id(&args.agent_id) {
        Ok(id) => id,
        Err(output) => return output,
    };
    match subagent::close_agent(session, &agent_id) {
        Ok(status) => ToolOutput::informational(serde_json::to_string(&status).unwrap_or_else(|_| "null".to_string())),
        Err(err) => ToolOutput::failed(err.to_string()),
    }
}

fn resume_agent(session: &mut Session, arguments_json: &str) -> ToolOutput {
    let args: AgentIdArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let agent_id = match parse_agent_id(&args.agent_id) {
        Ok(id) => id,
        Err(output) => return output,
    };
    match subagent::resume_agent(session, &agent_id) {
        Ok(()) => ToolOutput::ok("resumed"),
        Err(err) => ToolOutput::failed(err.to_string()),
    }
}

fn update_plan(session: &mut Session, arguments_json: &str) -> ToolOutput {
    let args: UpdatePlanArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let step_count = args.steps.len();
    session.plan = args.steps;
    ToolOutput::ok(format!("plan updated with {step_count} step(s)"))
}

async fn request_user_input(session: &Session, call_id: &CallId, arguments_json: &str) -> ToolOutput {
    let args: RequestUserInputArgs = match serde_json::from_str(arguments_json) {
        Ok(args) => args,
        Err(err) => return bad_arguments(err),
    };
    let answers = session.approval.request_user_input(call_id, &args.questions).await;
    ToolOutput::informational(serde_json::to_string(&answers).unwrap_or_else(|_| "{}".to_string()))
}
