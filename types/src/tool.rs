//! Tool spec, invocation, and output types.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::CallId;

/// One parameter of a flat (non-JSON-Schema) tool parameter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamSpec>>,
}

/// A tool's parameter schema is either a flat list (built-in tools) or an
/// opaque JSON-Schema blob (MCP tools, verbatim from the server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterSchema {
    Flat(Vec<ParamSpec>),
    RawJsonSchema(Value),
}

/// Static description of a tool, registered once at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameter_schema: ParameterSchema,
    pub default_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_json_schema: Option<Value>,
}

/// A sandbox policy the invocation runs under. Enforcement itself is out of
/// scope (the relevant section Non-goals); this is the pinned interface the orchestrator
/// threads through to handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SandboxPolicy {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

/// A reference to the MCP server/tool pair a qualified tool name resolves
/// to. Subprocess lifecycle is out of scope; this is the shape
/// the registry stores once `initialize` has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpRef {
    pub server: String,
    pub tool: String,
}

/// One concrete call to a tool, produced from a `function_call` item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_policy: Option<SandboxPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_policy: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_ref: Option<McpRef>,
    #[serde(skip, default = "default_heartbeat_ms")]
    pub heartbeat: Duration,
}

fn default_heartbeat_ms() -> Duration {
    Duration::from_secs(5)
}

/// The result of running a tool. A missing `success` means "not applicable"
/// (e.g. `read_file` returns content with no pass/fail notion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl ToolOutput {
    #[must_use]
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), success: Some(true) }
    }

    #[must_use]
    pub fn failed(content: impl Into<String>) -> Self {
        Self { content: content.into(), success: Some(false) }
    }

    #[must_use]
    pub fn informational(content: impl Into<String>) -> Self {
        Self { content: content.into(), success: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_output_constructors_set_success() {
        assert_eq!(ToolOutput::ok("x").success, Some(true));
        assert_eq!(ToolOutput::failed("x").success, Some(false));
        assert_eq!(ToolOutput::informational("x").success, None);
    }

    #[test]
    fn parameter_schema_serializes_flat_list() {
        let schema = ParameterSchema::Flat(vec![ParamSpec {
            name: "path".into(),
            type_name: "string".into(),
            description: "file path".into(),
            required: true,
            items: None,
        }]);
        let json = serde_json::to_value(&schema).unwrap();
        assert!(json.is_array());
    }
}
