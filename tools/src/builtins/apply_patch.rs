//! `apply_patch` built-in: always mutating, wraps `conduit-patch` (spec
//! §4.4, §4.5).

use std::time::Duration;

use conduit_patch::{apply_patch, parse_patch};
use conduit_types::{ToolInvocation, ToolOutput};

use crate::handler::{HandleFut, ToolError, ToolHandler, ToolKind};

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub struct ApplyPatchTool;

impl ApplyPatchTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ApplyPatchTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolHandler for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Function
    }

    fn is_mutating(&self, _invocation: &ToolInvocation) -> bool {
        true
    }

    fn handle<'a>(&'a self, invocation: &'a ToolInvocation) -> HandleFut<'a> {
        Box::pin(async move {
            let timeout_ms = if invocation.heartbeat.is_zero() { DEFAULT_TIMEOUT_MS } else { invocation.heartbeat.as_millis() as u64 };

            let run = async {
                let input = invocation
                    .arguments
                    .get("input")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ToolError::new("apply_patch: missing 'input' argument"))?;

                let patch = parse_patch(input).map_err(|e| ToolError::new(format!("apply_patch: {e}")))?;
                let cwd = invocation.cwd.as_deref().map(std::path::Path::new).unwrap_or_else(|| std::path::Path::new("."));

                match apply_patch(&patch, cwd) {
                    Ok(summary) => Ok(ToolOutput::ok(summary.as_text())),
                    Err(e) => Ok(ToolOutput::failed(e.to_string())),
                }
            };

            match tokio::time::timeout(Duration::from_millis(timeout_ms), run).await {
                Ok(result) => result,
                Err(_) => Ok(ToolOutput::failed("apply_patch: timed out")),
            }
        })
    }
}
