//! `shell` built-in: runs an argv via `tokio::process::Command`, honoring
//! `default_timeout_ms` (spec §4.5 expansion).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use conduit_exec::{CommandBlacklist, is_known_safe};
use conduit_types::{ToolInvocation, ToolOutput};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::handler::{HandleFut, ToolError, ToolHandler, ToolKind};

const DEFAULT_TIMEOUT_MS: u64 = 45_000;
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

pub struct ShellTool {
    blacklist: CommandBlacklist,
}

impl ShellTool {
    #[must_use]
    pub fn new() -> Self {
        Self { blacklist: CommandBlacklist::with_defaults() }
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

fn argv_of(invocation: &ToolInvocation) -> Result<Vec<String>, ToolError> {
    let raw = invocation
        .arguments
        .get("command")
        .ok_or_else(|| ToolError::new("shell: missing 'command' argument"))?;
    let items = raw.as_array().ok_or_else(|| ToolError::new("shell: 'command' must be an array of strings"))?;
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| ToolError::new("shell: 'command' entries must be strings")))
        .collect()
}

impl ToolHandler for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Function
    }

    /// Not mutating only when the full argv (recursively, through any
    /// `-lc` script) is known-safe. An unparseable `-lc` script is
    /// conservatively treated as mutating (Open Question 2, resolved in
    /// SPEC_FULL.md: `is_known_safe` already returns `false` for it).
    fn is_mutating(&self, invocation: &ToolInvocation) -> bool {
        match argv_of(invocation) {
            Ok(argv) => !is_known_safe(&argv),
            Err(_) => true,
        }
    }

    fn handle<'a>(&'a self, invocation: &'a ToolInvocation) -> HandleFut<'a> {
        Box::pin(async move {
            let argv = argv_of(invocation)?;
            let Some((program, args)) = argv.split_first() else {
                return Err(ToolError::new("shell: empty command"));
            };

            // Orthogonal to approval: runs unconditionally, including under
            // `never`/full-auto approval mode, where nothing else would stop
            // a destructive argv from dispatching.
            if let Err(violation) = self.blacklist.validate(&argv.join(" ")) {
                return Ok(ToolOutput::failed(violation.to_string()));
            }

            let mut command = Command::new(program);
            command.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
            if let Some(cwd) = invocation.cwd.as_deref() {
                command.current_dir(Path::new(cwd));
            }

            let timeout_ms = if invocation.heartbeat.is_zero() { DEFAULT_TIMEOUT_MS } else { invocation.heartbeat.as_millis() as u64 };
            let mut child = command.spawn().map_err(|e| ToolError::new(format!("shell: failed to spawn: {e}")))?;

            let mut stdout = child.stdout.take().expect("piped stdout");
            let mut stderr = child.stderr.take().expect("piped stderr");

            let run = async {
                let mut out = Vec::new();
                let mut err = Vec::new();
                let _ = stdout.read_to_end(&mut out).await;
                let _ = stderr.read_to_end(&mut err).await;
                let status = child.wait().await;
                (out, err, status)
            };

            let timeout = Duration::from_millis(timeout_ms.max(DEFAULT_TIMEOUT_MS).min(DEFAULT_TIMEOUT_MS * 4));
            let (out, err, status) = match tokio::time::timeout(timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.start_kill();
                    return Ok(ToolOutput::failed("shell: command timed out"));
                }
            };

            let status = status.map_err(|e| ToolError::new(format!("shell: wait failed: {e}")))?;
            let mut content = String::from_utf8_lossy(&out).into_owned();
            let stderr_text = String::from_utf8_lossy(&err);
            if !stderr_text.is_empty() {
                content.push_str(&stderr_text);
            }
            content.truncate(MAX_OUTPUT_BYTES);

            Ok(ToolOutput { content, success: Some(status.success()) })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use conduit_types::CallId;
    use serde_json::json;

    fn invocation(command: &[&str]) -> ToolInvocation {
        let mut arguments = HashMap::new();
        arguments.insert("command".to_string(), json!(command));
        ToolInvocation {
            call_id: CallId::new("1").unwrap(),
            tool_name: "shell".to_string(),
            arguments,
            cwd: None,
            sandbox_policy: None,
            env_policy: None,
            session_id: None,
            mcp_ref: None,
            heartbeat: Duration::from_secs(5),
        }
    }

    #[test]
    fn is_mutating_reflects_safety_classifier() {
        let tool = ShellTool::new();
        assert!(!tool.is_mutating(&invocation(&["ls", "-la"])));
        assert!(tool.is_mutating(&invocation(&["rm", "-rf", "/tmp/x"])));
        assert!(tool.is_mutating(&invocation(&["bash", "-lc", "echo $HOME"])));
    }

    #[tokio::test]
    async fn runs_and_captures_stdout() {
        let tool = ShellTool::new();
        let output = tool.handle(&invocation(&["echo", "hello"])).await.unwrap();
        assert_eq!(output.success, Some(true));
        assert!(output.content.contains("hello"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_success_false_not_a_tool_error() {
        let tool = ShellTool::new();
        let output = tool.handle(&invocation(&["false"])).await.unwrap();
        assert_eq!(output.success, Some(false));
    }

    #[tokio::test]
    async fn blacklisted_command_is_rejected_before_it_ever_spawns() {
        let tool = ShellTool::new();
        let output = tool.handle(&invocation(&["rm", "-rf", "/"])).await.unwrap();
        assert_eq!(output.success, Some(false));
        assert!(output.content.contains("root filesystem"));
    }
}
