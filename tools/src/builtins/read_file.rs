//! `read_file` built-in: never mutating, bounded read with a byte cap
//! (spec §4.5 expansion).

use std::time::Duration;

use conduit_types::{ToolInvocation, ToolOutput};

use crate::handler::{HandleFut, ToolError, ToolHandler, ToolKind};

const MAX_READ_BYTES: usize = 256 * 1024;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

pub struct ReadFileTool;

impl ReadFileTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolHandler for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Function
    }

    fn is_mutating(&self, _invocation: &ToolInvocation) -> bool {
        false
    }

    fn handle<'a>(&'a self, invocation: &'a ToolInvocation) -> HandleFut<'a> {
        Box::pin(async move {
            let timeout_ms = if invocation.heartbeat.is_zero() { DEFAULT_TIMEOUT_MS } else { invocation.heartbeat.as_millis() as u64 };

            let run = async {
                let path = invocation
                    .arguments
                    .get("path")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ToolError::new("read_file: missing 'path' argument"))?;
                let resolved = match invocation.cwd.as_deref() {
                    Some(cwd) => std::path::Path::new(cwd).join(path),
                    None => std::path::PathBuf::from(path),
                };

                let bytes = tokio::fs::read(&resolved).await.map_err(|e| ToolError::new(format!("read_file: {path}: {e}")))?;
                let truncated = bytes.len() > MAX_READ_BYTES;
                let capped = &bytes[..bytes.len().min(MAX_READ_BYTES)];
                let mut content = String::from_utf8_lossy(capped).into_owned();
                if truncated {
                    content.push_str("\n[truncated: file exceeds read cap]");
                }
                Ok(ToolOutput::informational(content))
            };

            match tokio::time::timeout(Duration::from_millis(timeout_ms), run).await {
                Ok(result) => result,
                Err(_) => Ok(ToolOutput::failed("read_file: timed out")),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;
    use conduit_types::CallId;
    use serde_json::json;

    fn invocation(path: &str, cwd: &std::path::Path) -> ToolInvocation {
        let mut arguments = HashMap::new();
        arguments.insert("path".to_string(), json!(path));
        ToolInvocation {
            call_id: CallId::new("1").unwrap(),
            tool_name: "read_file".to_string(),
            arguments,
            cwd: Some(cwd.to_string_lossy().into_owned()),
            sandbox_policy: None,
            env_policy: None,
            session_id: None,
            mcp_ref: None,
            heartbeat: Duration::from_secs(5),
        }
    }

    #[test]
    fn never_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new();
        assert!(!tool.is_mutating(&invocation("x.txt", dir.path())));
    }

    #[tokio::test]
    async fn reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.txt"), "hello").unwrap();
        let tool = ReadFileTool::new();
        let output = tool.handle(&invocation("x.txt", dir.path())).await.unwrap();
        assert_eq!(output.content, "hello");
        assert_eq!(output.success, None);
    }

    #[tokio::test]
    async fn truncates_past_the_byte_cap() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), vec![b'a'; MAX_READ_BYTES + 10]).unwrap();
        let tool = ReadFileTool::new();
        let output = tool.handle(&invocation("big.txt", dir.path())).await.unwrap();
        assert!(output.content.contains("[truncated"));
    }

    #[tokio::test]
    async fn missing_file_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new();
        let result = tool.handle(&invocation("nope.txt", dir.path())).await;
        assert!(result.is_err());
    }
}
