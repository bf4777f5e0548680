//! `list_dir` built-in: never mutating (spec §4.5 expansion).

use std::time::Duration;

use conduit_types::{ToolInvocation, ToolOutput};

use crate::handler::{HandleFut, ToolError, ToolHandler, ToolKind};

const DEFAULT_TIMEOUT_MS: u64 = 5_000;

pub struct ListDirTool;

impl ListDirTool {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ListDirTool {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolHandler for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
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
                let path = invocation.arguments.get("path").and_then(|v| v.as_str()).unwrap_or(".");
                let resolved = match invocation.cwd.as_deref() {
                    Some(cwd) => std::path::Path::new(cwd).join(path),
                    None => std::path::PathBuf::from(path),
                };

                let mut entries = tokio::fs::read_dir(&resolved).await.map_err(|e| ToolError::new(format!("list_dir: {path}: {e}")))?;
                let mut names = Vec::new();
                loop {
                    let next = entries.next_entry().await.map_err(|e| ToolError::new(format!("list_dir: {path}: {e}")))?;
                    match next {
                        Some(entry) => {
                            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                            let name = entry.file_name().to_string_lossy().into_owned();
                            names.push(if is_dir { format!("{name}/") } else { name });
                        }
                        None => break,
                    }
                }
                names.sort();
                Ok(ToolOutput::informational(names.join("\n")))
            };

            match tokio::time::timeout(Duration::from_millis(timeout_ms), run).await {
                Ok(result) => result,
                Err(_) => Ok(ToolOutput::failed("list_dir: timed out")),
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
            tool_name: "list_dir".to_string(),
            arguments,
            cwd: Some(cwd.to_string_lossy().into_owned()),
            sandbox_policy: None,
            env_policy: None,
            session_id: None,
            mcp_ref: None,
            heartbeat: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn lists_files_and_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let tool = ListDirTool::new();
        let output = tool.handle(&invocation(".", dir.path())).await.unwrap();
        let lines: Vec<&str> = output.content.lines().collect();
        assert_eq!(lines, vec!["a.txt", "sub/"]);
        assert_eq!(output.success, None);
    }

    #[test]
    fn never_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ListDirTool::new();
        assert!(!tool.is_mutating(&invocation(".", dir.path())));
    }
}
