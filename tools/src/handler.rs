//! The per-tool handler trait (spec §4.5).

use std::future::Future;
use std::pin::Pin;

use conduit_types::{ToolInvocation, ToolOutput};

/// A handler ran but the operation it performs failed in an
/// expected, domain-specific way (bad path, nonzero exit, patch
/// context not found, ...). Distinct from an infrastructure error:
/// the caller turns this into `ToolOutput::failed`, never a fatal
/// session error (spec §7).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ToolError(pub String);

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Future type returned by [`ToolHandler::handle`]; boxed so the trait
/// stays object-safe.
pub type HandleFut<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, ToolError>> + Send + 'a>>;

/// Whether a tool is a built-in function or a bridged MCP tool (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Function,
    Mcp,
}

/// One registered tool: knows its own mutating-ness per invocation (a
/// `shell` call is mutating only if its script doesn't parse as
/// known-safe) and how to run.
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> ToolKind;

    /// Whether this invocation may change filesystem, process, or network
    /// state. Must run serially per session if true (spec §4.5).
    fn is_mutating(&self, invocation: &ToolInvocation) -> bool;

    fn handle<'a>(&'a self, invocation: &'a ToolInvocation) -> HandleFut<'a>;
}
