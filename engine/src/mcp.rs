//! MCP bridge interface (spec §4.8). Subprocess lifecycle, transport, and
//! tool-call forwarding are out of scope; this module pins the shape the
//! orchestrator consumes so a session can be exercised without a real MCP
//! manager.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use conduit_types::{McpRef, ToolSpec};

/// One configured MCP server. Opaque beyond a name: the transport and
/// argv a real manager would use to spawn it are out of scope.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub name: String,
}

/// What `initialize` hands back to the orchestrator: specs to merge into
/// the session's advertised tool set, a lookup from the qualified tool
/// name to its `{server, tool}` pair, and any servers that failed to
/// start (reported, never fatal to the session).
#[derive(Debug, Clone, Default)]
pub struct McpInitResult {
    pub tool_specs: Vec<ToolSpec>,
    pub lookup: HashMap<String, McpRef>,
    pub failures: HashMap<String, String>,
}

pub type McpInitFut<'a> = Pin<Box<dyn Future<Output = McpInitResult> + Send + 'a>>;
pub type McpCleanupFut<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

pub trait McpBridge: Send + Sync {
    fn initialize<'a>(&'a self, server_configs: &'a [McpServerConfig]) -> McpInitFut<'a>;
    fn cleanup(&self) -> McpCleanupFut<'_>;
}

/// Reports zero tools and zero failures unconditionally — the bridge a
/// session uses when no MCP manager is wired in.
pub struct NullMcpBridge;

impl McpBridge for NullMcpBridge {
    fn initialize<'a>(&'a self, _server_configs: &'a [McpServerConfig]) -> McpInitFut<'a> {
        Box::pin(async { McpInitResult::default() })
    }

    fn cleanup(&self) -> McpCleanupFut<'_> {
        Box::pin(async {})
    }
}
