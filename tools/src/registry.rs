//! Tool registry and spec registry (spec §4.5).
//!
//! Two separate registries, mirroring the spec's split: the
//! [`ToolRegistry`] maps a name to a runnable [`ToolHandler`]; the
//! [`SpecRegistry`] maps a name to the [`ToolSpec`] the provider adapter
//! advertises to the model. A tool can be spec-only (an intercepted
//! control tool such as `update_plan` has a spec but no handler).

use std::collections::HashMap;
use std::sync::Arc;

use conduit_types::ToolSpec;

use crate::handler::ToolHandler;

/// Function calls the orchestrator handles directly and which never reach
/// a [`ToolHandler`] (spec §4.5, §4.7.2.d).
pub const INTERCEPTED_TOOLS: &[&str] =
    &["spawn_agent", "send_input", "wait", "close_agent", "resume_agent", "update_plan", "request_user_input"];

#[must_use]
pub fn is_intercepted(tool_name: &str) -> bool {
    INTERCEPTED_TOOLS.contains(&tool_name)
}

/// A named bundle of tool names that expands to its members when present
/// in an enabled set, e.g. `collab` expands to the five sub-agent control
/// tools.
#[derive(Debug, Clone, Copy)]
pub struct ToolGroup {
    pub name: &'static str,
    pub members: &'static [&'static str],
}

pub const GROUPS: &[ToolGroup] = &[ToolGroup {
    name: "collab",
    members: &["spawn_agent", "send_input", "wait", "close_agent", "resume_agent"],
}];

fn expand_group(name: &str) -> Option<&'static [&'static str]> {
    GROUPS.iter().find(|g| g.name == name).map(|g| g.members)
}

/// Expands any group names in `enabled` to their members, preserving
/// order and without duplicating a tool name that appears twice (directly
/// and via a group, or via two groups).
#[must_use]
pub fn expand_enabled(enabled: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(enabled.len());
    for name in enabled {
        match expand_group(name) {
            Some(members) => {
                for member in members {
                    if !out.iter().any(|existing| existing == member) {
                        out.push((*member).to_string());
                    }
                }
            }
            None => {
                if !out.iter().any(|existing| existing == name) {
                    out.push(name.clone());
                }
            }
        }
    }
    out
}

/// Maps tool name to runnable handler.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

/// Maps tool name to the [`ToolSpec`] advertised to the provider adapter.
/// Populated by constructor callbacks so that a spec's construction (which
/// may be non-trivial, e.g. loading an MCP server's raw JSON Schema) is
/// deferred until the tool is actually enabled.
#[derive(Default)]
pub struct SpecRegistry {
    constructors: HashMap<String, Box<dyn Fn() -> ToolSpec + Send + Sync>>,
}

impl SpecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, constructor: impl Fn() -> ToolSpec + Send + Sync + 'static) {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Resolves the enabled set into specs: groups expand first, then
    /// unknown names (present in `enabled` but with no registered
    /// constructor) are silently skipped, matching spec §4.5's "unknown
    /// names in the enabled set are silently skipped".
    #[must_use]
    pub fn resolve(&self, enabled: &[String]) -> Vec<ToolSpec> {
        expand_enabled(enabled)
            .iter()
            .filter_map(|name| self.constructors.get(name).map(|ctor| ctor()))
            .collect()
    }

    /// Looks up a single tool's spec by name, e.g. so a dispatcher can read
    /// its `default_timeout_ms` without resolving the whole enabled set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolSpec> {
        self.constructors.get(name).map(|ctor| ctor())
    }
}
