//! Built-in tool handlers shipped by the registry (spec §4.5 expansion).
//!
//! Grounded in the teacher's `ToolExecutor` implementations under
//! `engine/src/tools/`; `update_plan` has no handler here because it is an
//! intercepted control tool the orchestrator handles directly (§4.7.2.d).

pub mod apply_patch;
pub mod list_dir;
pub mod read_file;
pub mod shell;

pub use apply_patch::ApplyPatchTool;
pub use list_dir::ListDirTool;
pub use read_file::ReadFileTool;
pub use shell::ShellTool;

use std::sync::Arc;

use crate::handler::ToolHandler;
use crate::registry::ToolRegistry;

/// Registers every built-in handler into `registry`.
pub fn register_all(registry: &mut ToolRegistry) {
    registry.register(Arc::new(ShellTool::new()) as Arc<dyn ToolHandler>);
    registry.register(Arc::new(ApplyPatchTool::new()) as Arc<dyn ToolHandler>);
    registry.register(Arc::new(ReadFileTool::new()) as Arc<dyn ToolHandler>);
    registry.register(Arc::new(ListDirTool::new()) as Arc<dyn ToolHandler>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_all_populates_the_four_builtins() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        for name in ["shell", "apply_patch", "read_file", "list_dir"] {
            assert!(registry.contains(name), "missing built-in: {name}");
        }
    }
}
