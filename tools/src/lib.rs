//! Tool registry, parallel read/write-gated dispatch, and built-in tool
//! executors (spec §4.5).

pub mod builtins;
pub mod dispatch;
pub mod handler;
pub mod registry;
pub mod specs;

pub use dispatch::dispatch_batch;
pub use handler::{HandleFut, ToolError, ToolHandler, ToolKind};
pub use registry::{GROUPS, INTERCEPTED_TOOLS, SpecRegistry, ToolGroup, ToolRegistry, expand_enabled, is_intercepted};
