//! Core domain types for Conduit.
//!
//! No IO, no async: this crate is the shared vocabulary between
//! `conduit-exec`, `conduit-patch`, `conduit-tools`, `conduit-providers`,
//! and `conduit-engine`.

pub mod error_kind;
pub mod ids;
pub mod item;
pub mod patch;
pub mod policy;
pub mod tool;
pub mod turn;

pub use error_kind::ErrorKind;
pub use ids::{AgentId, CallId, EmptyIdError, TurnId};
pub use item::{ConversationItem, HistoryInvariantError, check_history_invariants};
pub use patch::{Hunk, Patch, UpdateChunk};
pub use policy::{ApprovalMode, Decision, Evaluation, PatternToken, PolicyRule};
pub use tool::{McpRef, ParamSpec, ParameterSchema, SandboxPolicy, ToolInvocation, ToolOutput, ToolSpec};
pub use turn::{Phase, PhaseOrIdle, TurnLedger};
