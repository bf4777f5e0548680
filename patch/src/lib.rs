//! Patch parser, fuzzy matcher, and atomic-preflight applier for the
//! `apply_patch` tool (spec §4.4).

pub mod applier;
pub mod matcher;
pub mod parser;

pub use applier::{ApplyError, ApplySummary, apply_patch};
pub use matcher::{ChunkMatch, MatchError, locate_chunk};
pub use parser::{PatchParseError, parse_patch};
