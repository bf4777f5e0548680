//! Patch AST types.

use serde::{Deserialize, Serialize};

/// One update chunk: an optional change-context anchor line, the old/new
/// line bodies, and whether the chunk is anchored at end-of-file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateChunk {
    pub change_context: Option<String>,
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
    pub is_eof: bool,
}

/// One hunk of a patch envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Hunk {
    Add { path: String, contents: Vec<String> },
    Delete { path: String },
    Update {
        path: String,
        move_to: Option<String>,
        chunks: Vec<UpdateChunk>,
    },
}

impl Hunk {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. } | Self::Delete { path } | Self::Update { path, .. } => path,
        }
    }
}

/// A full patch: an ordered list of hunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Patch {
    pub hunks: Vec<Hunk>,
}
