//! Pre-flight verified, reverse-order patch applier (spec §4.4.3, §4.4.4).

use std::fs;
use std::path::{Path, PathBuf};

use conduit_types::{Hunk, Patch};

use crate::matcher::{self, MatchError};

/// Applying a patch failed. `verify_first` errors never touch the
/// filesystem; any other variant may leave earlier hunks' writes in place
/// (the guarantee is pre-flight, not transactional rollback — spec §4.4.4).
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("{path}: update target does not exist")]
    MissingUpdateTarget { path: String },
    #[error("{path}: delete target does not exist")]
    MissingDeleteTarget { path: String },
    #[error("{path}: delete target is a directory")]
    DeleteTargetIsDirectory { path: String },
    #[error("{path}: {source}")]
    Match { path: String, source: MatchError },
    #[error("{path}: file is not valid UTF-8")]
    NotUtf8 { path: String },
    #[error("{path}: {source}")]
    Io { path: String, source: std::io::Error },
}

/// One line per touched path, in patch order, and the joined
/// `function_call_output.content` summary (spec §4.4 expansion).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplySummary {
    pub lines: Vec<String>,
}

impl ApplySummary {
    #[must_use]
    pub fn as_text(&self) -> String {
        self.lines.join("\n")
    }
}

/// Applies every hunk of `patch` relative to `cwd`. Verifies all update and
/// delete targets exist (and that delete targets are not directories)
/// before writing anything; a missing target aborts with no side effects.
///
/// # Errors
/// Returns the first verification or application failure encountered.
pub fn apply_patch(patch: &Patch, cwd: &Path) -> Result<ApplySummary, ApplyError> {
    preflight(patch, cwd)?;

    let mut summary = ApplySummary::default();
    for hunk in &patch.hunks {
        match hunk {
            Hunk::Add { path, contents } => {
                write_new_file(&resolve(cwd, path), contents)?;
                summary.lines.push(format!("A {path}"));
            }
            Hunk::Delete { path } => {
                let target = resolve(cwd, path);
                fs::remove_file(&target).map_err(|source| ApplyError::Io { path: path.clone(), source })?;
                summary.lines.push(format!("D {path}"));
            }
            Hunk::Update { path, move_to, chunks } => {
                apply_update(cwd, path, move_to.as_deref(), chunks)?;
                summary.lines.push(format!("M {path}"));
            }
        }
    }
    Ok(summary)
}

fn preflight(patch: &Patch, cwd: &Path) -> Result<(), ApplyError> {
    for hunk in &patch.hunks {
        match hunk {
            Hunk::Add { .. } => {}
            Hunk::Update { path, .. } => {
                let target = resolve(cwd, path);
                if !target.is_file() {
                    return Err(ApplyError::MissingUpdateTarget { path: path.clone() });
                }
            }
            Hunk::Delete { path } => {
                let target = resolve(cwd, path);
                let metadata = fs::symlink_metadata(&target)
                    .map_err(|_| ApplyError::MissingDeleteTarget { path: path.clone() })?;
                if metadata.is_dir() {
                    return Err(ApplyError::DeleteTargetIsDirectory { path: path.clone() });
                }
            }
        }
    }
    Ok(())
}

fn resolve(cwd: &Path, path: &str) -> PathBuf {
    cwd.join(path)
}

fn write_new_file(target: &Path, contents: &[String]) -> Result<(), ApplyError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| ApplyError::Io { path: target.display().to_string(), source })?;
    }
    let body = join_with_trailing_newline(contents);
    fs::write(target, body).map_err(|source| ApplyError::Io { path: target.display().to_string(), source })
}

fn join_with_trailing_newline(lines: &[String]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn apply_update(
    cwd: &Path,
    path: &str,
    move_to: Option<&str>,
    chunks: &[conduit_types::UpdateChunk],
) -> Result<(), ApplyError> {
    let source = resolve(cwd, path);
    let raw = fs::read_to_string(&source).map_err(|source_err| ApplyError::Io { path: path.to_string(), source: source_err })?;

    let mut file_lines: Vec<String> = raw.split('\n').map(str::to_string).collect();
    // Strip the implicit trailing empty element a trailing-newline file
    // produces when split on '\n'.
    if file_lines.last().is_some_and(String::is_empty) {
        file_lines.pop();
    }

    let mut matches = Vec::with_capacity(chunks.len());
    let mut cursor = 0usize;
    for chunk in chunks {
        let m = matcher::locate_chunk(
            &file_lines,
            cursor,
            chunk.change_context.as_deref(),
            &chunk.old_lines,
            &chunk.new_lines,
            chunk.is_eof,
        )
        .map_err(|source| ApplyError::Match { path: path.to_string(), source })?;
        cursor = m.start + m.old_len;
        matches.push(m);
    }

    // Applied in reverse order so earlier indices are never shifted by a
    // later splice (spec §4.4.3).
    for m in matches.into_iter().rev() {
        file_lines.splice(m.start..m.start + m.old_len, m.new_lines);
    }

    let target = match move_to {
        Some(dest) => resolve(cwd, dest),
        None => source.clone(),
    };

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source_err| ApplyError::Io { path: path.to_string(), source: source_err })?;
    }
    let body = join_with_trailing_newline(&file_lines);
    fs::write(&target, body).map_err(|source_err| ApplyError::Io { path: path.to_string(), source: source_err })?;

    if move_to.is_some() && target != source {
        fs::remove_file(&source).map_err(|source_err| ApplyError::Io { path: path.to_string(), source: source_err })?;
    }

    Ok(())
}
