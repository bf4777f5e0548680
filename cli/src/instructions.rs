//! Instruction discovery (SPEC_FULL.md §6): `AGENTS.md` files from the
//! nearest VCS root down to the current directory, plus
//! `${CODEX_HOME}/instructions.md`.

use std::path::{Path, PathBuf};

/// Walks from `start` up to the nearest ancestor containing a `.git` entry
/// (or the filesystem root, if none is found), collecting every directory
/// that holds an `AGENTS.md` along the way. Returned root-to-leaf, so a
/// directory closer to `start` comes later and can refine instructions set
/// by an ancestor.
#[must_use]
pub fn discover_agents_md(start: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut current = Some(start.to_path_buf());
    while let Some(dir) = current {
        let candidate = dir.join("AGENTS.md");
        if candidate.is_file() {
            dirs.push(candidate);
        }
        if dir.join(".git").exists() {
            break;
        }
        current = dir.parent().map(Path::to_path_buf);
    }
    dirs.reverse();
    dirs
}

fn read_all(paths: &[PathBuf]) -> String {
    paths.iter().filter_map(|p| std::fs::read_to_string(p).ok()).collect::<Vec<_>>().join("\n\n")
}

/// Assembles the developer-instructions block handed to
/// [`conduit_engine::SessionConfig::developer_instructions`]: every
/// discovered `AGENTS.md`, root to leaf, followed by
/// `${CODEX_HOME}/instructions.md` if present. Both sources are tolerant
/// of missing files; a project with no `AGENTS.md` and no
/// `instructions.md` simply contributes nothing.
#[must_use]
pub fn load_developer_instructions(cwd: &Path, codex_home: &Path) -> String {
    let mut parts = Vec::new();

    let agents_text = read_all(&discover_agents_md(cwd));
    if !agents_text.is_empty() {
        parts.push(agents_text);
    }

    if let Ok(text) = std::fs::read_to_string(codex_home.join("instructions.md")) {
        parts.push(text);
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_agents_md_from_root_to_leaf() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join(".git")).unwrap();
        std::fs::write(root.path().join("AGENTS.md"), "root rules").unwrap();

        let nested = root.path().join("pkg");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("AGENTS.md"), "pkg rules").unwrap();

        let found = discover_agents_md(&nested);
        assert_eq!(found, vec![root.path().join("AGENTS.md"), nested.join("AGENTS.md")]);
    }

    #[test]
    fn missing_agents_md_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        assert!(discover_agents_md(dir.path()).is_empty());
    }

    #[test]
    fn load_developer_instructions_appends_codex_home_instructions_md() {
        let cwd = tempfile::tempdir().unwrap();
        std::fs::create_dir(cwd.path().join(".git")).unwrap();
        std::fs::write(cwd.path().join("AGENTS.md"), "project rules").unwrap();

        let codex_home = tempfile::tempdir().unwrap();
        std::fs::write(codex_home.path().join("instructions.md"), "global rules").unwrap();

        let combined = load_developer_instructions(cwd.path(), codex_home.path());
        assert!(combined.contains("project rules"));
        assert!(combined.contains("global rules"));
    }

    #[test]
    fn load_developer_instructions_tolerates_missing_sources() {
        let cwd = tempfile::tempdir().unwrap();
        let codex_home = tempfile::tempdir().unwrap();
        assert_eq!(load_developer_instructions(cwd.path(), codex_home.path()), "");
    }
}
