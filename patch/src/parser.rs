//! Line-oriented parser for the patch envelope grammar (spec §4.4.1).
//!
//! Envelope markers (`*** Begin Patch`, `*** End Patch`, the three hunk
//! headers, `*** End of File`) are whitespace-tolerant: compared after
//! `str::trim`. Diff-line prefixes (` `, `+`, `-`) are strict — only the
//! very first byte is inspected, the rest of the line is verbatim.

use conduit_types::{Hunk, Patch, UpdateChunk};

const BEGIN: &str = "*** Begin Patch";
const END: &str = "*** End Patch";
const ADD_PREFIX: &str = "*** Add File: ";
const DELETE_PREFIX: &str = "*** Delete File: ";
const UPDATE_PREFIX: &str = "*** Update File: ";
const MOVE_PREFIX: &str = "*** Move to: ";
const EOF_MARKER: &str = "*** End of File";

/// A patch failed to parse. Carries a 1-based line number for caller
/// diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("patch parse error at line {line}: {message}")]
pub struct PatchParseError {
    pub line: usize,
    pub message: String,
}

fn err(line: usize, message: impl Into<String>) -> PatchParseError {
    PatchParseError { line, message: message.into() }
}

struct Lines<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Lines<'a> {
    fn new(input: &'a str) -> Self {
        Self { lines: input.lines().collect(), pos: 0 }
    }

    fn line_no(&self) -> usize {
        self.pos + 1
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn peek_trimmed(&self) -> Option<&'a str> {
        self.peek().map(str::trim)
    }

    fn bump(&mut self) -> Option<&'a str> {
        let line = self.peek();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn at_end(&self) -> bool {
        self.pos >= self.lines.len()
    }
}

/// Parses a full `*** Begin Patch` ... `*** End Patch` envelope.
pub fn parse_patch(input: &str) -> Result<Patch, PatchParseError> {
    let mut lines = Lines::new(input);

    match lines.bump() {
        Some(line) if line.trim() == BEGIN => {}
        Some(_) => return Err(err(lines.line_no(), "expected '*** Begin Patch'")),
        None => return Err(err(1, "empty patch: expected '*** Begin Patch'")),
    }

    let mut hunks = Vec::new();
    loop {
        match lines.peek_trimmed() {
            Some(END) => {
                lines.bump();
                break;
            }
            Some(header) if header.starts_with(ADD_PREFIX) => {
                hunks.push(parse_add(&mut lines)?);
            }
            Some(header) if header.starts_with(DELETE_PREFIX) => {
                hunks.push(parse_delete(&mut lines)?);
            }
            Some(header) if header.starts_with(UPDATE_PREFIX) => {
                hunks.push(parse_update(&mut lines)?);
            }
            Some(_) => return Err(err(lines.line_no(), "expected a hunk header or '*** End Patch'")),
            None => return Err(err(lines.line_no(), "unterminated patch: missing '*** End Patch'")),
        }
    }

    if !lines.at_end() {
        return Err(err(lines.line_no(), "content after '*** End Patch'"));
    }

    Ok(Patch { hunks })
}

fn parse_add(lines: &mut Lines<'_>) -> Result<Hunk, PatchParseError> {
    let header = lines.bump().expect("caller verified header present");
    let path = header.trim().strip_prefix(ADD_PREFIX).expect("caller verified prefix").to_string();
    if path.is_empty() {
        return Err(err(lines.line_no(), "'*** Add File:' is missing a path"));
    }

    let mut contents = Vec::new();
    loop {
        match lines.peek() {
            Some(line) if line.starts_with('+') => {
                contents.push(line[1..].to_string());
                lines.bump();
            }
            _ => break,
        }
    }
    if contents.is_empty() {
        return Err(err(lines.line_no(), format!("'*** Add File: {path}' has no '+' lines")));
    }

    Ok(Hunk::Add { path, contents })
}

fn parse_delete(lines: &mut Lines<'_>) -> Result<Hunk, PatchParseError> {
    let header = lines.bump().expect("caller verified header present");
    let path = header.trim().strip_prefix(DELETE_PREFIX).expect("caller verified prefix").to_string();
    if path.is_empty() {
        return Err(err(lines.line_no(), "'*** Delete File:' is missing a path"));
    }
    Ok(Hunk::Delete { path })
}

fn parse_update(lines: &mut Lines<'_>) -> Result<Hunk, PatchParseError> {
    let header = lines.bump().expect("caller verified header present");
    let path = header.trim().strip_prefix(UPDATE_PREFIX).expect("caller verified prefix").to_string();
    if path.is_empty() {
        return Err(err(lines.line_no(), "'*** Update File:' is missing a path"));
    }

    let move_to = match lines.peek_trimmed() {
        Some(line) if line.starts_with(MOVE_PREFIX) => {
            lines.bump();
            let dest = line.strip_prefix(MOVE_PREFIX).expect("checked prefix").to_string();
            if dest.is_empty() {
                return Err(err(lines.line_no(), "'*** Move to:' is missing a path"));
            }
            Some(dest)
        }
        _ => None,
    };

    let mut chunks = Vec::new();
    loop {
        match lines.peek_trimmed() {
            Some(END) => break,
            Some(next) if is_hunk_header(next) => break,
            None => break,
            _ => chunks.push(parse_chunk(lines)?),
        }
    }

    if chunks.is_empty() {
        return Err(err(lines.line_no(), format!("'*** Update File: {path}' has no chunks")));
    }

    Ok(Hunk::Update { path, move_to, chunks })
}

fn is_hunk_header(trimmed: &str) -> bool {
    trimmed.starts_with(ADD_PREFIX) || trimmed.starts_with(DELETE_PREFIX) || trimmed.starts_with(UPDATE_PREFIX)
}

fn parse_chunk(lines: &mut Lines<'_>) -> Result<UpdateChunk, PatchParseError> {
    let change_context = match lines.peek() {
        Some(line) if line.trim_start().starts_with("@@") => {
            lines.bump();
            let rest = line.trim_start().trim_start_matches("@@");
            let trimmed = rest.strip_prefix(' ').unwrap_or(rest).trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        }
        _ => None,
    };

    let mut old_lines = Vec::new();
    let mut new_lines = Vec::new();
    let mut saw_diff_line = false;

    loop {
        match lines.peek() {
            Some(line) if line.trim_start().starts_with("@@") => break,
            Some(line) if line.trim() == END => break,
            Some(line) if is_hunk_header(line.trim()) => break,
            Some(line) if line.trim() == EOF_MARKER => break,
            None => break,
            Some(line) => {
                saw_diff_line = true;
                if line.is_empty() {
                    old_lines.push(String::new());
                    new_lines.push(String::new());
                } else {
                    let (tag, text) = line.split_at(1);
                    match tag {
                        " " => {
                            old_lines.push(text.to_string());
                            new_lines.push(text.to_string());
                        }
                        "+" => new_lines.push(text.to_string()),
                        "-" => old_lines.push(text.to_string()),
                        _ => return Err(err(lines.line_no(), format!("invalid diff-line prefix {tag:?}"))),
                    }
                }
                lines.bump();
            }
        }
    }

    if !saw_diff_line {
        return Err(err(lines.line_no(), "chunk has no diff lines"));
    }

    let is_eof = if lines.peek().map(str::trim) == Some(EOF_MARKER) {
        lines.bump();
        true
    } else {
        false
    };

    Ok(UpdateChunk { change_context, old_lines, new_lines, is_eof })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_parses_add_file() {
        let patch = parse_patch("*** Begin Patch\n*** Add File: hello.txt\n+world\n*** End Patch").unwrap();
        assert_eq!(patch.hunks.len(), 1);
        match &patch.hunks[0] {
            Hunk::Add { path, contents } => {
                assert_eq!(path, "hello.txt");
                assert_eq!(contents, &["world".to_string()]);
            }
            _ => panic!("expected Add hunk"),
        }
    }

    #[test]
    fn parses_delete_file() {
        let patch = parse_patch("*** Begin Patch\n*** Delete File: gone.txt\n*** End Patch").unwrap();
        assert_eq!(patch.hunks, vec![Hunk::Delete { path: "gone.txt".into() }]);
    }

    #[test]
    fn parses_update_with_move_and_context_header() {
        let text = "*** Begin Patch\n\
                     *** Update File: a.py\n\
                     *** Move to: b.py\n\
                     @@ def foo():\n\
                     -old\n\
                     +new\n\
                     *** End Patch";
        let patch = parse_patch(text).unwrap();
        match &patch.hunks[0] {
            Hunk::Update { path, move_to, chunks } => {
                assert_eq!(path, "a.py");
                assert_eq!(move_to.as_deref(), Some("b.py"));
                assert_eq!(chunks.len(), 1);
                assert_eq!(chunks[0].change_context.as_deref(), Some("def foo():"));
                assert_eq!(chunks[0].old_lines, vec!["old".to_string()]);
                assert_eq!(chunks[0].new_lines, vec!["new".to_string()]);
            }
            _ => panic!("expected Update hunk"),
        }
    }

    #[test]
    fn first_chunk_may_omit_at_at_header() {
        let text = "*** Begin Patch\n*** Update File: a.py\n-old\n+new\n*** End Patch";
        let patch = parse_patch(text).unwrap();
        match &patch.hunks[0] {
            Hunk::Update { chunks, .. } => assert!(chunks[0].change_context.is_none()),
            _ => panic!("expected Update hunk"),
        }
    }

    #[test]
    fn blank_diff_line_is_unchanged_context() {
        let text = "*** Begin Patch\n*** Update File: a.py\n-old\n\n+new\n*** End Patch";
        let patch = parse_patch(text).unwrap();
        match &patch.hunks[0] {
            Hunk::Update { chunks, .. } => {
                assert_eq!(chunks[0].old_lines, vec!["old".to_string(), String::new()]);
                assert_eq!(chunks[0].new_lines, vec![String::new(), "new".to_string()]);
            }
            _ => panic!("expected Update hunk"),
        }
    }

    #[test]
    fn end_of_file_marker_sets_is_eof() {
        let text = "*** Begin Patch\n*** Update File: a.py\n-old\n+new\n*** End of File\n*** End Patch";
        let patch = parse_patch(text).unwrap();
        match &patch.hunks[0] {
            Hunk::Update { chunks, .. } => assert!(chunks[0].is_eof),
            _ => panic!("expected Update hunk"),
        }
    }

    #[test]
    fn multiple_chunks_in_one_update_hunk() {
        let text = "*** Begin Patch\n\
                     *** Update File: a.py\n\
                     @@ def foo():\n\
                     -1\n\
                     +2\n\
                     @@ def bar():\n\
                     -3\n\
                     +4\n\
                     *** End Patch";
        let patch = parse_patch(text).unwrap();
        match &patch.hunks[0] {
            Hunk::Update { chunks, .. } => assert_eq!(chunks.len(), 2),
            _ => panic!("expected Update hunk"),
        }
    }

    #[test]
    fn missing_begin_marker_is_an_error_with_line_number() {
        let result = parse_patch("*** Add File: x\n+y\n*** End Patch");
        assert_eq!(result, Err(err(1, "expected '*** Begin Patch'")));
    }

    #[test]
    fn missing_end_marker_is_an_error() {
        let result = parse_patch("*** Begin Patch\n*** Add File: x\n+y");
        assert!(result.is_err());
    }

    #[test]
    fn envelope_markers_are_whitespace_tolerant() {
        let patch = parse_patch("  *** Begin Patch  \n*** Add File: x\n+y\n  *** End Patch  ").unwrap();
        assert_eq!(patch.hunks.len(), 1);
    }

    #[test]
    fn invalid_diff_line_prefix_is_rejected() {
        let text = "*** Begin Patch\n*** Update File: a.py\n*oops\n*** End Patch";
        assert!(parse_patch(text).is_err());
    }
}
