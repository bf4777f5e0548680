//! Fuzzy line matching for update chunks (spec §4.4.2).
//!
//! Four equality passes, tried in order and stopped at the first hit:
//! exact, right-trim, both-trim, Unicode-normalized. Kept as a pipeline of
//! predicates rather than one regex so the ordering stays explicit and
//! independently testable (Design Notes §9).

use unicode_normalization::UnicodeNormalization;

/// A chunk's `old_lines` pattern could not be located in the file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("context line {0:?} not found")]
    ContextNotFound(String),
    #[error("could not locate old_lines in file starting at line {0}")]
    PatternNotFound(usize),
}

/// The result of successfully locating one chunk's `old_lines` (or its
/// empty-line-stripped variant) in the file: where it starts, how many
/// original lines it spans, and the replacement lines to splice in.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkMatch {
    pub start: usize,
    pub old_len: usize,
    pub new_lines: Vec<String>,
}

type EqFn = fn(&str, &str) -> bool;

const PASSES: [EqFn; 4] = [exact_eq, rtrim_eq, trim_eq, normalized_eq];

fn exact_eq(a: &str, b: &str) -> bool {
    a == b
}

fn rtrim_eq(a: &str, b: &str) -> bool {
    a.trim_end() == b.trim_end()
}

fn trim_eq(a: &str, b: &str) -> bool {
    a.trim() == b.trim()
}

fn normalized_eq(a: &str, b: &str) -> bool {
    normalize_unicode(a) == normalize_unicode(b)
}

/// Maps dash/quote/space variants onto their ASCII equivalents (spec P8):
/// EN/EM/figure dash, non-breaking hyphen, and minus sign all become `-`;
/// curly single/double quotes become `'`/`"`; NBSP and every other Unicode
/// space become a plain space. NFC-normalizes first so composed and
/// decomposed forms of the same character compare equal.
fn normalize_unicode(s: &str) -> String {
    s.nfc()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' | '\u{2012}' | '\u{2011}' | '\u{2212}' => '-',
            '\u{2018}' | '\u{2019}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' => '"',
            c if c == '\u{00A0}' || (c.is_whitespace() && c != '\n' && c != '\t') => ' ',
            c => c,
        })
        .collect()
}

/// Forward-searches `lines[start..]` for `pattern` using the four-pass
/// ladder, returning the earliest matching start index.
fn find_forward(lines: &[String], start: usize, pattern: &[String]) -> Option<usize> {
    if pattern.is_empty() || start > lines.len() || pattern.len() > lines.len() - start {
        return None;
    }
    for eq in PASSES {
        for idx in start..=(lines.len() - pattern.len()) {
            if lines[idx..idx + pattern.len()].iter().zip(pattern).all(|(a, b)| eq(a, b)) {
                return Some(idx);
            }
        }
    }
    None
}

/// Locates one update chunk's `old_lines` in `file_lines`, honoring a
/// `change_context` anchor and the `is_eof` end-anchored search, and
/// returns the match plus the lines to splice in. `cursor` is the index to
/// begin searching from (the end of the previous chunk's match, or `0` for
/// the first chunk of an update hunk).
pub fn locate_chunk(
    file_lines: &[String],
    cursor: usize,
    change_context: Option<&str>,
    old_lines: &[String],
    new_lines: &[String],
    is_eof: bool,
) -> Result<ChunkMatch, MatchError> {
    let mut cursor = cursor;

    if let Some(context) = change_context {
        let context_line = vec![context.to_string()];
        let found = find_forward(file_lines, cursor, &context_line)
            .ok_or_else(|| MatchError::ContextNotFound(context.to_string()))?;
        cursor = found + 1;
    }

    if old_lines.is_empty() {
        // Pure insertion: anchored just before the file's trailing empty
        // element (already stripped by the caller) or end-of-file.
        return Ok(ChunkMatch { start: file_lines.len(), old_len: 0, new_lines: new_lines.to_vec() });
    }

    let search_start = if is_eof { file_lines.len().saturating_sub(old_lines.len()) } else { cursor };

    if let Some(start) = find_forward(file_lines, search_start, old_lines) {
        return Ok(ChunkMatch { start, old_len: old_lines.len(), new_lines: new_lines.to_vec() });
    }

    // Retry with a trailing empty line stripped from both old and new, if
    // the pattern ends in one.
    if old_lines.last().is_some_and(String::is_empty) {
        let stripped_old = &old_lines[..old_lines.len() - 1];
        let stripped_new = if new_lines.last().is_some_and(String::is_empty) {
            new_lines[..new_lines.len() - 1].to_vec()
        } else {
            new_lines.to_vec()
        };
        let retry_start = if is_eof { file_lines.len().saturating_sub(stripped_old.len()) } else { cursor };
        if let Some(start) = find_forward(file_lines, retry_start, stripped_old) {
            return Ok(ChunkMatch { start, old_len: stripped_old.len(), new_lines: stripped_new });
        }
    }

    Err(MatchError::PatternNotFound(cursor))
}
