//! Exec-policy engine.
//!
//! Loads prefix rules from `{codex_home}/rules/*.rules`, evaluates
//! commands against them with `max`-aggregation under
//! `allow < prompt < forbidden`, and appends new allow-prefix rules back to
//! a rules file.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use conduit_types::{Decision, Evaluation, PatternToken, PolicyRule};

/// A rules file failed to parse, or an I/O operation on a rules file or
/// directory failed.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("{path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("io error reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("cannot append an empty prefix")]
    EmptyPrefix,
}

/// A caller-supplied fallback used when no rule matches a sub-command. The
/// approval-mode heuristic (spec §4.7.2.d) is the expected implementor.
pub type Fallback<'a> = dyn Fn(&[String]) -> Decision + 'a;

/// A loaded set of prefix rules, indexed by the literal first token of each
/// rule's pattern (an empty-string bucket holds rules whose first token is
/// an alternation, so they can't be indexed by a single literal).
#[derive(Debug, Clone, Default)]
pub struct ExecPolicy {
    by_first_token: HashMap<String, Vec<PolicyRule>>,
    wildcard_first: Vec<PolicyRule>,
}

impl ExecPolicy {
    /// An empty policy: no rules match, every `check` falls back.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads every `*.rules` file directly under `{codex_home}/rules`,
    /// merging by list concatenation. A missing or empty rules directory
    /// yields an empty policy, not an error.
    pub fn load(codex_home: &Path) -> Result<Self, PolicyError> {
        let rules_dir = codex_home.join("rules");
        let mut policy = Self::empty();

        let entries = match fs::read_dir(&rules_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(policy),
            Err(source) => return Err(PolicyError::Io { path: rules_dir, source }),
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| PolicyError::Io { path: rules_dir.clone(), source })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("rules") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let text = fs::read_to_string(&path).map_err(|source| PolicyError::Io { path: path.clone(), source })?;
            for rule in parse_rules_file(&text).map_err(|message| PolicyError::Parse { path: path.clone(), message })? {
                policy.insert(rule);
            }
        }

        Ok(policy)
    }

    fn insert(&mut self, rule: PolicyRule) {
        match rule.pattern.first().and_then(PatternToken::as_literal) {
            Some(literal) => self.by_first_token.entry(literal.to_string()).or_default().push(rule),
            None => self.wildcard_first.push(rule),
        }
    }

    /// All rules that could possibly match `cmd`: the bucket for its first
    /// word plus the wildcard bucket, keeping `check` linear in the
    /// matching bucket rather than the whole rule set.
    fn candidate_rules(&self, cmd: &[String]) -> impl Iterator<Item = &PolicyRule> {
        let indexed = cmd.first().and_then(|first| self.by_first_token.get(first)).into_iter().flatten();
        indexed.chain(self.wildcard_first.iter())
    }

    /// Evaluates one command. Consults both the indexed bucket for
    /// `cmd[0]` and the wildcard bucket; if nothing matches, calls
    /// `fallback` (or defaults to `Decision::Prompt` if `None`).
    #[must_use]
    pub fn check(&self, cmd: &[String], fallback: Option<&Fallback<'_>>) -> Evaluation {
        let matched: Vec<&PolicyRule> = self.candidate_rules(cmd).filter(|rule| rule.matches(cmd)).collect();

        if matched.is_empty() {
            let decision = fallback.map_or(Decision::Prompt, |f| f(cmd));
            return Evaluation { decision, matched_rules: 0, justification: None, used_fallback: true };
        }

        let decision = matched.iter().map(|r| r.decision).fold(Decision::Allow, Decision::max);
        let justification = matched
            .iter()
            .filter(|r| r.decision == decision)
            .find_map(|r| r.justification.clone());

        Evaluation { decision, matched_rules: matched.len(), justification, used_fallback: false }
    }

    /// Evaluates several commands (e.g. the sub-commands of a parsed
    /// `shell -lc` script) and aggregates with `max`. `used_fallback` holds
    /// only if *every* sub-command used the fallback.
    #[must_use]
    pub fn check_multiple(&self, cmds: &[Vec<String>], fallback: Option<&Fallback<'_>>) -> Evaluation {
        let evaluations: Vec<Evaluation> = cmds.iter().map(|cmd| self.check(cmd, fallback)).collect();

        let decision = evaluations.iter().map(|e| e.decision).fold(Decision::Allow, Decision::max);
        let matched_rules = evaluations.iter().map(|e| e.matched_rules).sum();
        let used_fallback = evaluations.iter().all(|e| e.used_fallback);
        let justification = evaluations
            .iter()
            .filter(|e| e.decision == decision)
            .find_map(|e| e.justification.clone());

        Evaluation { decision, matched_rules, justification, used_fallback }
    }
}

/// Appends `prefix_rule(pattern=[...], decision="allow")\n` to `rules_file`,
/// creating parent directories if needed. Deduplicates when the identical
/// line (literal-string equality, not whitespace-tolerant — see
/// SPEC_FULL.md Open Question 1) is already present. Guarantees the file
/// ends with a newline.
///
/// # Errors
/// Returns [`PolicyError::EmptyPrefix`] if `prefix` is empty, or
/// [`PolicyError::Io`] on any filesystem failure.
pub fn append_allow_prefix(rules_file: &Path, prefix: &[String]) -> Result<(), PolicyError> {
    if prefix.is_empty() {
        return Err(PolicyError::EmptyPrefix);
    }

    if let Some(parent) = rules_file.parent() {
        fs::create_dir_all(parent).map_err(|source| PolicyError::Io { path: parent.to_path_buf(), source })?;
    }

    let line = format_allow_prefix_line(prefix);

    let existing = match fs::read_to_string(rules_file) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(source) => return Err(PolicyError::Io { path: rules_file.to_path_buf(), source }),
    };

    if existing.lines().any(|existing_line| existing_line == line) {
        return Ok(());
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(rules_file)
        .map_err(|source| PolicyError::Io { path: rules_file.to_path_buf(), source })?;

    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file).map_err(|source| PolicyError::Io { path: rules_file.to_path_buf(), source })?;
    }
    writeln!(file, "{line}").map_err(|source| PolicyError::Io { path: rules_file.to_path_buf(), source })?;
    Ok(())
}

fn format_allow_prefix_line(prefix: &[String]) -> String {
    let quoted: Vec<String> = prefix.iter().map(|tok| format!("{:?}", tok)).collect();
    format!("prefix_rule(pattern=[{}], decision=\"allow\")", quoted.join(", "))
}

/// Parses the small declarative `prefix_rule(...)` script format (spec
/// §4.3, §6). One call per rule; calls may be separated by any amount of
/// whitespace or newlines. Lines starting with `#` (after leading
/// whitespace) are comments.
fn parse_rules_file(text: &str) -> Result<Vec<PolicyRule>, String> {
    let mut rules = Vec::new();
    let mut parser = RuleParser::new(text);
    parser.skip_trivia();
    while !parser.at_end() {
        rules.push(parser.parse_prefix_rule_call()?);
        parser.skip_trivia();
    }
    Ok(rules)
}

struct RuleParser<'a> {
    chars: Vec<char>,
    pos: usize,
    src: &'a str,
}

impl<'a> RuleParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { chars: src.chars().collect(), pos: 0, src }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn expect_literal(&mut self, literal: &str) -> Result<(), String> {
        for expected in literal.chars() {
            match self.bump() {
                Some(actual) if actual == expected => {}
                other => {
                    return Err(format!(
                        "expected {literal:?} at byte {}, found {other:?}",
                        self.byte_pos()
                    ));
                }
            }
        }
        Ok(())
    }

    fn byte_pos(&self) -> usize {
        self.chars[..self.pos].iter().collect::<String>().len().min(self.src.len())
    }

    fn parse_prefix_rule_call(&mut self) -> Result<PolicyRule, String> {
        self.expect_literal("prefix_rule")?;
        self.skip_trivia();
        self.expect_literal("(")?;
        self.skip_trivia();

        let mut pattern: Option<Vec<PatternToken>> = None;
        let mut decision = Decision::Allow;
        let mut justification: Option<String> = None;

        loop {
            self.skip_trivia();
            if self.peek() == Some(')') {
                self.bump();
                break;
            }
            let key = self.parse_ident()?;
            self.skip_trivia();
            self.expect_literal("=")?;
            self.skip_trivia();
            match key.as_str() {
                "pattern" => pattern = Some(self.parse_pattern_array()?),
                "decision" => decision = parse_decision(&self.parse_string()?)?,
                "justification" => justification = Some(self.parse_string()?),
                other => return Err(format!("unrecognized prefix_rule keyword argument: {other}")),
            }
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(')') => {
                    self.bump();
                    break;
                }
                other => return Err(format!("expected ',' or ')' in prefix_rule(), found {other:?}")),
            }
        }

        let pattern = pattern.ok_or_else(|| "prefix_rule() is missing a pattern= argument".to_string())?;
        Ok(PolicyRule { pattern, decision, justification })
    }

    fn parse_ident(&mut self) -> Result<String, String> {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if ident.is_empty() {
            return Err(format!("expected identifier at byte {}", self.byte_pos()));
        }
        Ok(ident)
    }

    fn parse_string(&mut self) -> Result<String, String> {
        self.expect_literal("\"")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('n') => out.push('\n'),
                    other => return Err(format!("invalid string escape: {other:?}")),
                },
                Some(c) => out.push(c),
                None => return Err("unterminated string literal".to_string()),
            }
        }
    }

    /// `[tok, tok, ...]` where each `tok` is a quoted string (a literal) or
    /// a nested `[...]` of strings (an alternation).
    fn parse_pattern_array(&mut self) -> Result<Vec<PatternToken>, String> {
        self.expect_literal("[")?;
        let mut tokens = Vec::new();
        self.skip_trivia();
        if self.peek() == Some(']') {
            self.bump();
            return Err("prefix_rule() pattern must not be empty".to_string());
        }
        loop {
            self.skip_trivia();
            let token = if self.peek() == Some('[') {
                PatternToken::Alternatives(self.parse_string_array()?)
            } else {
                PatternToken::Literal(self.parse_string()?)
            };
            tokens.push(token);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                other => return Err(format!("expected ',' or ']' in pattern array, found {other:?}")),
            }
        }
        Ok(tokens)
    }

    fn parse_string_array(&mut self) -> Result<Vec<String>, String> {
        self.expect_literal("[")?;
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(']') {
                self.bump();
                break;
            }
            items.push(self.parse_string()?);
            self.skip_trivia();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    break;
                }
                other => return Err(format!("expected ',' or ']' in alternatives array, found {other:?}")),
            }
        }
        if items.is_empty() {
            return Err("alternation token must not be empty".to_string());
        }
        Ok(items)
    }
}

fn parse_decision(raw: &str) -> Result<Decision, String> {
    match raw {
        "allow" => Ok(Decision::Allow),
        "prompt" => Ok(Decision::Prompt),
        "forbidden" => Ok(Decision::Forbidden),
        other => Err(format!("unrecognized decision: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    fn write_rules(dir: &Path, name: &str, contents: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn empty_rules_dir_yields_empty_policy_not_error() {
        let home = tempdir().unwrap();
        let policy = ExecPolicy::load(home.path()).unwrap();
        let eval = policy.check(&cmd(&["git", "status"]), None);
        assert!(eval.used_fallback);
        assert_eq!(eval.decision, Decision::Prompt);
    }

    #[test]
    fn s2_forbidden_wins_aggregation_with_matched_rule_count() {
        let home = tempdir().unwrap();
        write_rules(
            &home.path().join("rules"),
            "base.rules",
            r#"
            prefix_rule(pattern=["git"], decision="allow")
            prefix_rule(pattern=["git", "reset"], decision="forbidden")
            "#,
        );
        let policy = ExecPolicy::load(home.path()).unwrap();
        let eval = policy.check(&cmd(&["git", "reset", "--hard"]), None);
        assert_eq!(eval.decision, Decision::Forbidden);
        assert_eq!(eval.matched_rules, 2);
        assert!(!eval.used_fallback);
    }

    #[test]
    fn alternation_token_matches_any_listed_word() {
        let home = tempdir().unwrap();
        write_rules(
            &home.path().join("rules"),
            "base.rules",
            r#"prefix_rule(pattern=["git", ["status", "log"]], decision="allow")"#,
        );
        let policy = ExecPolicy::load(home.path()).unwrap();
        assert_eq!(policy.check(&cmd(&["git", "status"]), None).decision, Decision::Allow);
        assert_eq!(policy.check(&cmd(&["git", "log"]), None).decision, Decision::Allow);
        assert!(policy.check(&cmd(&["git", "push"]), None).used_fallback);
    }

    #[test]
    fn unrecognized_decision_is_a_parse_error() {
        let home = tempdir().unwrap();
        write_rules(
            &home.path().join("rules"),
            "base.rules",
            r#"prefix_rule(pattern=["git"], decision="maybe")"#,
        );
        assert!(ExecPolicy::load(home.path()).is_err());
    }

    #[test]
    fn fallback_is_used_only_when_nothing_matches() {
        let policy = ExecPolicy::empty();
        let fallback: &Fallback<'_> = &|_cmd| Decision::Allow;
        let eval = policy.check(&cmd(&["ls"]), Some(fallback));
        assert!(eval.used_fallback);
        assert_eq!(eval.decision, Decision::Allow);
    }

    #[test]
    fn check_multiple_used_fallback_requires_every_subcommand_to_fall_back() {
        let home = tempdir().unwrap();
        write_rules(&home.path().join("rules"), "base.rules", r#"prefix_rule(pattern=["git"], decision="allow")"#);
        let policy = ExecPolicy::load(home.path()).unwrap();
        let eval = policy.check_multiple(&[cmd(&["git", "status"]), cmd(&["ls"])], None);
        assert!(!eval.used_fallback);
        let eval_all_fallback = policy.check_multiple(&[cmd(&["ls"]), cmd(&["pwd"])], None);
        assert!(eval_all_fallback.used_fallback);
    }

    #[test]
    fn p3_aggregation_is_max_over_matched_decisions() {
        let home = tempdir().unwrap();
        write_rules(
            &home.path().join("rules"),
            "base.rules",
            r#"
            prefix_rule(pattern=["npm", "install"], decision="prompt")
            prefix_rule(pattern=["npm"], decision="allow")
            "#,
        );
        let policy = ExecPolicy::load(home.path()).unwrap();
        assert_eq!(policy.check(&cmd(&["npm", "install"]), None).decision, Decision::Prompt);
        assert_eq!(policy.check(&cmd(&["npm", "run", "build"]), None).decision, Decision::Allow);
    }

    #[test]
    fn append_allow_prefix_is_idempotent() {
        let dir = tempdir().unwrap();
        let rules_file = dir.path().join("rules").join("learned.rules");
        let prefix = vec!["git".to_string(), "fetch".to_string()];
        append_allow_prefix(&rules_file, &prefix).unwrap();
        append_allow_prefix(&rules_file, &prefix).unwrap();
        let contents = fs::read_to_string(&rules_file).unwrap();
        let matches = contents.lines().filter(|l| *l == format_allow_prefix_line(&prefix)).count();
        assert_eq!(matches, 1);
        assert!(contents.ends_with('\n'));
    }

    #[test]
    fn append_allow_prefix_rejects_empty_prefix() {
        let dir = tempdir().unwrap();
        let rules_file = dir.path().join("rules.rules");
        assert!(matches!(append_allow_prefix(&rules_file, &[]), Err(PolicyError::EmptyPrefix)));
    }

    #[test]
    fn merges_multiple_rules_files_by_concatenation() {
        let home = tempdir().unwrap();
        let rules_dir = home.path().join("rules");
        write_rules(&rules_dir, "a.rules", r#"prefix_rule(pattern=["git"], decision="allow")"#);
        write_rules(&rules_dir, "b.rules", r#"prefix_rule(pattern=["git", "push"], decision="prompt")"#);
        let policy = ExecPolicy::load(home.path()).unwrap();
        let eval = policy.check(&cmd(&["git", "push"]), None);
        assert_eq!(eval.decision, Decision::Prompt);
        assert_eq!(eval.matched_rules, 2);
    }
}
