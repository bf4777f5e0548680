//! Exec-policy rule and evaluation types.

use serde::{Deserialize, Serialize};

/// A decision an exec-policy rule (or the approval-mode fallback) can
/// produce. Ordered `Allow < Prompt < Forbidden` so that aggregation over
/// multiple commands is a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Prompt,
    Forbidden,
}

impl Decision {
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }
}

/// One token of a prefix-rule pattern: either a single literal or a
/// non-empty set of alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternToken {
    Literal(String),
    Alternatives(Vec<String>),
}

impl PatternToken {
    #[must_use]
    pub fn matches(&self, word: &str) -> bool {
        match self {
            Self::Literal(lit) => lit == word,
            Self::Alternatives(alts) => alts.iter().any(|alt| alt == word),
        }
    }

    /// The single literal this token represents, if it is not an
    /// alternation. Used to index rules by first token.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(lit) => Some(lit.as_str()),
            Self::Alternatives(_) => None,
        }
    }
}

/// The session-wide policy that decides the fallback decision when no
/// exec-policy rule matches a command (spec §6). Unknown mode strings fall
/// back to [`ApprovalMode::Prompt`] rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalMode {
    Never,
    OnFailure,
    UnlessTrusted,
    Prompt,
}

impl ApprovalMode {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "never" => Self::Never,
            "on-failure" => Self::OnFailure,
            "unless-trusted" => Self::UnlessTrusted,
            _ => Self::Prompt,
        }
    }
}

impl Default for ApprovalMode {
    fn default() -> Self {
        Self::Prompt
    }
}

/// A prefix rule: matches a command `cmd` iff `len(cmd) >= len(pattern)` and
/// every position matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub pattern: Vec<PatternToken>,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

impl PolicyRule {
    #[must_use]
    pub fn matches(&self, cmd: &[String]) -> bool {
        if cmd.len() < self.pattern.len() {
            return false;
        }
        self.pattern
            .iter()
            .zip(cmd.iter())
            .all(|(token, word)| token.matches(word))
    }
}

/// The result of evaluating one or more commands against a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub matched_rules: usize,
    pub justification: Option<String>,
    pub used_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_mode_parses_known_flags() {
        assert_eq!(ApprovalMode::parse("never"), ApprovalMode::Never);
        assert_eq!(ApprovalMode::parse("on-failure"), ApprovalMode::OnFailure);
        assert_eq!(ApprovalMode::parse("unless-trusted"), ApprovalMode::UnlessTrusted);
        assert_eq!(ApprovalMode::parse("prompt"), ApprovalMode::Prompt);
    }

    #[test]
    fn approval_mode_unknown_flag_falls_back_to_prompt() {
        assert_eq!(ApprovalMode::parse("yolo"), ApprovalMode::Prompt);
    }

    #[test]
    fn decision_ordering() {
        assert!(Decision::Allow < Decision::Prompt);
        assert!(Decision::Prompt < Decision::Forbidden);
        assert_eq!(Decision::Allow.max(Decision::Forbidden), Decision::Forbidden);
    }

    #[test]
    fn literal_token_matches_exact_word() {
        let token = PatternToken::Literal("git".into());
        assert!(token.matches("git"));
        assert!(!token.matches("Git"));
    }

    #[test]
    fn alternatives_token_matches_any() {
        let token = PatternToken::Alternatives(vec!["status".into(), "log".into()]);
        assert!(token.matches("status"));
        assert!(token.matches("log"));
        assert!(!token.matches("reset"));
    }

    #[test]
    fn rule_requires_command_at_least_as_long_as_pattern() {
        let rule = PolicyRule {
            pattern: vec![PatternToken::Literal("git".into()), PatternToken::Literal("reset".into())],
            decision: Decision::Forbidden,
            justification: None,
        };
        assert!(!rule.matches(&["git".into()]));
        assert!(rule.matches(&["git".into(), "reset".into()]));
        assert!(rule.matches(&["git".into(), "reset".into(), "--hard".into()]));
    }
}
