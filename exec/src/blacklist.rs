//! Always-deny command blacklist (SPEC_FULL §4.2 expansion).
//!
//! Orthogonal to [`crate::safety`]: a regex-based layer of patterns with no
//! legitimate assistant use case (root filesystem wipes, fork bombs, disk
//! device overwrites). It never turns a blacklisted command into "safe",
//! and it is not consulted by `is_known_safe`/`might_be_dangerous`
//! themselves — callers run it as an independent, always-on check.

use regex::RegexSet;

/// Default blacklist patterns: `(regex, human-readable reason)`.
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    (
        r"(?i)\brm\s+(?:(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*|(?:--[\w-]+|-[^\s]+)\s+(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*)\s+(?:--\s+)?(?:/+|/\*|/\.\*(?:/+)?|/(?:\.{1,2})(?:/\.{1,2})*(?:/+)?|/(?:\.{1,2})(?:/\.{1,2})*/+\*)(?:\s|$|[&|;])",
        "Attempting to delete root filesystem",
    ),
    (
        r"(?i)\brm\s+(?:(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*|(?:--[\w-]+|-[^\s]+)\s+(?:--recursive|-[^\s-]*[rR][^\s-]*)(?:\s+(?:--[\w-]+|-[^\s]+))*)\s+(?:--\s+)?(?:~|\$HOME|\$\{HOME\})(?:\s|$|[&|;/])",
        "Attempting to delete home directory",
    ),
    (r":\(\)\s*\{\s*:\|:&\s*\}\s*;:", "Fork bomb detected"),
    (
        r"(?i)dd\s+.*of=/dev/(?:sd|hd|nvme|vd|xvd|loop)\w*",
        "Attempting to overwrite disk device",
    ),
    (
        r"(?i)mkfs(?:\.\w+)?\s+/dev/(?:sd|hd|nvme|vd|xvd)\w*",
        "Attempting to format disk device",
    ),
    (
        r"(?i)chmod\s+-R\s+\d+\s+/(?:\s|$|[&|;])",
        "Recursive permission change on root filesystem",
    ),
];

/// A blacklisted command was detected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("command blocked: {reason} (command: {command})")]
pub struct BlacklistViolation {
    pub command: String,
    pub reason: String,
}

/// A compiled, reusable blacklist.
#[derive(Debug, Clone)]
pub struct CommandBlacklist {
    regex_set: RegexSet,
    reasons: Vec<String>,
}

/// A pattern failed to compile as a regex.
#[derive(Debug, thiserror::Error)]
#[error("failed to compile blacklist patterns: {0}")]
pub struct BlacklistCompileError(String);

impl CommandBlacklist {
    /// # Errors
    /// Returns [`BlacklistCompileError`] if any pattern fails to compile.
    pub fn new(patterns: &[(&str, &str)]) -> Result<Self, BlacklistCompileError> {
        let pattern_strs: Vec<&str> = patterns.iter().map(|(p, _)| *p).collect();
        let reasons = patterns.iter().map(|(_, r)| (*r).to_string()).collect();
        let regex_set =
            RegexSet::new(&pattern_strs).map_err(|e| BlacklistCompileError(e.to_string()))?;
        Ok(Self { regex_set, reasons })
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_PATTERNS).expect("default patterns always compile")
    }

    /// Returns `Ok(())` if `command` is allowed, or the first matching
    /// violation otherwise.
    pub fn validate(&self, command: &str) -> Result<(), BlacklistViolation> {
        let matches: Vec<usize> = self.regex_set.matches(command).iter().collect();
        if let Some(&idx) = matches.first() {
            return Err(BlacklistViolation {
                command: truncate_command(command, 200),
                reason: self.reasons[idx].clone(),
            });
        }
        Ok(())
    }
}

fn truncate_command(cmd: &str, max_len: usize) -> String {
    if cmd.len() <= max_len {
        return cmd.to_string();
    }
    let mut end = max_len;
    while end > 0 && !cmd.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &cmd[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_blacklist() -> CommandBlacklist {
        CommandBlacklist::with_defaults()
    }

    #[test]
    fn blocks_rm_rf_root() {
        let bl = default_blacklist();
        assert!(bl.validate("rm -rf /").is_err());
        assert!(bl.validate("rm -rf /*").is_err());
        assert!(bl.validate("sudo rm -rf /").is_err());
    }

    #[test]
    fn blocks_rm_rf_home() {
        let bl = default_blacklist();
        assert!(bl.validate("rm -rf ~").is_err());
        assert!(bl.validate("rm -rf $HOME").is_err());
    }

    #[test]
    fn blocks_fork_bomb() {
        assert!(default_blacklist().validate(":(){ :|:& };:").is_err());
    }

    #[test]
    fn blocks_dd_and_mkfs_device_writes() {
        let bl = default_blacklist();
        assert!(bl.validate("dd if=/dev/zero of=/dev/sda").is_err());
        assert!(bl.validate("mkfs.ext4 /dev/sda1").is_err());
    }

    #[test]
    fn allows_safe_and_scoped_commands() {
        let bl = default_blacklist();
        assert!(bl.validate("ls -la").is_ok());
        assert!(bl.validate("rm -rf ./build").is_ok());
        assert!(bl.validate("rm -rf /tmp/test").is_ok());
    }
}
