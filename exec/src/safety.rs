//! Command-safety classifier.
//!
//! Two public decisions: [`is_known_safe`] and [`might_be_dangerous`].
//! Neither predicate raises; an unparsed or unknown command is merely "not
//! known safe" and "not known dangerous" — absence of a verdict is not a
//! verdict.

use regex::Regex;
use std::sync::OnceLock;

use crate::shell_parser::parse_shell_lc;

/// Read-only utilities that are always known-safe regardless of arguments.
const READ_ONLY_WHITELIST: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "wc", "pwd", "id", "which", "echo", "true", "false",
    "whoami", "uname", "date", "file", "basename", "dirname", "printenv", "env", "hostname",
    "nl", "cut", "sort", "uniq", "tree",
];

fn find_mutating_flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-exec.*$|^-ok.*$|^-delete$|^-fls$|^-fprint.*$").unwrap())
}

fn sed_addr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+|\d+,\d+)p$").unwrap())
}

/// True iff `cmd` is a read-only invocation under the fixed whitelist, or a
/// structured invocation that passes its per-tool rule, or a recursively
/// safe `shell -lc` script. Shells are not special-cased beyond
/// what [`parse_shell_lc`] already normalises (`bash`/`zsh`/`sh` are
/// interchangeable there).
#[must_use]
pub fn is_known_safe(cmd: &[String]) -> bool {
    if cmd.is_empty() {
        return false;
    }
    // Tie-break: dangerous always wins, even though the definitions below
    // are constructed so the two predicates never actually overlap.
    if might_be_dangerous(cmd) {
        return false;
    }
    if let Some(sub_commands) = parse_shell_lc(cmd) {
        return !sub_commands.is_empty() && sub_commands.iter().all(|c| is_known_safe(c));
    }

    let head = cmd[0].as_str();
    if READ_ONLY_WHITELIST.contains(&head) {
        return true;
    }

    let rest = &cmd[1..];
    match head {
        "base64" => !has_any_flag(rest, &["-o", "--output"]),
        "find" => !rest.iter().any(|a| find_mutating_flag_re().is_match(a)),
        "rg" => !has_any_flag(rest, &["--pre", "--hostname-bin", "--search-zip", "-z"]),
        "sed" => is_safe_sed_invocation(cmd),
        "git" => is_safe_git_invocation(cmd),
        _ => false,
    }
}

fn has_any_flag(args: &[String], flags: &[&str]) -> bool {
    args.iter().any(|a| {
        flags.iter().any(|f| a == f || (f.starts_with("--") && a.starts_with(&format!("{f}="))))
    })
}

fn is_safe_sed_invocation(cmd: &[String]) -> bool {
    if cmd.len() < 3 || cmd[1] != "-n" {
        return false;
    }
    if !sed_addr_re().is_match(&cmd[2]) {
        return false;
    }
    cmd.len() <= 4
}

fn is_safe_git_invocation(cmd: &[String]) -> bool {
    if cmd.iter().any(|a| a == "-c" || a.starts_with("--config-env")) {
        return false;
    }
    let args = &cmd[1..];
    let Some(sub_idx) = args.iter().position(|a| !a.starts_with('-')) else {
        return false;
    };
    let subcommand = args[sub_idx].as_str();
    match subcommand {
        "status" | "log" | "diff" | "show" => true,
        "branch" => args[sub_idx + 1..].iter().all(|a| is_readonly_branch_flag(a)),
        _ => false,
    }
}

fn is_readonly_branch_flag(a: &str) -> bool {
    matches!(a, "-a" | "--all" | "-l" | "--list" | "-v" | "-vv" | "--verbose" | "-r" | "--remotes")
}

/// True when `cmd0` or a recursively-inspected `shell -lc` sub-command is
/// one of the fixed dangerous shapes.
#[must_use]
pub fn might_be_dangerous(cmd: &[String]) -> bool {
    if cmd.is_empty() {
        return false;
    }
    if let Some(sub_commands) = parse_shell_lc(cmd) {
        return sub_commands.iter().any(|c| might_be_dangerous(c));
    }
    match cmd[0].as_str() {
        "rm" => is_dangerous_rm(&cmd[1..]),
        "sudo" => might_be_dangerous(&cmd[1..]),
        "git" => is_dangerous_git(&cmd[1..]),
        _ => false,
    }
}

fn is_dangerous_rm(args: &[String]) -> bool {
    args.iter().any(|a| is_force_flag(a))
}

fn is_force_flag(a: &str) -> bool {
    a == "--force" || (a.starts_with('-') && !a.starts_with("--") && a.contains('f'))
}

fn is_dangerous_git(args: &[String]) -> bool {
    let Some(sub_idx) = args.iter().position(|a| !a.starts_with('-')) else {
        return false;
    };
    let subcommand = args[sub_idx].as_str();
    let rest = &args[sub_idx + 1..];
    match subcommand {
        "reset" | "rm" => true,
        "branch" => rest.iter().any(|a| is_branch_delete_flag(a)),
        "push" => rest.iter().any(|a| is_push_dangerous_flag(a)),
        "clean" => rest.iter().any(|a| is_force_flag(a)),
        _ => false,
    }
}

fn is_branch_delete_flag(a: &str) -> bool {
    if a == "--delete" || a == "-d" || a == "-D" {
        return true;
    }
    a.starts_with('-') && !a.starts_with("--") && (a.contains('d') || a.contains('D'))
}

fn is_push_dangerous_flag(a: &str) -> bool {
    a.starts_with("--force")
        || a == "-f"
        || a == "--delete"
        || a == "-d"
        || a.starts_with('+')
        || a.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn git_reset_hard_via_shell_lc_is_dangerous_not_safe() {
        let c = cmd(&["bash", "-lc", "git reset --hard"]);
        assert!(might_be_dangerous(&c));
        assert!(!is_known_safe(&c));
    }

    #[test]
    fn git_status_is_safe_not_dangerous() {
        let c = cmd(&["git", "status"]);
        assert!(is_known_safe(&c));
        assert!(!might_be_dangerous(&c));
    }

    #[test]
    fn git_checkout_reset_first_token_is_subcommand() {
        let c = cmd(&["git", "checkout", "reset"]);
        assert!(!might_be_dangerous(&c));
    }

    #[test]
    fn whitelisted_commands_are_known_safe() {
        for tool in READ_ONLY_WHITELIST {
            assert!(is_known_safe(&cmd(&[tool])), "{tool} should be known safe");
        }
    }

    #[test]
    fn dangerous_commands_are_flagged() {
        assert!(might_be_dangerous(&cmd(&["rm", "-rf", "/tmp/x"])));
        assert!(might_be_dangerous(&cmd(&["rm", "-f", "file"])));
        assert!(might_be_dangerous(&cmd(&["sudo", "rm", "-rf", "/"])));
        assert!(might_be_dangerous(&cmd(&["git", "push", "--force"])));
        assert!(might_be_dangerous(&cmd(&["git", "push", "origin", "+main"])));
        assert!(might_be_dangerous(&cmd(&["git", "push", "origin", ":main"])));
        assert!(might_be_dangerous(&cmd(&["git", "branch", "-D", "feature"])));
        assert!(might_be_dangerous(&cmd(&["git", "clean", "-f"])));
    }

    #[test]
    fn dangerous_wrapped_in_shell_lc_is_preserved() {
        let c = cmd(&["bash", "-lc", "rm -rf /tmp/x"]);
        assert!(might_be_dangerous(&c));
    }

    #[test]
    fn base64_without_output_flag_is_safe() {
        assert!(is_known_safe(&cmd(&["base64", "file.txt"])));
        assert!(!is_known_safe(&cmd(&["base64", "-o", "out.b64", "file.txt"])));
    }

    #[test]
    fn find_without_exec_is_safe() {
        assert!(is_known_safe(&cmd(&["find", ".", "-name", "*.rs"])));
        assert!(!is_known_safe(&cmd(&["find", ".", "-exec", "rm", "{}", ";"])));
        assert!(!is_known_safe(&cmd(&["find", ".", "-delete"])));
    }

    #[test]
    fn ripgrep_without_pre_is_safe() {
        assert!(is_known_safe(&cmd(&["rg", "foo"])));
        assert!(!is_known_safe(&cmd(&["rg", "--pre", "cat", "foo"])));
    }

    #[test]
    fn sed_print_range_is_safe() {
        assert!(is_known_safe(&cmd(&["sed", "-n", "5p", "file.txt"])));
        assert!(is_known_safe(&cmd(&["sed", "-n", "2,5p", "file.txt"])));
        assert!(!is_known_safe(&cmd(&["sed", "-i", "s/a/b/", "file.txt"])));
    }

    #[test]
    fn git_branch_list_is_safe_but_delete_is_not() {
        assert!(is_known_safe(&cmd(&["git", "branch", "-a"])));
        assert!(!is_known_safe(&cmd(&["git", "branch", "-D", "feature"])));
    }

    #[test]
    fn git_with_config_override_is_never_safe() {
        assert!(!is_known_safe(&cmd(&["git", "-c", "user.name=x", "status"])));
    }

    #[test]
    fn empty_command_is_neither() {
        let c: Vec<String> = vec![];
        assert!(!is_known_safe(&c));
        assert!(!might_be_dangerous(&c));
    }

    #[test]
    fn unknown_command_is_neither() {
        let c = cmd(&["some-random-tool", "--flag"]);
        assert!(!is_known_safe(&c));
        assert!(!might_be_dangerous(&c));
    }
}
