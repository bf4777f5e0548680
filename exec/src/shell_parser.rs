//! Shell-script mini-parser.
//!
//! Exposes the constituent commands of a `shell -lc "script"` invocation so
//! that safety classification can be applied uniformly. Any rejection means
//! "treat the script as one opaque command", never "refuse execution here" —
//! callers must not conflate `None` with a safety verdict.

/// If `argv` is `[shell, "-lc"|"-c", script]` for `shell` in `{bash, zsh,
/// sh}` (matched after taking the file's base name), returns the parsed
/// sequence of sub-commands. Otherwise returns `None` without inspecting
/// `script` at all.
#[must_use]
pub fn parse_shell_lc(argv: &[String]) -> Option<Vec<Vec<String>>> {
    if argv.len() != 3 {
        return None;
    }
    let shell_name = base_name(&argv[0]);
    if !matches!(shell_name.as_str(), "bash" | "zsh" | "sh") {
        return None;
    }
    if argv[1] != "-lc" && argv[1] != "-c" {
        return None;
    }
    parse_script(&argv[2])
}

fn base_name(path: &str) -> String {
    path.rsplit(['/', '\\']).next().unwrap_or(path).to_string()
}

/// Parses a shell script into its constituent word-only commands,
/// rejecting any syntax beyond plain words, quotes, and the four
/// recognised operators.
#[must_use]
pub fn parse_script(script: &str) -> Option<Vec<Vec<String>>> {
    let chars: Vec<char> = script.chars().collect();
    let n = chars.len();

    let mut commands: Vec<Vec<String>> = Vec::new();
    let mut current_cmd: Vec<String> = Vec::new();
    let mut word_active = false;
    let mut word_buf = String::new();

    let mut i = 0usize;

    macro_rules! flush_word {
        () => {
            if word_active {
                if current_cmd.is_empty() && is_assignment(&word_buf) {
                    return None;
                }
                current_cmd.push(std::mem::take(&mut word_buf));
                word_active = false;
            }
        };
    }

    while i < n {
        let c = chars[i];

        if c == '$' || c == '`' {
            return None;
        }

        if !word_active && c == '#' {
            while i < n && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        match c {
            '\'' => {
                word_active = true;
                i += 1;
                let mut closed = false;
                while i < n {
                    if chars[i] == '$' || chars[i] == '`' {
                        return None;
                    }
                    if chars[i] == '\'' {
                        closed = true;
                        i += 1;
                        break;
                    }
                    word_buf.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return None;
                }
            }
            '"' => {
                word_active = true;
                i += 1;
                let mut closed = false;
                while i < n {
                    if chars[i] == '$' || chars[i] == '`' {
                        return None;
                    }
                    if chars[i] == '"' {
                        closed = true;
                        i += 1;
                        break;
                    }
                    word_buf.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return None;
                }
            }
            '<' | '>' | '(' | ')' => return None,
            '&' => {
                if i + 1 < n && chars[i + 1] == '&' {
                    flush_word!();
                    if current_cmd.is_empty() {
                        return None;
                    }
                    commands.push(std::mem::take(&mut current_cmd));
                    i += 2;
                } else {
                    return None; // background job
                }
            }
            '|' => {
                flush_word!();
                if current_cmd.is_empty() {
                    return None;
                }
                commands.push(std::mem::take(&mut current_cmd));
                if i + 1 < n && chars[i + 1] == '|' {
                    i += 2;
                } else {
                    i += 1;
                }
            }
            ';' => {
                flush_word!();
                if current_cmd.is_empty() {
                    return None;
                }
                commands.push(std::mem::take(&mut current_cmd));
                i += 1;
            }
            c if c.is_whitespace() => {
                flush_word!();
                i += 1;
            }
            c => {
                word_active = true;
                word_buf.push(c);
                i += 1;
            }
        }
    }

    flush_word!();
    if current_cmd.is_empty() {
        // Either nothing followed the last operator (trailing operator),
        // or the script never produced a word at all (empty result).
        return None;
    }
    commands.push(current_cmd);
    Some(commands)
}

fn is_assignment(word: &str) -> bool {
    let Some(eq) = word.find('=') else { return false };
    if eq == 0 {
        return false;
    }
    let name = &word[..eq];
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
