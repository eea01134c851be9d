//! Command normalization.
//!
//! Rewrites a raw command into a canonical form that strips superficial
//! obfuscation (spacing, variable sigils, binary path prefixes, quoting,
//! command substitution) so the danger taxonomy can match on it. This is a
//! syntactic rewrite, not shell evaluation.

/// Upper bound on full normalization passes.
pub const MAX_NORMALIZE_PASSES: usize = 10;

/// Deepest `$(...)` nesting that is flattened. Deeper wrappers stay literal.
pub const MAX_SUBSTITUTION_DEPTH: usize = 10;

/// Longest prefixes first so `/usr/local/bin/` wins over `/bin/`.
const BINARY_PREFIXES: &[&str] = &[
    "/usr/local/sbin/",
    "/usr/local/bin/",
    "/opt/homebrew/bin/",
    "/usr/sbin/",
    "/usr/bin/",
    "/sbin/",
    "/bin/",
];

/// Normalize a raw command string.
///
/// Runs the rewrite pass until the output stops changing, at most
/// [`MAX_NORMALIZE_PASSES`] times, so the result is a fixpoint for any input
/// that settles within the cap.
pub fn normalize(raw: &str) -> String {
    let mut current = normalize_pass(raw);
    for _ in 1..MAX_NORMALIZE_PASSES {
        let next = normalize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// A single pass. Each step assumes the previous ones already ran.
fn normalize_pass(input: &str) -> String {
    let s = collapse_whitespace(input);
    let s = strip_variable_sigils(&s);
    let s = strip_binary_prefixes(&s);
    let s = strip_quotes_and_escapes(&s);
    let s = flatten_substitutions(&s);
    collapse_whitespace(&s)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// `${name}` -> `name`, `$name` -> `name`, and `${name:-word}` (also with
/// `-`, `=`, `:=`, `+`, `:+`) -> `word`, since the default is what runs when
/// the variable is unset.
fn strip_variable_sigils(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c != '$' {
            out.push(c);
            i += 1;
            continue;
        }

        match chars.get(i + 1) {
            Some('{') => {
                let start = i + 2;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let named = end > start && is_ident_start(chars[start]);
                if named && chars.get(end) == Some(&'}') {
                    out.extend(&chars[start..end]);
                    i = end + 1;
                } else if let Some((word, close)) = named
                    .then(|| default_word(&chars, end))
                    .flatten()
                {
                    out.extend(word);
                    i = close + 1;
                } else {
                    // Substrings, lengths and nested expansions stay as-is.
                    out.push(c);
                    i += 1;
                }
            }
            Some(&next) if is_ident_start(next) => {
                // Drop the sigil, the name follows on the next iterations.
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Word of a `:-`/`-`/`:=`/`=`/`:+`/`+` operator starting at `at`, and the
/// index of the closing brace. Words with nested braces or `$` are rejected.
fn default_word(chars: &[char], at: usize) -> Option<(&[char], usize)> {
    let mut op = at;
    if chars.get(op) == Some(&':') {
        op += 1;
    }
    if !matches!(chars.get(op), Some('-' | '=' | '+')) {
        return None;
    }
    let word_start = op + 1;
    let close = word_start + chars[word_start..].iter().position(|&c| c == '}')?;
    let word = &chars[word_start..close];
    if word.iter().any(|&c| matches!(c, '{' | '$')) {
        return None;
    }
    Some((word, close))
}

fn is_word_boundary(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | '`' | '\'' | '"' | '{'),
    }
}

fn is_command_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+')
}

/// `/usr/bin/rm` -> `rm` when the prefix starts a word and a name follows.
fn strip_binary_prefixes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    let mut rest = s;

    'outer: while !rest.is_empty() {
        if is_word_boundary(prev) {
            for prefix in BINARY_PREFIXES {
                if let Some(after) = rest.strip_prefix(prefix) {
                    if after.chars().next().is_some_and(is_command_name_char) {
                        rest = after;
                        // The stripped prefix ends in '/', which is not a boundary,
                        // so keep `prev` as it was before the prefix.
                        continue 'outer;
                    }
                }
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        out.push(c);
        prev = Some(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Remove quotes around whitespace-free tokens and backslashes before a word
/// character: `"rm"` -> `rm`, `r''m` -> `rm`, `\rm` -> `rm`.
fn strip_quotes_and_escapes(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let close = chars[i + 1..].iter().position(|&x| x == c).map(|p| i + 1 + p);
                match close {
                    Some(j) if !chars[i + 1..j].iter().any(|x| x.is_whitespace()) => {
                        out.extend(&chars[i + 1..j]);
                        i = j + 1;
                    }
                    _ => {
                        out.push(c);
                        i += 1;
                    }
                }
            }
            '\\' if chars.get(i + 1).is_some_and(|&n| is_ident_char(n)) => {
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Replace `$(inner)` and `` `inner` `` with `inner`.
///
/// A single scan matches delimiters with a stack, so every nesting level up
/// to [`MAX_SUBSTITUTION_DEPTH`] is flattened at once. Unbalanced delimiters
/// and wrappers nested deeper than the cap are left untouched.
fn flatten_substitutions(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut drop = vec![false; chars.len()];
    // (index of opening char, whether it opened a flattened substitution)
    let mut stack: Vec<(usize, bool)> = Vec::new();
    let mut depth = 0usize;
    let mut backticks: Vec<usize> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\\' => {
                // Escaped delimiter is literal.
                i += 2;
                continue;
            }
            '$' if chars.get(i + 1) == Some(&'(') => {
                let flatten = depth < MAX_SUBSTITUTION_DEPTH;
                if flatten {
                    depth += 1;
                }
                stack.push((i, flatten));
                i += 2;
                continue;
            }
            '(' => stack.push((i, false)),
            ')' => {
                if let Some((open, flattened)) = stack.pop() {
                    if flattened {
                        drop[open] = true;
                        drop[open + 1] = true;
                        drop[i] = true;
                        depth -= 1;
                    }
                }
            }
            '`' => backticks.push(i),
            _ => {}
        }
        i += 1;
    }

    for pair in backticks.chunks_exact(2) {
        drop[pair[0]] = true;
        drop[pair[1]] = true;
    }

    chars
        .iter()
        .zip(drop)
        .filter(|(_, dropped)| !dropped)
        .map(|(c, _)| *c)
        .collect()
}
