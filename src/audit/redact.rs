//! Secret redaction for anything that gets persisted.

use std::borrow::Cow;

use anyhow::Context as _;
use regex::Regex;

pub const REDACTION_MARKER: &str = "[REDACTED]";

// (name, pattern, replacement). Replacements keep captured key names so the
// log still says *what* was hidden.
const SECRET_PATTERNS: &[(&str, &str, &str)] = &[
    (
        "private-key",
        r"(?s)-----BEGIN [A-Z0-9 ]*PRIVATE KEY-----.*?(-----END [A-Z0-9 ]*PRIVATE KEY-----|\z)",
        "[REDACTED]",
    ),
    (
        "connection-string",
        r"(?i)\b([a-z][a-z0-9+.-]*://[^:/@\s]+:)[^@\s/]+@",
        "${1}[REDACTED]@",
    ),
    ("openai-anthropic-key", r"\bsk-(ant-)?[A-Za-z0-9_-]{20,}", "[REDACTED]"),
    (
        "github-token",
        r"\b(gh[pousr]_[A-Za-z0-9]{36,}|github_pat_[A-Za-z0-9_]{22,})",
        "[REDACTED]",
    ),
    ("slack-token", r"\bxox[abprs]-[A-Za-z0-9-]{10,}", "[REDACTED]"),
    ("aws-access-key-id", r"\b(AKIA|ASIA)[0-9A-Z]{16}\b", "[REDACTED]"),
    (
        "aws-secret-access-key",
        r#"(?i)(aws_secret_access_key\s*[=:]\s*)["']?[A-Za-z0-9/+=]{40}["']?"#,
        "${1}[REDACTED]",
    ),
    ("google-api-key", r"\bAIza[0-9A-Za-z_-]{35}", "[REDACTED]"),
    (
        "jwt",
        r"\beyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}",
        "[REDACTED]",
    ),
    ("bearer-token", r"(?i)\b(bearer\s+)[A-Za-z0-9._~+/=-]{8,}", "${1}[REDACTED]"),
    (
        "secret-assignment",
        r#"(?i)\b((api[_-]?key|apikey|secret|password|passwd|pwd|access[_-]?token|auth[_-]?token|token)\s*[=:]\s*)["']?[^\s"',;\[]+["']?"#,
        "${1}[REDACTED]",
    ),
];

struct SecretPattern {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

/// Compiled secret catalog.
pub struct Redactor {
    patterns: Vec<SecretPattern>,
}

impl Redactor {
    pub fn compile() -> anyhow::Result<Self> {
        let patterns = SECRET_PATTERNS
            .iter()
            .map(|&(name, pattern, replacement)| {
                let pattern = Regex::new(pattern)
                    .with_context(|| format!("Invalid secret pattern '{name}'"))?;
                Ok(SecretPattern {
                    name,
                    pattern,
                    replacement,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Replace every secret-shaped substring with [`REDACTION_MARKER`].
    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for secret in &self.patterns {
            if secret.pattern.is_match(&out) {
                let replaced = secret.pattern.replace_all(&out, secret.replacement).into_owned();
                out = Cow::Owned(replaced);
            }
        }
        out
    }

    /// Name of the first secret pattern found in `text`, if any.
    pub fn find_secret(&self, text: &str) -> Option<&'static str> {
        self.patterns
            .iter()
            .find(|s| s.pattern.is_match(text))
            .map(|s| s.name)
    }
}
