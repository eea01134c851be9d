//! Read-only command allowlist.
//!
//! Commands that match one of these prefixes and contain no shell
//! composition are flagged as auto-approvable: the host may run them without
//! asking a human. The allowlist never overrides a block.

use anyhow::Context as _;
use regex::Regex;

const READ_ONLY_PATTERNS: &[&str] = &[
    // Read-only file operations
    r"^ls(\s|$)",
    r"^cat\s",
    r"^head\s",
    r"^tail\s",
    r"^wc\s",
    r"^diff\s",
    r"^file\s",
    r"^stat\s",
    r"^du\s",
    r"^df(\s|$)",
    r"^pwd$",
    r"^which\s",
    r"^whereis\s",
    r"^type\s",
    r"^realpath\s",
    r"^dirname\s",
    r"^basename\s",
    // Git read operations
    r"^git\s+status",
    r"^git\s+log",
    r"^git\s+diff",
    r"^git\s+show",
    r"^git\s+branch(\s+-[alr]|\s*$)",
    r"^git\s+remote\s+-v",
    r"^git\s+config\s+--get",
    r"^git\s+rev-parse",
    r"^git\s+describe",
    r"^git\s+ls-files",
    r"^git\s+ls-tree",
    r"^git\s+blame",
    r"^git\s+shortlog",
    r"^git\s+stash\s+list",
    // Package info
    r"^npm\s+(list|ls|outdated|view|info|search)\b",
    r"^yarn\s+(list|info|why)\b",
    r"^pip[0-9.]*\s+(list|show|freeze|check)\b",
    r"^poetry\s+show\b",
    r"^cargo\s+tree\b",
    r"^go\s+list\b",
    // Tests and linters
    r"^npm\s+(run\s+)?test\b",
    r"^npm\s+run\s+lint\b",
    r"^yarn\s+(test|lint)\b",
    r"^(pytest|jest|vitest|mocha|rspec|phpunit)\b",
    r"^cargo\s+(test|check|clippy)\b",
    r"^cargo\s+fmt\s+--check\b",
    r"^go\s+(test|vet)\b",
    r"^(ruff\s+check|mypy|pyright|flake8|pylint|shellcheck|rubocop)\b",
    r"^black\s+--check\b",
    r"^(npx\s+|yarn\s+)?tsc\s+--noEmit\b",
    // Environment info
    r"^(node|npm|python3?|cargo|rustc|ruby|php|java|dotnet)\s+--version$",
    r"^go\s+version$",
    // Process info
    r"^ps(\s|$)",
    r"^pgrep\s",
];

pub struct Allowlist {
    patterns: Vec<Regex>,
}

impl Allowlist {
    /// Compile the built-in read-only set.
    pub fn compile() -> anyhow::Result<Self> {
        let patterns = READ_ONLY_PATTERNS
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid allowlist pattern: {p}")))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Allow every command starting with the literal `prefix`.
    pub fn allow_prefix(&mut self, prefix: &str) -> anyhow::Result<()> {
        let pattern = format!("^{}", regex::escape(prefix.trim_start()));
        let re = Regex::new(&pattern).with_context(|| format!("Invalid allowlist prefix: {prefix}"))?;
        self.patterns.push(re);
        Ok(())
    }

    /// True for a single, uncomposed command matching a read-only prefix.
    pub fn is_allowed(&self, cmd: &str) -> bool {
        let trimmed = cmd.trim();
        if trimmed.is_empty() || contains_shell_composition(trimmed) {
            return false;
        }
        self.patterns.iter().any(|p| p.is_match(trimmed))
    }
}

/// Check if command contains shell composition tokens
/// (`|`, `;`, `&&`, `||`, `>`, `<`, `$(`, backticks, `&`, newline).
pub fn contains_shell_composition(cmd: &str) -> bool {
    if cmd.contains(['|', ';', '>', '<', '`', '\n']) {
        return true;
    }

    if cmd.contains("$(") || cmd.contains("${") {
        return true;
    }

    // Any `&` is either `&&` or background execution.
    cmd.contains('&')
}
