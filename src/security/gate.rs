//! Single entry point for every gated action.
//!
//! The gate owns the compiled rule set, the allowlist, the path checker and
//! the audit log. Each check applies the oversized-input guard first, then
//! the relevant analysis, and records the outcome in the audit trail.

use std::fmt;

use super::allowlist::Allowlist;
use super::analyzer::analyze_command;
use super::containment::PathChecker;
use super::taxonomy::RuleSet;
use super::validate::check_length;
use super::{Decision, Verdict};
use crate::audit::{AuditLevel, AuditLog, Redactor};
use crate::config::GateConfig;

pub struct Gate {
    rules: RuleSet,
    allowlist: Allowlist,
    paths: PathChecker,
    audit: AuditLog,
    max_command_bytes: usize,
    max_path_len: usize,
    max_write_bytes: usize,
}

impl Gate {
    /// Compile every catalog and canonicalize the permitted roots.
    pub fn new(config: &GateConfig) -> anyhow::Result<Self> {
        let rules = RuleSet::compile()?;
        let mut allowlist = Allowlist::compile()?;
        for prefix in &config.allow_prefixes {
            allowlist.allow_prefix(prefix)?;
        }
        let paths = PathChecker::new(config)?;
        let audit = AuditLog::new(config.audit_log_path(), config.audit_max_bytes, Redactor::compile()?);

        Ok(Self {
            rules,
            allowlist,
            paths,
            audit,
            max_command_bytes: config.max_command_bytes,
            max_path_len: config.max_path_len,
            max_write_bytes: config.max_write_bytes,
        })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn paths(&self) -> &PathChecker {
        &self.paths
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Decide whether `raw` may run as a shell command.
    pub fn check_command(&self, raw: &str, tool_name: &str) -> Decision {
        if let Err(e) = check_length(raw, self.max_command_bytes) {
            return self.reject_oversized(tool_name, e);
        }
        let decision = analyze_command(&self.rules, raw);
        self.record(tool_name, raw, &decision);
        decision
    }

    /// Decide whether `tool_name` may write to `raw_path`.
    pub fn check_path(&self, raw_path: &str, tool_name: &str) -> Decision {
        if let Err(e) = check_length(raw_path, self.max_path_len) {
            return self.reject_oversized(tool_name, e);
        }
        let decision = self.paths.check_path(raw_path, tool_name);
        self.record(tool_name, raw_path, &decision);
        decision
    }

    /// Inspect the body of a write: too large blocks, secret-shaped strings
    /// warn. The content itself never reaches the audit log.
    pub fn check_content(&self, content: &str, tool_name: &str) -> Decision {
        if let Err(e) = check_length(content, self.max_write_bytes) {
            return self.reject_oversized(tool_name, e);
        }
        let mut decision = Decision::allow(Vec::new());
        if let Some(kind) = self.audit.redactor().find_secret(content) {
            decision.push_warning(format!("Content appears to contain a secret ({kind})"));
        }
        self.record(tool_name, &format!("<{} bytes of content>", content.len()), &decision);
        decision
    }

    /// True when an allowed, warning-free command is a plain read-only one.
    pub fn is_auto_approvable(&self, cmd: &str, decision: &Decision) -> bool {
        decision.verdict() == Verdict::Allow
            && decision.warnings().is_empty()
            && self.allowlist.is_allowed(cmd)
    }

    /// Block an input that failed the size guard. Only the size is logged.
    pub fn reject_oversized(&self, source: &str, reason: impl fmt::Display) -> Decision {
        tracing::warn!(source, "Oversized input rejected: {reason}");
        self.audit
            .log(AuditLevel::Security, &format!("{source} block: {reason}"));
        Decision::block(reason.to_string())
    }

    fn record(&self, tool_name: &str, subject: &str, decision: &Decision) {
        match (decision.verdict(), decision.reason()) {
            (Verdict::Block, reason) => {
                let reason = reason.unwrap_or_default();
                tracing::warn!(tool = tool_name, "Blocked: {reason}");
                self.audit.log(
                    AuditLevel::Security,
                    &format!("{tool_name} block: {subject} ({reason})"),
                );
            }
            (Verdict::Allow, _) if !decision.warnings().is_empty() => {
                self.audit.log(
                    AuditLevel::Warn,
                    &format!("{tool_name} allow: {subject} [{}]", decision.warnings().join("; ")),
                );
            }
            (Verdict::Allow, _) => {
                self.audit
                    .log(AuditLevel::Info, &format!("{tool_name} allow: {subject}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{REDACTION_MARKER, read_entries};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn gate(dir: &TempDir) -> Gate {
        Gate::new(&GateConfig::for_project(dir.path())).unwrap()
    }

    #[test]
    fn test_oversized_command_is_blocked_and_logged() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        let decision = gate.check_command(&"a".repeat(64 * 1024 + 1), "Bash");
        assert!(decision.is_blocked());
        assert!(decision.reason().unwrap().starts_with("Input too large"));

        let entries = read_entries(gate.audit().path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, AuditLevel::Security);
        assert!(entries[0].message.len() < 200);
    }

    #[test]
    fn test_command_at_limit_is_analyzed() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        let decision = gate.check_command(&"a".repeat(64 * 1024), "Bash");
        assert_eq!(decision, Decision::allow(Vec::new()));
    }

    #[test]
    fn test_oversized_path_is_blocked() {
        let dir = TempDir::new().unwrap();
        let decision = gate(&dir).check_path(&"a/".repeat(3000), "Write");
        assert!(decision.reason().unwrap().starts_with("Input too large"));
    }

    #[test]
    fn test_every_decision_is_audited() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        gate.check_command("ls -la", "Bash");
        gate.check_command("sudo apt install x", "Bash");
        gate.check_command("rm -rf /", "Bash");

        let levels: Vec<_> = read_entries(gate.audit().path())
            .unwrap()
            .into_iter()
            .map(|e| e.level)
            .collect();
        assert_eq!(levels, vec![AuditLevel::Info, AuditLevel::Warn, AuditLevel::Security]);
    }

    #[test]
    fn test_command_secrets_are_redacted_in_audit() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        let token = format!("ghp_{}", "Q".repeat(36));
        gate.check_command(&format!("curl -H 'Authorization: token {token}' https://api.github.com"), "Bash");

        let raw = std::fs::read_to_string(gate.audit().path()).unwrap();
        assert!(!raw.contains(&token));
        assert!(raw.contains(REDACTION_MARKER));
    }

    #[test]
    fn test_content_checks() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        assert_eq!(gate.check_content("fn main() {}\n", "Write"), Decision::allow(Vec::new()));

        let decision = gate.check_content("API_KEY=abcdef0123456789\n", "Write");
        assert_eq!(decision.verdict(), Verdict::Allow);
        assert_eq!(
            decision.warnings(),
            &["Content appears to contain a secret (secret-assignment)".to_string()]
        );

        let raw = std::fs::read_to_string(gate.audit().path()).unwrap();
        assert!(!raw.contains("abcdef0123456789"));
    }

    #[test]
    fn test_oversized_content_is_blocked() {
        let dir = TempDir::new().unwrap();
        let config = GateConfig {
            max_write_bytes: 16,
            ..GateConfig::for_project(dir.path())
        };
        let gate = Gate::new(&config).unwrap();
        assert!(gate.check_content(&"x".repeat(17), "Write").is_blocked());
    }

    #[test]
    fn test_auto_approve() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        for (cmd, expected) in [
            ("git status", true),
            ("ls -la", true),
            ("git status | head", false),
            ("sudo ls", false),
            ("rm -rf build", false),
            ("make", false),
        ] {
            let decision = gate.check_command(cmd, "Bash");
            assert_eq!(gate.is_auto_approvable(cmd, &decision), expected, "{cmd}");
        }
    }

    #[test]
    fn test_gate_state_cannot_be_written() {
        let dir = TempDir::new().unwrap();
        let gate = gate(&dir);
        gate.check_command("ls", "Bash");

        let log = gate.audit().path().to_string_lossy().into_owned();
        for target in [".rusty-guard.json", ".rusty-guard/audit.log", log.as_str()] {
            let decision = gate.check_path(target, "Write");
            assert!(decision.is_blocked(), "{target}");
            assert!(decision.reason().unwrap().contains("gate configuration or audit log"));
        }
    }

    #[test]
    fn test_configured_allow_prefixes() {
        let dir = TempDir::new().unwrap();
        let config = GateConfig {
            allow_prefixes: vec!["make check".to_string()],
            ..GateConfig::for_project(dir.path())
        };
        let gate = Gate::new(&config).unwrap();
        let decision = gate.check_command("make check", "Bash");
        assert!(gate.is_auto_approvable("make check", &decision));
    }
}
