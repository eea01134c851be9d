//! Security module for command and file-path safety checks.
//!
//! This module inspects a proposed shell command or file write before an
//! agent is allowed to perform it, and renders an allow/block decision with
//! optional warnings. It is a heuristic gate, not a sandbox.

mod allowlist;
mod analyzer;
mod containment;
mod gate;
mod normalizer;
mod taxonomy;
pub mod validate;


use serde::Serialize;

pub use allowlist::{Allowlist, contains_shell_composition};
pub use analyzer::{analyze_command, decide};
pub use containment::{PathChecker, default_extra_roots};
pub use gate::Gate;
pub use normalizer::{MAX_NORMALIZE_PASSES, MAX_SUBSTITUTION_DEPTH, normalize};
pub use taxonomy::{DangerRule, Matcher, RuleSet, Severity};

/// Final verdict of a gate invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allow,
    Block,
}

/// Outcome of a single gate check.
///
/// A `Decision` is never partially populated: a block always carries a
/// non-empty reason, an allow never carries one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

/// Decisions about filesystem targets share the command decision shape.
pub type PathCheckResult = Decision;

impl Decision {
    pub fn allow(warnings: Vec<String>) -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: None,
            warnings,
        }
    }

    pub fn block(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let reason = if reason.trim().is_empty() {
            "Blocked by safety gate".to_string()
        } else {
            reason
        };
        Self {
            verdict: Verdict::Block,
            reason: Some(reason),
            warnings: Vec::new(),
        }
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Combine two checks of the same action: the first block wins,
    /// otherwise warnings accumulate.
    pub fn merge(mut self, other: Decision) -> Decision {
        if self.is_blocked() {
            return self;
        }
        if other.is_blocked() {
            return other;
        }
        for warning in other.warnings {
            self.push_warning(warning);
        }
        self
    }

    /// Append a warning to an allow decision. Blocks ignore warnings.
    pub(crate) fn push_warning(&mut self, warning: impl Into<String>) {
        if self.verdict == Verdict::Allow {
            let warning = warning.into();
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
    }
}
