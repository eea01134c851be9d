//! Hook event I/O: one JSON event in on stdin, one JSON decision out.

use std::io::{self, Read};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::security::{Decision, Gate};

/// Tools whose target is a file path.
const FILE_TOOLS: &[&str] = &["Write", "Edit", "MultiEdit", "NotebookEdit"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: ToolInput,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolInput {
    pub command: Option<String>,
    pub file_path: Option<String>,
    pub path: Option<String>,
    pub notebook_path: Option<String>,
    pub content: Option<String>,
    pub new_string: Option<String>,
    /// `MultiEdit` carries its replacements here.
    #[serde(default)]
    pub edits: Vec<EditOp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditOp {
    #[serde(default)]
    pub new_string: String,
}

impl ToolInput {
    pub fn target_path(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .or(self.path.as_deref())
            .or(self.notebook_path.as_deref())
    }

    /// Every piece of text the tool is about to write.
    pub fn written_texts(&self) -> impl Iterator<Item = &str> {
        self.content
            .as_deref()
            .into_iter()
            .chain(self.new_string.as_deref())
            .chain(self.edits.iter().map(|e| e.new_string.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookOutput {
    #[serde(flatten)]
    pub decision: Decision,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_approve: bool,
}

impl From<Decision> for HookOutput {
    fn from(decision: Decision) -> Self {
        Self {
            decision,
            auto_approve: false,
        }
    }
}

/// Result of reading at most `limit` bytes of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bounded {
    Complete(String),
    TooLarge { limit: usize },
}

/// Read the whole stream unless it exceeds `limit` bytes.
///
/// Reads at most `limit + 1` bytes so an oversized stream is never
/// buffered in full. Invalid UTF-8 is replaced, parsing will reject it.
pub fn read_bounded(reader: impl Read, limit: usize) -> io::Result<Bounded> {
    let mut buf = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut buf)?;
    if buf.len() > limit {
        return Ok(Bounded::TooLarge { limit });
    }
    Ok(Bounded::Complete(String::from_utf8_lossy(&buf).into_owned()))
}

/// Parse a hook event. Malformed events yield `None`.
pub fn parse_input(raw: &str) -> Option<HookInput> {
    match serde_json::from_str(raw) {
        Ok(input) => Some(input),
        Err(e) => {
            tracing::warn!("Ignoring malformed hook input: {e}");
            None
        }
    }
}

/// Route a hook event to the matching gate check.
///
/// Events missing the field a check needs are allowed: a malformed event
/// carries nothing to run.
pub fn evaluate(gate: &Gate, input: &HookInput) -> HookOutput {
    let tool = input.tool_name.as_str();

    if tool == "Bash" {
        let Some(command) = input.tool_input.command.as_deref() else {
            return Decision::allow(Vec::new()).into();
        };
        let decision = gate.check_command(command, tool);
        let auto_approve = gate.is_auto_approvable(command, &decision);
        return HookOutput {
            decision,
            auto_approve,
        };
    }

    if FILE_TOOLS.contains(&tool) {
        let Some(path) = input.tool_input.target_path() else {
            return Decision::allow(Vec::new()).into();
        };
        let mut decision = gate.check_path(path, tool);
        for text in input.tool_input.written_texts() {
            if decision.is_blocked() {
                break;
            }
            decision = decision.merge(gate.check_content(text, tool));
        }
        return decision.into();
    }

    tracing::debug!(tool, "Tool is not gated");
    Decision::allow(Vec::new()).into()
}
