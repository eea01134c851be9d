//! Main entry point for the rusty-guard hook.
//!
//! Reads one hook event from stdin, writes one JSON decision to stdout and
//! always exits with status 0. The host reads the verdict, not the status.

use std::io::{self, Write as _};

use rusty_guard::config::{self, GateConfig};
use rusty_guard::hook::{self, Bounded, HookOutput};
use rusty_guard::security::{Decision, Gate};
use rusty_guard::utils;

fn main() {
    let _log_guard = utils::logger::init_logging(utils::logger::default_log_dir().as_deref());

    let output = run();
    let line = match serde_json::to_string(&output) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!("Failed to serialize decision: {e}");
            r#"{"verdict":"block","reason":"Safety gate failed to encode its decision"}"#.to_string()
        }
    };

    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
        tracing::error!("Failed to write decision: {e}");
    }
}

fn run() -> HookOutput {
    // The hook cwd is only known after parsing, so size the read from the
    // environment-level configuration.
    let bootstrap = config::load_config(None);

    let raw = match hook::read_bounded(io::stdin().lock(), bootstrap.max_input_bytes) {
        Ok(Bounded::Complete(raw)) => raw,
        Ok(Bounded::TooLarge { limit }) => {
            let reason = format!("Input too large (more than {limit} bytes)");
            return match build_gate(&bootstrap) {
                Some(gate) => gate.reject_oversized("stdin", reason).into(),
                None => Decision::block(reason).into(),
            };
        }
        Err(e) => {
            tracing::warn!("Failed to read hook input: {e}");
            return Decision::allow(Vec::new()).into();
        }
    };

    let Some(input) = hook::parse_input(&raw) else {
        return Decision::allow(Vec::new()).into();
    };

    let config = match input.cwd.as_deref() {
        Some(cwd) => config::load_config(Some(cwd)),
        None => bootstrap,
    };

    match build_gate(&config) {
        Some(gate) => hook::evaluate(&gate, &input),
        None => Decision::block("Safety gate failed to initialize").into(),
    }
}

fn build_gate(config: &GateConfig) -> Option<Gate> {
    match Gate::new(config) {
        Ok(gate) => Some(gate),
        Err(e) => {
            tracing::error!("Failed to initialize gate: {e:#}");
            None
        }
    }
}
