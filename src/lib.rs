//! rusty-guard - a command and file-path safety gate for agent actions.
//!
//! This library provides the core functionality, including:
//! - Command normalization and the danger taxonomy
//! - Filesystem containment for write/edit targets
//! - A redacting, rotating audit log
//! - Hook event I/O for the `rusty-guard` binary
//!
//! # Example
//!
//! ```no_run
//! use rusty_guard::config::GateConfig;
//! use rusty_guard::security::Gate;
//!
//! let gate = Gate::new(&GateConfig::for_project("/work/app")).unwrap();
//!
//! let decision = gate.check_command("rm -rf /", "Bash");
//! assert!(decision.is_blocked());
//!
//! let decision = gate.check_path("src/main.rs", "Edit");
//! assert!(!decision.is_blocked());
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod audit;
pub mod config;
pub mod hook;
pub mod security;
pub mod utils;

// Re-export commonly used types
pub use config::GateConfig;
pub use hook::{HookInput, HookOutput, evaluate};
pub use security::{Decision, Gate, Verdict};
