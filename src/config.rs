//! Gate configuration.
//!
//! Every value has a default, so the gate runs with no configuration at all.
//! A JSON file may override any subset of fields:
//!
//! ```json
//! { "extra_roots": ["/srv/shared"], "max_command_bytes": 32768 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_MAX_LOG_BYTES;
use crate::security::default_extra_roots;
use crate::security::validate::{MAX_COMMAND_BYTES, MAX_PATH_LEN};

/// Overrides the project root (else the hook `cwd`, else the process cwd).
pub const PROJECT_DIR_ENV: &str = "RUSTY_GUARD_PROJECT_DIR";
/// Path of an explicit config file.
pub const CONFIG_ENV: &str = "RUSTY_GUARD_CONFIG";
/// Looked up in the project root when no explicit file is given.
pub const CONFIG_FILE_NAME: &str = ".rusty-guard.json";
/// Per-project state directory holding the audit log.
pub const STATE_DIR_NAME: &str = ".rusty-guard";

pub const DEFAULT_MAX_INPUT_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_LARGE_FILE_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_WRITE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub project_root: PathBuf,
    pub extra_roots: Vec<PathBuf>,
    /// Defaults to `<project_root>/.rusty-guard/audit.log`.
    pub audit_log: Option<PathBuf>,
    pub audit_max_bytes: u64,
    pub max_command_bytes: usize,
    pub max_path_len: usize,
    pub max_input_bytes: usize,
    pub large_file_bytes: u64,
    pub max_write_bytes: usize,
    /// Extra command prefixes treated as read-only for auto-approval.
    pub allow_prefixes: Vec<String>,
    /// File this configuration was read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            project_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            extra_roots: default_extra_roots(),
            audit_log: None,
            audit_max_bytes: DEFAULT_MAX_LOG_BYTES,
            max_command_bytes: MAX_COMMAND_BYTES,
            max_path_len: MAX_PATH_LEN,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            large_file_bytes: DEFAULT_LARGE_FILE_BYTES,
            max_write_bytes: DEFAULT_MAX_WRITE_BYTES,
            allow_prefixes: Vec::new(),
            config_path: None,
        }
    }
}

impl GateConfig {
    /// Defaults rooted at `project_root`.
    pub fn for_project(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.audit_log
            .clone()
            .unwrap_or_else(|| self.project_root.join(STATE_DIR_NAME).join("audit.log"))
    }

    /// Make every relative path absolute against the project root.
    fn resolve_relative_paths(&mut self) {
        let root = self.project_root.clone();
        let absolutize = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        self.extra_roots.iter_mut().for_each(absolutize);
        if let Some(log) = self.audit_log.as_mut() {
            absolutize(log);
        }
    }
}

/// Build the effective configuration from the environment, the hook's
/// working directory and an optional config file.
///
/// Never fails: unreadable or invalid files are reported and ignored.
pub fn load_config(hook_cwd: Option<&Path>) -> GateConfig {
    let project_root = std::env::var_os(PROJECT_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| hook_cwd.map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config_path = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            let candidate = project_root.join(CONFIG_FILE_NAME);
            candidate.is_file().then_some(candidate)
        });

    load_config_from(project_root, config_path.as_deref())
}

/// Load `config_path` (if any) on top of the defaults for `project_root`.
pub fn load_config_from(project_root: PathBuf, config_path: Option<&Path>) -> GateConfig {
    let mut config = match config_path {
        Some(path) => match read_config_file(path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded gate configuration");
                config
            }
            Err(e) => {
                tracing::warn!("Using default configuration: {e:#}");
                GateConfig::default()
            }
        },
        None => GateConfig::default(),
    };

    // The file cannot move the project root away from where the hook runs.
    config.project_root = project_root;
    config.config_path = config_path.map(Path::to_path_buf);
    config.resolve_relative_paths();
    config
}

fn read_config_file(path: &Path) -> anyhow::Result<GateConfig> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config: GateConfig =
        serde_json::from_str(&raw).with_context(|| format!("Invalid config JSON at {}", path.display()))?;
    Ok(config)
}
