//! Append-only audit trail of gate decisions.
//!
//! Every message is redacted before it reaches disk. Entries are JSON lines
//! appended with a single write each; when the file grows past the size
//! threshold it is renamed to a single `.1` backup slot first.
//!
//! Appends take no lock. Rotation is serialized across processes through an
//! exclusive lock on a `.lock` sibling, and the size is checked again under
//! that lock so only one writer rotates a given file.

mod redact;

use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

pub use redact::{REDACTION_MARKER, Redactor};

/// Default rotation threshold for the audit log.
pub const DEFAULT_MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Security,
}

/// A single persisted audit record. `message` is already redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub level: AuditLevel,
    pub message: String,
}

pub struct AuditLog {
    path: PathBuf,
    max_bytes: u64,
    redactor: Redactor,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, redactor: Redactor) -> Self {
        Self {
            path: path.into(),
            max_bytes,
            redactor,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The single rotation slot, e.g. `audit.log.1`.
    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.path, ".1")
    }

    /// Held while rotating, e.g. `audit.log.lock`.
    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, ".lock")
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Record `message`. Failures are reported through tracing and never
    /// reach the caller.
    pub fn log(&self, level: AuditLevel, message: &str) {
        if let Err(e) = self.try_log(level, message) {
            tracing::error!(path = %self.path.display(), "Failed to write audit entry: {e:#}");
        }
    }

    fn try_log(&self, level: AuditLevel, message: &str) -> anyhow::Result<()> {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            level,
            message: self.redactor.redact(message).into_owned(),
        };
        let mut line = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;
        line.push('\n');

        ensure_parent_dir(&self.path)?;
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> anyhow::Result<()> {
        if !self.is_full()? {
            return Ok(());
        }

        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open {}", lock_path.display()))?;
        FileExt::lock_exclusive(&lock)
            .with_context(|| format!("Failed to lock {}", lock_path.display()))?;
        let rotated = self.rotate_locked();
        if let Err(e) = FileExt::unlock(&lock) {
            tracing::debug!(path = %lock_path.display(), "Failed to release rotation lock: {e}");
        }
        rotated
    }

    /// Rename the log to the backup slot if it is still over the threshold.
    /// Another writer may have rotated while this one waited for the lock.
    fn rotate_locked(&self) -> anyhow::Result<()> {
        if !self.is_full()? {
            return Ok(());
        }

        let backup = self.backup_path();
        // rename replaces the old backup atomically.
        match fs::rename(&self.path, &backup) {
            Ok(()) => {
                tracing::debug!(backup = %backup.display(), "Rotated audit log");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!(
                    "Failed to rotate {} to {}",
                    self.path.display(),
                    backup.display()
                )
            }),
        }
    }

    fn is_full(&self) -> anyhow::Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() >= self.max_bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", self.path.display())),
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "audit.log".into());
    name.push(suffix);
    path.with_file_name(name)
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create audit directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Read back every entry of a log file. Lines that fail to parse are skipped.
pub fn read_entries(path: &Path) -> anyhow::Result<Vec<AuditEntry>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
