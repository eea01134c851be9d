//! Structural checks applied to raw input before any semantic analysis.

use thiserror::Error;

/// Default maximum length of a file path, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Default maximum length of a shell command, in bytes.
pub const MAX_COMMAND_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Empty path")]
    Empty,
    #[error("Input too large ({len} bytes, limit {limit})")]
    TooLong { len: usize, limit: usize },
    #[error("Path contains a null byte")]
    NullByte,
    #[error("Path contains a line break")]
    LineBreak,
    #[error("Path contains control character U+{0:04X}")]
    ControlChar(u32),
}

/// Reject input longer than `limit` bytes.
pub fn check_length(input: &str, limit: usize) -> Result<(), ValidationError> {
    if input.len() > limit {
        return Err(ValidationError::TooLong {
            len: input.len(),
            limit,
        });
    }
    Ok(())
}

/// Validate the shape of a raw file path.
///
/// Order matters only for the message: the first failing check is reported.
pub fn validate_path(path: &str, max_len: usize) -> Result<(), ValidationError> {
    if path.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    check_length(path, max_len)?;

    for ch in path.chars() {
        match ch {
            '\0' => return Err(ValidationError::NullByte),
            '\n' | '\r' => return Err(ValidationError::LineBreak),
            c if c.is_control() => return Err(ValidationError::ControlChar(c as u32)),
            _ => {}
        }
    }
    Ok(())
}
