//! Structured error handling and exit codes.

use serde::Serialize;

use crate::scanner::ScanError;

/// Exit codes for the dedupe-tree binary.
///
/// - 0: Success (including apply runs where some entries were skipped)
/// - 1: General error (unexpected failure)
/// - 2: Invalid root (missing path or not a directory)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// The run completed.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// The scan root does not exist or is not a directory.
    InvalidRoot = 2,
    /// Interrupted by Ctrl+C.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DT000",
            Self::GeneralError => "DT001",
            Self::InvalidRoot => "DT002",
            Self::Interrupted => "DT130",
        }
    }

    /// Pick the exit code for an error returned by [`run_app`](crate::run_app).
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ScanError>() {
            Some(ScanError::Interrupted) => Self::Interrupted,
            Some(ScanError::InvalidRoot { .. }) => Self::InvalidRoot,
            _ => Self::GeneralError,
        }
    }
}

/// Structured error information for `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DT001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
