//! Error taxonomy
//!
//! Library code reports failures through [`HeatError`]. The application layer
//! (orchestration and the binary) wraps these in `anyhow::Error` with context,
//! and `main` maps the innermost `HeatError` back to an exit code through
//! [`HeatError::category`].

use std::path::PathBuf;
use thiserror::Error;

/// Broad failure category, used to pick the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad command line or configuration
    Argument,
    /// File system failures and malformed inputs
    Io,
    /// Buffer or collection allocation failed
    Allocation,
    /// Threads, barriers, messaging, remote peers
    Concurrency,
}

impl ErrorCategory {
    /// Process exit code for this category
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorCategory::Argument => 2,
            ErrorCategory::Io => 3,
            ErrorCategory::Allocation => 4,
            ErrorCategory::Concurrency => 5,
        }
    }
}

/// Errors raised by the simulator
#[derive(Debug, Error)]
pub enum HeatError {
    /// A grid, job or thread-array allocation failed
    #[error("allocation failed: {what}")]
    Allocation { what: String },

    /// A job file or grid file is shorter or shaped differently than declared
    #[error("malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    /// A file could not be opened, read or written
    #[error("{operation} {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A worker thread could not be started (or died before finishing)
    #[error("could not create worker thread {index}: {reason}")]
    ThreadCreation { index: usize, reason: String },

    /// A send or receive failed at the transport layer
    #[error("messaging failed during {operation}: {reason}")]
    Messaging { operation: &'static str, reason: String },

    /// A peer process reported an error and gave up
    #[error("process {rank} failed: {message}")]
    RemoteFailure { rank: usize, message: String },

    /// Bad argument or configuration value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl HeatError {
    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            HeatError::Allocation { .. } => ErrorCategory::Allocation,
            HeatError::MalformedInput { .. } | HeatError::Io { .. } => ErrorCategory::Io,
            HeatError::ThreadCreation { .. }
            | HeatError::Messaging { .. }
            | HeatError::RemoteFailure { .. } => ErrorCategory::Concurrency,
            HeatError::InvalidArgument(_) => ErrorCategory::Argument,
        }
    }

    /// Whether a single-plate run may skip over this error and continue
    ///
    /// Only local input/output problems qualify. Concurrency and allocation
    /// failures always abort the job.
    pub fn is_plate_local(&self) -> bool {
        matches!(self, HeatError::MalformedInput { .. } | HeatError::Io { .. })
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HeatError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HeatError::MalformedInput {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn messaging(operation: &'static str, reason: impl ToString) -> Self {
        HeatError::Messaging {
            operation,
            reason: reason.to_string(),
        }
    }
}

/// Find the exit code for an application-level error
///
/// Walks the `anyhow` chain looking for a [`HeatError`]; errors that carry no
/// category exit with 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HeatError>())
        .map(|heat| heat.category().exit_code())
        .unwrap_or(1)
}
