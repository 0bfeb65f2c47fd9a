//! Error types for dumac
//!
//! This module defines the error hierarchy for a usage run:
//! - Root-level failures that abort the run
//! - Per-directory scan failures that only degrade a subtree
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Only [`UsageError`] ever reaches the caller of a run. [`ScanError`] is
//! logged where it happens and turned into a partial result.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a usage run
#[derive(Error, Debug)]
pub enum UsageError {
    /// The root directory could not be opened
    #[error("{}: {}", path.display(), describe_os_error(source))]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Failure while scanning a single directory
///
/// None of these abort the run. The directory keeps whatever it had
/// accumulated before the failure.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Directory could not be opened
    #[error("{}: {}", path.display(), describe_os_error(source))]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Bulk enumeration failed part way through the directory
    #[error("{}: {}", path.display(), describe_os_error(source))]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Enumeration buffer could not be allocated
    #[error("{}: cannot allocate {size} byte enumeration buffer", path.display())]
    BufferAlloc { path: PathBuf, size: usize },
}

impl ScanError {
    /// Path of the directory that failed
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::OpenFailed { path, .. } => path,
            ScanError::ReadFailed { path, .. } => path,
            ScanError::BufferAlloc { path, .. } => path,
        }
    }

    /// Promote a failure on the root directory to a fatal error
    ///
    /// [`Scanner::scan`](crate::walker::Scanner::scan) only returns
    /// `OpenFailed`. A root that breaks part way through keeps its partial
    /// total, so the other arms exist only to keep the match exhaustive.
    pub fn into_root_error(self) -> UsageError {
        match self {
            ScanError::OpenFailed { path, source } | ScanError::ReadFailed { path, source } => {
                UsageError::RootUnreadable { path, source }
            }
            ScanError::BufferAlloc { path, size } => UsageError::RootUnreadable {
                path,
                source: io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    format!("cannot allocate {} byte enumeration buffer", size),
                ),
            },
        }
    }

    /// Check if this error is expected on a live filesystem
    ///
    /// Directories vanish and permissions change while a walk is running,
    /// these are reported but are not surprising.
    pub fn is_expected(&self) -> bool {
        match self {
            ScanError::OpenFailed { source, .. } | ScanError::ReadFailed { source, .. } => {
                matches!(
                    source.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
                )
            }
            ScanError::BufferAlloc { .. } => false,
        }
    }
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid enumeration buffer size
    #[error("Invalid buffer size {size} KiB: must be between {min} and {max} KiB")]
    InvalidBufferSize { size: usize, min: usize, max: usize },
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be started
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },
}

/// Result type alias for UsageError
pub type Result<T> = std::result::Result<T, UsageError>;

/// Result type alias for ScanError
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Short du-style description of an OS error
///
/// `io::Error`'s own Display appends "(os error N)", which reads badly in
/// per-path diagnostics.
pub(crate) fn describe_os_error(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => "No such file or directory".into(),
        io::ErrorKind::PermissionDenied => "Permission denied".into(),
        _ => match err.raw_os_error() {
            Some(libc::ENOTDIR) => "Not a directory".into(),
            Some(code) => describe_errno(code),
            None => err.to_string(),
        },
    }
}

/// Text for a raw errno value as carried in a per-entry error record
pub(crate) fn describe_errno(code: i32) -> String {
    let text = io::Error::from_raw_os_error(code).to_string();
    match text.find(" (os error") {
        Some(idx) => text[..idx].to_string(),
        None => text,
    }
}
