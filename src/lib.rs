//! dumac - Fast Disk Usage for macOS
//!
//! Computes the disk space used by a directory tree, the way `du -s` does,
//! but reads each directory with bulk attribute enumeration instead of one
//! `lstat` per entry.
//!
//! # Features
//!
//! - **Bulk Enumeration**: `getattrlistbulk(2)` returns name, type, inode
//!   and allocated size for a whole buffer of entries per system call. Other
//!   Unix platforms get a `read_dir` based primitive that produces the same
//!   records.
//!
//! - **Parallel Traversal**: a bounded pool of worker threads sharing a
//!   work-stealing queue of directories.
//!
//! - **Hard Links Counted Once**: a sharded inode set decides which name of
//!   a multiply-linked file is charged.
//!
//! - **Partial Failure Tolerance**: unreadable subdirectories and entries
//!   are reported and skipped. Only an unreadable root fails the run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Filesystem                               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ getattrlistbulk / read_dir
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  bulk:   BulkEnumerator  (one reusable buffer per directory)     │
//! │  attr:   RecordDecoder   (packed records -> DecodedRecord)       │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Worker Threads                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐      │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │      │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘      │
//! │       └────────────┴─────┬──────┴────────────────────┘           │
//! │                          ▼                                       │
//! │        InodeTracker (256 shards)    WalkCounters (atomics)       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! let blocks = dumac::compute_usage("/Applications")?;
//! println!("{} bytes", blocks * 512);
//! # Ok::<(), dumac::UsageError>(())
//! ```

#[cfg(not(unix))]
compile_error!("dumac requires a Unix platform");

pub mod attr;
pub mod bulk;
pub mod config;
pub mod error;
pub mod progress;
pub mod walker;

pub use config::{CliArgs, SizeFormat, Traversal, UsageConfig};
pub use error::{Result, ScanError, UsageError};
pub use walker::{UsageStats, UsageWalker, WalkProgress};

use std::path::Path;

/// Total 512-byte blocks used by the tree under `root`
///
/// Runs with the default configuration. Fails only if `root` can't be
/// read; anything unreadable below it is skipped with a warning.
pub fn compute_usage(root: impl AsRef<Path>) -> Result<u64> {
    let walker = UsageWalker::new(UsageConfig::default());
    Ok(walker.run(root.as_ref())?.blocks)
}
