//! Disk usage walker
//!
//! This module computes the space used by a directory tree by enumerating
//! every directory in bulk and charging each distinct regular file once.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │      UsageWalker        │
//!                     │  - scans the root       │
//!                     │  - picks a scheduler    │
//!                     └───────────┬─────────────┘
//!                                 │
//!            ┌────────────────────┴────────────────────┐
//!            │                                         │
//!      ┌─────▼─────┐                           ┌───────▼───────┐
//!      │  Serial   │                           │   Parallel    │
//!      │ DFS stack │                           │ worker pool + │
//!      │           │                           │ work stealing │
//!      └─────┬─────┘                           └───────┬───────┘
//!            │           Scanner (per directory)       │
//!            └────────────────────┬────────────────────┘
//!                                 │
//!            ┌────────────────────┼────────────────────┐
//!            ▼                    ▼                    ▼
//!     BulkEnumerator        InodeTracker         WalkCounters
//!     (records)             (hard links)         (atomic totals)
//! ```

pub mod aggregate;
pub mod inode;
pub mod pool;

pub use aggregate::{aggregate_serial, DirSummary, Scanner};
pub use inode::InodeTracker;
pub use pool::aggregate_parallel;

use crate::attr::BLOCK_SIZE;
use crate::bulk::{DirOpener, PlatformOpener};
use crate::config::{Traversal, UsageConfig};
use crate::error::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Running totals shared by every worker of one walk
#[derive(Debug, Default)]
pub struct WalkCounters {
    dirs: AtomicU64,
    files: AtomicU64,
    blocks: AtomicU64,
    errors: AtomicU64,
    active_workers: AtomicUsize,
}

impl WalkCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_dir(&self, blocks: u64, files: u64) {
        self.dirs.fetch_add(1, Ordering::Relaxed);
        self.files.fetch_add(files, Ordering::Relaxed);
        self.blocks.fetch_add(blocks, Ordering::Relaxed);
    }

    pub(crate) fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker_finished(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn totals(&self) -> Totals {
        Totals {
            blocks: self.blocks.load(Ordering::Relaxed),
            dirs: self.dirs.load(Ordering::Relaxed),
            files: self.files.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn progress(&self, elapsed: Duration, total_workers: usize) -> WalkProgress {
        let totals = self.totals();
        WalkProgress {
            dirs: totals.dirs,
            files: totals.files,
            blocks: totals.blocks,
            errors: totals.errors,
            active_workers: self.active_workers.load(Ordering::Relaxed),
            total_workers,
            elapsed,
        }
    }
}

/// Sums over a finished traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// 512-byte blocks charged
    pub blocks: u64,
    /// Directories scanned
    pub dirs: u64,
    /// Regular file entries seen
    pub files: u64,
    /// Failures that were skipped
    pub errors: u64,
}

/// Result from a usage walk
#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    pub blocks: u64,
    pub dirs: u64,
    pub files: u64,
    pub errors: u64,
    /// Distinct inodes charged
    pub inodes: u64,
    pub duration: Duration,
}

impl UsageStats {
    /// Allocated size in bytes
    pub fn bytes(&self) -> u64 {
        self.blocks.saturating_mul(BLOCK_SIZE)
    }

    pub fn files_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }
}

/// Progress information for display
#[derive(Debug, Clone, Default)]
pub struct WalkProgress {
    pub dirs: u64,
    pub files: u64,
    pub blocks: u64,
    pub errors: u64,
    pub active_workers: usize,
    pub total_workers: usize,
    pub elapsed: Duration,
}

impl WalkProgress {
    pub fn bytes(&self) -> u64 {
        self.blocks.saturating_mul(BLOCK_SIZE)
    }

    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.files + self.dirs) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Computes disk usage for a directory tree
pub struct UsageWalker<O = PlatformOpener> {
    config: UsageConfig,
    opener: O,
}

impl UsageWalker {
    /// Walker using the platform's enumeration primitive
    pub fn new(config: UsageConfig) -> Self {
        Self::with_opener(config, PlatformOpener::default())
    }
}

impl<O: DirOpener> UsageWalker<O> {
    pub fn with_opener(config: UsageConfig, opener: O) -> Self {
        Self { config, opener }
    }

    pub fn config(&self) -> &UsageConfig {
        &self.config
    }

    /// Walk `root` and return its usage
    ///
    /// Fails only if the root can't be read or the worker pool breaks.
    /// Everything unreadable below the root is skipped with a warning.
    pub fn run(&self, root: &Path) -> Result<UsageStats> {
        self.walk(root, &WalkCounters::new())
    }

    /// Like [`run`](Self::run), calling `progress_callback` every 100ms
    pub fn run_with_progress<F>(&self, root: &Path, progress_callback: F) -> Result<UsageStats>
    where
        F: Fn(WalkProgress) + Send,
    {
        let start = Instant::now();
        let counters = WalkCounters::new();
        let done = AtomicBool::new(false);
        let total_workers = self.active_workers();

        thread::scope(|s| {
            let (done_flag, shared) = (&done, &counters);
            s.spawn(move || {
                while !done_flag.load(Ordering::Relaxed) {
                    progress_callback(shared.progress(start.elapsed(), total_workers));
                    thread::sleep(Duration::from_millis(100));
                }
            });

            let result = self.walk(root, &counters);
            done.store(true, Ordering::SeqCst);
            result
        })
    }

    fn active_workers(&self) -> usize {
        match self.config.traversal {
            Traversal::Serial => 1,
            Traversal::Parallel => self.config.worker_count,
        }
    }

    fn walk(&self, root: &Path, counters: &WalkCounters) -> Result<UsageStats> {
        let start = Instant::now();
        let tracker = InodeTracker::new();
        let scanner = Scanner::new(&self.opener, &tracker, counters, self.config.buffer_size);

        info!(
            root = %root.display(),
            traversal = ?self.config.traversal,
            workers = self.active_workers(),
            buffer_size = self.config.buffer_size,
            "Starting usage walk"
        );

        let totals = match self.config.traversal {
            Traversal::Serial => scanner.aggregate_serial(root)?,
            Traversal::Parallel => aggregate_parallel(&scanner, root, self.config.worker_count)?,
        };

        let stats = UsageStats {
            blocks: totals.blocks,
            dirs: totals.dirs,
            files: totals.files,
            errors: totals.errors,
            inodes: tracker.len() as u64,
            duration: start.elapsed(),
        };

        info!(
            blocks = stats.blocks,
            dirs = stats.dirs,
            files = stats.files,
            errors = stats.errors,
            elapsed_ms = stats.duration.as_millis() as u64,
            "Usage walk complete"
        );

        Ok(stats)
    }
}
