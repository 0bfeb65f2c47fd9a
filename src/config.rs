//! Configuration types for dumac
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::bulk::DEFAULT_BUFFER_SIZE;
use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Maximum worker count
///
/// Each worker keeps one directory open, this keeps well clear of the
/// default per-process descriptor limit.
pub const MAX_WORKERS: usize = 224;

/// Enumeration buffer limits in KiB
pub const MIN_BUFFER_KIB: usize = 16;
pub const MAX_BUFFER_KIB: usize = 8192;

/// Fast disk usage for a directory tree
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dumac",
    version,
    about = "Fast disk usage for a directory tree",
    long_about = "Reports the disk space used by a directory tree, like `du -sh`.\n\n\
                  Directories are read with bulk attribute enumeration, one system call \n\
                  per buffer of entries instead of one per file, and scanned in parallel.\n\
                  Hard-linked files are counted once. Symbolic links are not followed.",
    after_help = "EXAMPLES:\n    \
        dumac ~/Library\n    \
        dumac /Applications -w 32 -p\n    \
        dumac . --blocks --serial\n    \
        dumac /usr --stats"
)]
pub struct CliArgs {
    /// Directory to measure
    #[arg(value_name = "PATH", default_value = ".")]
    pub path: PathBuf,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Enumeration buffer size per directory in KiB
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE / 1024, value_name = "KIB")]
    pub buffer_size: usize,

    /// Walk on a single thread
    #[arg(long)]
    pub serial: bool,

    /// Print the number of 512-byte blocks instead of a human-readable size
    #[arg(long)]
    pub blocks: bool,

    /// Show a progress spinner on stderr
    #[arg(short = 'p', long)]
    pub progress: bool,

    /// Print a summary of the walk on stderr
    #[arg(long)]
    pub stats: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn default_workers() -> usize {
    // Enumeration is mostly I/O, but one thread per core is already enough
    // to saturate the metadata path
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS)
}

/// How directories are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Traversal {
    /// Depth-first on the calling thread
    Serial,
    /// Worker pool with work stealing
    #[default]
    Parallel,
}

/// How the total is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeFormat {
    /// du -h style (12K, 3.5M)
    #[default]
    Human,
    /// Raw 512-byte block count
    Blocks,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct UsageConfig {
    /// Root of the tree
    pub root: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Enumeration buffer size in bytes
    pub buffer_size: usize,

    pub traversal: Traversal,

    pub size_format: SizeFormat,

    /// Show progress indicator
    pub show_progress: bool,

    /// Print summary after the walk
    pub show_stats: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            worker_count: default_workers(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            traversal: Traversal::Parallel,
            size_format: SizeFormat::Human,
            show_progress: false,
            show_stats: false,
            verbose: false,
        }
    }
}

impl UsageConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.buffer_size < MIN_BUFFER_KIB || args.buffer_size > MAX_BUFFER_KIB {
            return Err(ConfigError::InvalidBufferSize {
                size: args.buffer_size,
                min: MIN_BUFFER_KIB,
                max: MAX_BUFFER_KIB,
            });
        }

        Ok(Self {
            root: args.path,
            worker_count: args.workers,
            buffer_size: args.buffer_size * 1024,
            traversal: if args.serial {
                Traversal::Serial
            } else {
                Traversal::Parallel
            },
            size_format: if args.blocks {
                SizeFormat::Blocks
            } else {
                SizeFormat::Human
            },
            show_progress: args.progress,
            show_stats: args.stats,
            verbose: args.verbose,
        })
    }
}
