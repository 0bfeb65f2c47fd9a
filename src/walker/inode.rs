//! Hard-link deduplication
//!
//! A file with several names must be charged once. The first worker to
//! claim an inode wins, every later claim for it fails.
//!
//! Inodes are spread over independently locked shards so workers claiming
//! different inodes almost never wait on each other:
//!
//! ```text
//! inode ──► fibonacci hash ──► top 8 bits ──► shard[0..256]
//!                                               Mutex<HashSet<u64>>
//! ```

use parking_lot::Mutex;
use std::collections::HashSet;

/// Number of shards, a power of two above the maximum worker count
pub const SHARD_COUNT: usize = 256;

const SHARD_BITS: u32 = SHARD_COUNT.trailing_zeros();

/// 2^64 / golden ratio
const FIBONACCI_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Set of inodes already charged during one run
pub struct InodeTracker {
    shards: Box<[Mutex<HashSet<u64>>]>,
}

impl InodeTracker {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashSet::new())).collect(),
        }
    }

    /// Claim `inode`, true only for the first caller
    ///
    /// Inode 0 means the filesystem didn't report one. Such entries can't
    /// be matched against each other, so every claim succeeds.
    pub fn try_claim(&self, inode: u64) -> bool {
        if inode == 0 {
            return true;
        }
        self.shards[shard_for(inode)].lock().insert(inode)
    }

    /// Distinct inodes claimed so far
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }
}

impl Default for InodeTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Sequential inode numbers land in different shards
fn shard_for(inode: u64) -> usize {
    (inode.wrapping_mul(FIBONACCI_MULTIPLIER) >> (u64::BITS - SHARD_BITS)) as usize
}
