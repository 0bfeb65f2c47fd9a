//! Per-directory aggregation and the serial scheduler
//!
//! [`Scanner::scan`] reads one directory to the end, charges the regular
//! files whose inode it is first to claim, and hands back the
//! subdirectories it found. Both schedulers are built on it. Only a failure
//! to open the directory is returned to the caller; anything that goes
//! wrong later is logged, counted, and leaves the directory with whatever
//! it had accumulated.

use super::inode::InodeTracker;
use super::{Totals, WalkCounters};
use crate::attr::{DecodedRecord, ObjKind, RecordStatus};
use crate::bulk::{BulkEnumerator, DirOpener};
use crate::error::{describe_errno, Result, ScanError, ScanResult};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// What one directory contributed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirSummary {
    /// Blocks charged to regular files in this directory
    pub blocks: u64,
    /// Regular file entries seen, hard links included
    pub files: u64,
    /// Child directories still to be aggregated
    pub subdirs: Vec<PathBuf>,
}

/// Shared state of one run, borrowed by every worker
pub struct Scanner<'a, O> {
    opener: &'a O,
    tracker: &'a InodeTracker,
    counters: &'a WalkCounters,
    buffer_size: usize,
}

impl<'a, O: DirOpener> Scanner<'a, O> {
    pub fn new(
        opener: &'a O,
        tracker: &'a InodeTracker,
        counters: &'a WalkCounters,
        buffer_size: usize,
    ) -> Self {
        Self {
            opener,
            tracker,
            counters,
            buffer_size,
        }
    }

    pub fn counters(&self) -> &'a WalkCounters {
        self.counters
    }

    /// Aggregate one directory
    pub fn scan(&self, path: &Path) -> ScanResult<DirSummary> {
        let dir = self.opener.open(path).map_err(|source| ScanError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;

        let mut summary = DirSummary::default();

        match BulkEnumerator::new(dir, path, self.buffer_size) {
            Ok(records) => {
                for result in records {
                    match result {
                        Ok(record) => self.visit(path, record, &mut summary),
                        Err(e) => self.report(&e),
                    }
                }
            }
            Err(e) => self.report(&e),
        }

        debug!(
            path = %path.display(),
            blocks = summary.blocks,
            files = summary.files,
            subdirs = summary.subdirs.len(),
            "Directory scanned"
        );
        self.counters.add_dir(summary.blocks, summary.files);

        Ok(summary)
    }

    fn visit(&self, path: &Path, record: DecodedRecord, summary: &mut DirSummary) {
        match record.status {
            RecordStatus::DotEntry => return,
            RecordStatus::Failed(code) => {
                self.counters.add_error();
                warn!(
                    "cannot access '{}': {}",
                    path.join(record.name_os()).display(),
                    describe_errno(code as i32)
                );
                return;
            }
            RecordStatus::Ok => {}
        }

        match record.kind {
            ObjKind::Regular => {
                summary.files += 1;
                if record.allocated_bytes.is_none() {
                    return;
                }
                if self.tracker.try_claim(record.inode) {
                    summary.blocks += record.blocks();
                } else {
                    debug!(inode = record.inode, name = %record.display_name(), "Hard link already counted");
                }
            }
            ObjKind::Directory => {
                if record.name.is_empty() {
                    debug!(path = %path.display(), "Directory entry without a name");
                    return;
                }
                summary.subdirs.push(path.join(record.name_os()));
            }
            ObjKind::SymbolicLink | ObjKind::Other => {}
        }
    }

    /// Log a failure that only degrades the current subtree
    pub(crate) fn report(&self, err: &ScanError) {
        self.counters.add_error();
        if err.is_expected() {
            warn!("{}", err);
        } else {
            error!(path = %err.path().display(), "{}", err);
        }
    }

    /// Depth-first traversal on the calling thread
    ///
    /// Fails only if `root` itself can't be read.
    pub fn aggregate_serial(&self, root: &Path) -> Result<Totals> {
        let mut stack = self.scan(root).map_err(ScanError::into_root_error)?.subdirs;

        while let Some(dir) = stack.pop() {
            match self.scan(&dir) {
                Ok(summary) => stack.extend(summary.subdirs),
                Err(e) => self.report(&e),
            }
        }

        Ok(self.counters.totals())
    }
}

/// Run the serial scheduler with fresh counters
pub fn aggregate_serial<O: DirOpener>(
    opener: &O,
    tracker: &InodeTracker,
    root: &Path,
    buffer_size: usize,
) -> Result<Totals> {
    let counters = WalkCounters::new();
    Scanner::new(opener, tracker, &counters, buffer_size).aggregate_serial(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::{MemoryTree, OwnedEntry, DEFAULT_BUFFER_SIZE};
    use crate::error::UsageError;

    fn serial(tree: &MemoryTree) -> Totals {
        let tracker = InodeTracker::new();
        aggregate_serial(tree, &tracker, Path::new("/r"), DEFAULT_BUFFER_SIZE).unwrap()
    }

    #[test]
    fn test_one_byte_file_and_empty_dir() {
        let mut tree = MemoryTree::new("/r");
        tree.file_bytes("/r/one", 10, 1).dir("/r/empty");

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 1);
        assert_eq!(totals.dirs, 2);
        assert_eq!(totals.files, 1);
        assert_eq!(totals.errors, 0);
    }

    #[test]
    fn test_hard_link_in_sibling_counted_once() {
        let mut tree = MemoryTree::new("/r");
        tree.file_bytes("/r/a/one", 10, 1).hard_link("/r/b/link", 10);

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 1);
        assert_eq!(totals.files, 2);
    }

    #[test]
    fn test_rounds_up_per_file() {
        let mut tree = MemoryTree::new("/r");
        tree.file_bytes("/r/a", 1, 513)
            .file_bytes("/r/b", 2, 1024)
            .file_bytes("/r/c", 3, 0);

        assert_eq!(serial(&tree).blocks, 2 + 2);
    }

    #[test]
    fn test_symlinks_and_specials_are_free() {
        let mut tree = MemoryTree::new("/r");
        tree.file("/r/f", 1, 8).symlink("/r/l", 2).special("/r/fifo", 3);

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 8);
        assert_eq!(totals.files, 1);
    }

    #[test]
    fn test_unreadable_subdir_skipped() {
        let mut tree = MemoryTree::new("/r");
        tree.file("/r/ok/a", 1, 4)
            .file("/r/locked/b", 2, 100)
            .deny("/r/locked", libc::EACCES);

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 4);
        assert_eq!(totals.errors, 1);
    }

    #[test]
    fn test_unreadable_root_fails() {
        let mut tree = MemoryTree::new("/r");
        tree.deny("/r", libc::EACCES);

        let tracker = InodeTracker::new();
        let result = aggregate_serial(&tree, &tracker, Path::new("/r"), DEFAULT_BUFFER_SIZE);
        assert!(matches!(result, Err(UsageError::RootUnreadable { .. })));
    }

    #[test]
    fn test_mid_stream_failure_keeps_partial_sum() {
        let mut tree = MemoryTree::new("/r").without_dot_entries();
        tree.file("/r/a", 1, 1)
            .file("/r/sub/deep", 2, 10)
            .file("/r/b", 3, 100);
        // "a" then "sub" are listed before the stream breaks
        tree.fail_after("/r", 2);

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 1 + 10);
        assert_eq!(totals.errors, 1);
    }

    #[test]
    fn test_per_entry_error_skipped() {
        let mut tree = MemoryTree::new("/r");
        tree.file("/r/a", 1, 3).failed_entry("/r/bad", libc::EACCES);

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 3);
        assert_eq!(totals.errors, 1);
    }

    #[test]
    fn test_zero_inodes_not_deduplicated() {
        let mut tree = MemoryTree::new("/r");
        tree.file("/r/a", 0, 2).file("/r/b", 0, 2);

        assert_eq!(serial(&tree).blocks, 4);
    }

    #[test]
    fn test_file_without_allocsize_is_free() {
        let mut tree = MemoryTree::new("/r");
        tree.raw_entry(
            "/r",
            OwnedEntry {
                name: b"sparse".to_vec(),
                kind: Some(ObjKind::Regular),
                inode: Some(7),
                allocated: None,
                error: None,
            },
        );
        tree.file("/r/real", 7, 6);

        // The record without a size must not claim the inode
        assert_eq!(serial(&tree).blocks, 6);
    }

    #[test]
    fn test_tiny_buffer_counts_everything() {
        let mut tree = MemoryTree::new("/r");
        for i in 1..=50 {
            tree.file(format!("/r/file-{i}"), i, 1);
        }

        let tracker = InodeTracker::new();
        let totals = aggregate_serial(&tree, &tracker, Path::new("/r"), 128).unwrap();
        assert_eq!(totals.blocks, 50);
    }

    #[test]
    fn test_unexpected_failures_still_counted() {
        let mut tree = MemoryTree::new("/r");
        tree.file("/r/a/x", 1, 2)
            .file("/r/b/y", 2, 3)
            .deny("/r/a", libc::EACCES)
            .deny("/r/b", libc::EIO);

        let totals = serial(&tree);
        assert_eq!(totals.blocks, 0);
        assert_eq!(totals.errors, 2);
    }

    #[test]
    fn test_scan_reports_subdirs() {
        let mut tree = MemoryTree::new("/r");
        tree.dir("/r/x").dir("/r/y").file("/r/f", 1, 2);

        let tracker = InodeTracker::new();
        let counters = WalkCounters::new();
        let scanner = Scanner::new(&tree, &tracker, &counters, DEFAULT_BUFFER_SIZE);
        let mut summary = scanner.scan(Path::new("/r")).unwrap();
        summary.subdirs.sort();

        assert_eq!(
            summary,
            DirSummary {
                blocks: 2,
                files: 1,
                subdirs: vec![PathBuf::from("/r/x"), PathBuf::from("/r/y")],
            }
        );
    }
}
