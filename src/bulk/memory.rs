//! In-memory directory tree
//!
//! Serves records from a tree built in code, through the same packing and
//! decoding path as the real primitives. Makes it possible to exercise
//! exact block counts, hard links, per-entry errors and failures halfway
//! through a directory without depending on the host filesystem.
//!
//! ```
//! use dumac::bulk::MemoryTree;
//! use dumac::{UsageConfig, UsageWalker};
//!
//! let mut tree = MemoryTree::new("/r");
//! tree.file("/r/a.txt", 10, 1);
//! tree.hard_link("/r/sub/b.txt", 10);
//!
//! let walker = UsageWalker::with_opener(UsageConfig::default(), tree);
//! assert_eq!(walker.run("/r".as_ref()).unwrap().blocks, 1);
//! ```

use super::{BulkDirectory, DirOpener, OwnedEntry, Packer};
use crate::attr::ObjKind;
use std::collections::HashMap;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::vec;

/// First inode handed to directories created implicitly
const DIR_INODE_BASE: u64 = 1 << 40;

#[derive(Debug, Clone, Default)]
struct MemoryDir {
    entries: Vec<OwnedEntry>,
    /// errno returned when opening
    open_error: Option<i32>,
    /// Fail the stream after this many entries
    fail_after: Option<usize>,
}

/// Directory tree held in memory
#[derive(Debug, Clone)]
pub struct MemoryTree {
    dirs: HashMap<PathBuf, MemoryDir>,
    /// file inode -> allocated bytes, for hard links
    files: HashMap<u64, u64>,
    next_dir_inode: u64,
    dot_entries: bool,
}

impl MemoryTree {
    /// Empty tree rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut tree = Self {
            dirs: HashMap::new(),
            files: HashMap::new(),
            next_dir_inode: DIR_INODE_BASE,
            dot_entries: true,
        };
        tree.dirs.insert(root.as_ref().to_path_buf(), MemoryDir::default());
        tree
    }

    /// Stop emitting "." and ".." records
    pub fn without_dot_entries(mut self) -> Self {
        self.dot_entries = false;
        self
    }

    /// Add a regular file with `blocks` 512-byte blocks allocated
    pub fn file(&mut self, path: impl AsRef<Path>, inode: u64, blocks: u64) -> &mut Self {
        self.file_bytes(path, inode, blocks * 512)
    }

    /// Add a regular file with an exact allocated byte count
    pub fn file_bytes(&mut self, path: impl AsRef<Path>, inode: u64, bytes: u64) -> &mut Self {
        self.files.insert(inode, bytes);
        self.push(
            path.as_ref(),
            Some(ObjKind::Regular),
            Some(inode),
            Some(bytes),
            None,
        )
    }

    /// Add another name for an existing file
    pub fn hard_link(&mut self, path: impl AsRef<Path>, inode: u64) -> &mut Self {
        let bytes = self.files.get(&inode).copied().unwrap_or(0);
        self.push(
            path.as_ref(),
            Some(ObjKind::Regular),
            Some(inode),
            Some(bytes),
            None,
        )
    }

    /// Add an empty directory
    pub fn dir(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.ensure_dir(path.as_ref());
        self
    }

    pub fn symlink(&mut self, path: impl AsRef<Path>, inode: u64) -> &mut Self {
        self.push(path.as_ref(), Some(ObjKind::SymbolicLink), Some(inode), None, None)
    }

    /// Add a device, fifo or socket
    pub fn special(&mut self, path: impl AsRef<Path>, inode: u64) -> &mut Self {
        self.push(path.as_ref(), Some(ObjKind::Other), Some(inode), None, None)
    }

    /// Add an entry the kernel flags with `errno`
    pub fn failed_entry(&mut self, path: impl AsRef<Path>, errno: i32) -> &mut Self {
        self.push(path.as_ref(), None, None, None, Some(errno as u32))
    }

    /// Add a raw entry, for records with missing attributes
    pub fn raw_entry(&mut self, parent: impl AsRef<Path>, entry: OwnedEntry) -> &mut Self {
        self.ensure_dir(parent.as_ref()).entries.push(entry);
        self
    }

    /// Make opening the directory fail with `errno`
    pub fn deny(&mut self, path: impl AsRef<Path>, errno: i32) -> &mut Self {
        self.ensure_dir(path.as_ref()).open_error = Some(errno);
        self
    }

    /// Make the directory stream fail after `entries` entries
    pub fn fail_after(&mut self, path: impl AsRef<Path>, entries: usize) -> &mut Self {
        self.ensure_dir(path.as_ref()).fail_after = Some(entries);
        self
    }

    fn push(
        &mut self,
        path: &Path,
        kind: Option<ObjKind>,
        inode: Option<u64>,
        allocated: Option<u64>,
        error: Option<u32>,
    ) -> &mut Self {
        let (parent, name) = split(path);
        let entry = OwnedEntry {
            name,
            kind,
            inode,
            allocated,
            error,
        };
        self.ensure_dir(parent).entries.push(entry);
        self
    }

    /// Create `path` and its missing ancestors, linking each into its parent
    fn ensure_dir(&mut self, path: &Path) -> &mut MemoryDir {
        if !self.dirs.contains_key(path) {
            if path.parent().is_some() {
                let (parent, name) = split(path);
                let inode = self.next_dir_inode;
                self.next_dir_inode += 1;
                self.ensure_dir(parent).entries.push(OwnedEntry {
                    name,
                    kind: Some(ObjKind::Directory),
                    inode: Some(inode),
                    allocated: None,
                    error: None,
                });
            }
            self.dirs.insert(path.to_path_buf(), MemoryDir::default());
        }
        self.dirs.entry(path.to_path_buf()).or_default()
    }

    fn dot_records(&self) -> Vec<OwnedEntry> {
        if !self.dot_entries {
            return Vec::new();
        }
        [&b"."[..], &b".."[..]]
            .into_iter()
            .map(|name| OwnedEntry {
                name: name.to_vec(),
                kind: Some(ObjKind::Directory),
                inode: Some(DIR_INODE_BASE - 1),
                allocated: None,
                error: None,
            })
            .collect()
    }
}

fn split(path: &Path) -> (&Path, Vec<u8>) {
    let parent = path.parent().unwrap_or(Path::new("/"));
    let name = path
        .file_name()
        .map(|n| n.as_bytes().to_vec())
        .unwrap_or_default();
    (parent, name)
}

impl DirOpener for MemoryTree {
    type Dir = MemoryListing;

    fn open(&self, path: &Path) -> io::Result<MemoryListing> {
        let dir = self
            .dirs
            .get(path)
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
        if let Some(errno) = dir.open_error {
            return Err(io::Error::from_raw_os_error(errno));
        }

        let mut items: Vec<io::Result<OwnedEntry>> =
            self.dot_records().into_iter().map(Ok).collect();
        let limit = dir.fail_after.unwrap_or(usize::MAX);
        items.extend(dir.entries.iter().take(limit).cloned().map(Ok));
        if dir.fail_after.is_some() {
            items.push(Err(io::Error::from_raw_os_error(libc::EIO)));
        }

        Ok(MemoryListing {
            items: items.into_iter(),
            packer: Packer::default(),
        })
    }
}

/// Open listing of one in-memory directory
#[derive(Debug)]
pub struct MemoryListing {
    items: vec::IntoIter<io::Result<OwnedEntry>>,
    packer: Packer,
}

impl BulkDirectory for MemoryListing {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<u32> {
        self.packer.fill(buf, self.items.by_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkEnumerator;

    fn names(tree: &MemoryTree, path: &str) -> Vec<String> {
        let dir = tree.open(Path::new(path)).unwrap();
        BulkEnumerator::new(dir, Path::new(path), 4096)
            .unwrap()
            .filter_map(|r| r.ok())
            .filter(|r| !r.is_dot_entry())
            .map(|r| r.display_name())
            .collect()
    }

    #[test]
    fn test_parents_created_implicitly() {
        let mut tree = MemoryTree::new("/r");
        tree.file("/r/a/b/c.txt", 1, 1);

        assert_eq!(names(&tree, "/r"), vec!["a"]);
        assert_eq!(names(&tree, "/r/a"), vec!["b"]);
        assert_eq!(names(&tree, "/r/a/b"), vec!["c.txt"]);
    }

    #[test]
    fn test_open_errors() {
        let mut tree = MemoryTree::new("/r");
        tree.deny("/r/locked", libc::EACCES);

        let err = tree.open(Path::new("/r/locked")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err = tree.open(Path::new("/r/missing")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_fail_after_yields_partial_listing() {
        let mut tree = MemoryTree::new("/r").without_dot_entries();
        tree.file("/r/a", 1, 1).file("/r/b", 2, 1).file("/r/c", 3, 1);
        tree.fail_after("/r", 2);

        let dir = tree.open(Path::new("/r")).unwrap();
        let results: Vec<_> = BulkEnumerator::new(dir, Path::new("/r"), 4096)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[test]
    fn test_hard_link_shares_size() {
        let mut tree = MemoryTree::new("/r").without_dot_entries();
        tree.file("/r/a", 9, 4).hard_link("/r/b", 9);

        let dir = tree.open(Path::new("/r")).unwrap();
        let blocks: Vec<_> = BulkEnumerator::new(dir, Path::new("/r"), 4096)
            .unwrap()
            .map(|r| {
                let r = r.unwrap();
                (r.inode, r.blocks())
            })
            .collect();
        assert_eq!(blocks, vec![(9, 4), (9, 4)]);
    }
}
