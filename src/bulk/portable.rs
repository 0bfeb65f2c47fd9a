//! Portable enumeration primitive
//!
//! Reads a directory with `read_dir` and one `lstat` per entry, then packs
//! the results into the same record layout `getattrlistbulk(2)` produces.
//! Used on platforms without the bulk call. The decoder and aggregation
//! code above it can't tell the difference.

use super::{BulkDirectory, DirOpener, OwnedEntry, Packer};
use crate::attr::ObjKind;
use std::fs::{self, DirEntry, ReadDir};
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Opens directories with `read_dir`
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadDirOpener;

impl DirOpener for ReadDirOpener {
    type Dir = ReadDirSource;

    fn open(&self, path: &Path) -> io::Result<ReadDirSource> {
        Ok(ReadDirSource {
            entries: fs::read_dir(path)?,
            packer: Packer::default(),
        })
    }
}

/// Open directory stream, closed on drop
#[derive(Debug)]
pub struct ReadDirSource {
    entries: ReadDir,
    packer: Packer,
}

impl BulkDirectory for ReadDirSource {
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<u32> {
        let source = self.entries.by_ref().map(|next| next.map(|de| describe(&de)));
        self.packer.fill(buf, source)
    }
}

/// Gather what the bulk call would have returned for one entry
///
/// A failed `lstat` becomes an error record rather than a stream failure,
/// the way the kernel reports a per-entry error.
fn describe(de: &DirEntry) -> OwnedEntry {
    let name = de.file_name().into_vec();

    match de.metadata() {
        Ok(meta) => {
            let ft = meta.file_type();
            let kind = if ft.is_file() {
                ObjKind::Regular
            } else if ft.is_dir() {
                ObjKind::Directory
            } else if ft.is_symlink() {
                ObjKind::SymbolicLink
            } else {
                ObjKind::Other
            };

            OwnedEntry {
                name,
                kind: Some(kind),
                inode: Some(meta.ino()),
                allocated: (kind == ObjKind::Regular).then(|| meta.blocks().saturating_mul(512)),
                error: None,
            }
        }
        Err(e) => OwnedEntry {
            name,
            kind: None,
            inode: None,
            allocated: None,
            error: Some(e.raw_os_error().unwrap_or(libc::EIO) as u32),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkEnumerator;
    use std::collections::BTreeMap;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn collect(dir: &Path, buffer_size: usize) -> BTreeMap<String, (ObjKind, u64, u64)> {
        let source = ReadDirOpener.open(dir).unwrap();
        BulkEnumerator::new(source, dir, buffer_size)
            .unwrap()
            .map(|r| {
                let rec = r.unwrap();
                (rec.display_name(), (rec.kind, rec.inode, rec.blocks()))
            })
            .collect()
    }

    #[test]
    fn test_reports_kinds_and_inodes() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("file.txt"), vec![7u8; 10_000]).unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        symlink("file.txt", root.join("link")).unwrap();

        let entries = collect(root, 4096);
        assert_eq!(entries.len(), 3);

        let (kind, inode, blocks) = entries["file.txt"];
        let meta = fs::metadata(root.join("file.txt")).unwrap();
        assert_eq!(kind, ObjKind::Regular);
        assert_eq!(inode, meta.ino());
        assert_eq!(blocks, meta.blocks());

        assert_eq!(entries["sub"].0, ObjKind::Directory);
        assert_eq!(entries["sub"].2, 0);
        assert_eq!(entries["link"].0, ObjKind::SymbolicLink);
        assert_eq!(entries["link"].2, 0);
    }

    #[test]
    fn test_small_buffer_sees_every_entry() {
        let temp = TempDir::new().unwrap();
        for i in 0..200 {
            fs::write(temp.path().join(format!("f{:03}", i)), b"x").unwrap();
        }

        // Room for only a handful of records per call
        let entries = collect(temp.path(), 256);
        assert_eq!(entries.len(), 200);
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let err = ReadDirOpener.open(&temp.path().join("nope")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"data").unwrap();
        assert!(ReadDirOpener.open(&file).is_err());
    }
}
