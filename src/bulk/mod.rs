//! Bulk directory enumeration
//!
//! A directory is read through a primitive that packs metadata for as many
//! entries as fit into one caller buffer per call, instead of one status
//! call per entry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   BulkEnumerator                     │
//! │  - One per directory, owns one reusable buffer      │
//! │  - Lazy: refills only when the last batch is used   │
//! │  - Iterator<Item = ScanResult<DecodedRecord>>       │
//! └─────────────────────────┬───────────────────────────┘
//!                           │ fill(buf) -> record count
//!                           ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                   BulkDirectory                      │
//! │  macOS:  getattrlistbulk(2)                          │
//! │  other:  read_dir + lstat packed into the same      │
//! │          record layout                               │
//! │  tests:  in-memory tree                              │
//! └─────────────────────────────────────────────────────┘
//! ```

#[cfg(target_os = "macos")]
pub mod macos;
pub mod memory;
pub mod portable;

use crate::attr::{DecodedRecord, EntryAttrs, ObjKind, RecordDecoder, RecordWriter};
use crate::error::{ScanError, ScanResult};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use memory::MemoryTree;
pub use portable::ReadDirOpener;

/// Enumeration primitive of the current platform
#[cfg(target_os = "macos")]
pub type PlatformOpener = macos::AttrListOpener;

/// Enumeration primitive of the current platform
#[cfg(not(target_os = "macos"))]
pub type PlatformOpener = portable::ReadDirOpener;

/// Default enumeration buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 128 * 1024;

/// An open directory that can be enumerated in bulk
pub trait BulkDirectory {
    /// Pack records for as many remaining entries as fit into `buf`
    ///
    /// Returns the number of records written, 0 once the directory is
    /// exhausted.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<u32>;
}

/// Opens directories for bulk enumeration
///
/// Shared by every worker, so it must be `Sync`. The directories it hands
/// out are owned by a single worker.
pub trait DirOpener: Send + Sync {
    type Dir: BulkDirectory;

    fn open(&self, path: &Path) -> io::Result<Self::Dir>;
}

/// Lazy record sequence for one directory
///
/// Holds at most one buffer's worth of decoded records at a time. After a
/// primitive failure the error is yielded once and the iterator ends;
/// records yielded before it stay valid.
pub struct BulkEnumerator<D> {
    dir: D,
    path: PathBuf,
    buf: Vec<u8>,
    pending: VecDeque<DecodedRecord>,
    done: bool,
    calls: u64,
}

impl<D: BulkDirectory> BulkEnumerator<D> {
    /// Wrap an open directory, allocating a `buffer_size` byte buffer
    pub fn new(dir: D, path: &Path, buffer_size: usize) -> ScanResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(buffer_size)
            .map_err(|_| ScanError::BufferAlloc {
                path: path.to_path_buf(),
                size: buffer_size,
            })?;
        buf.resize(buffer_size, 0);

        Ok(Self {
            dir,
            path: path.to_path_buf(),
            buf,
            pending: VecDeque::new(),
            done: false,
            calls: 0,
        })
    }

    /// Directory being enumerated
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of primitive calls that returned records
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn refill(&mut self) -> Option<ScanResult<()>> {
        loop {
            match self.dir.fill(&mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return None;
                }
                Ok(count) => {
                    self.calls += 1;
                    let mut decoder = RecordDecoder::new(&self.buf, count);
                    self.pending.extend(decoder.by_ref());
                    if decoder.truncated() {
                        debug!(
                            path = %self.path.display(),
                            count,
                            decoded = self.pending.len(),
                            "Record buffer ended early"
                        );
                    }
                    return Some(Ok(()));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    self.done = true;
                    return Some(Err(ScanError::ReadFailed {
                        path: self.path.clone(),
                        source,
                    }));
                }
            }
        }
    }
}

impl<D: BulkDirectory> Iterator for BulkEnumerator<D> {
    type Item = ScanResult<DecodedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            if let Err(e) = self.refill()? {
                return Some(Err(e));
            }
        }
    }
}

/// Owned attributes of one entry waiting to be packed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedEntry {
    pub name: Vec<u8>,
    pub kind: Option<ObjKind>,
    pub inode: Option<u64>,
    pub allocated: Option<u64>,
    pub error: Option<u32>,
}

impl OwnedEntry {
    pub fn as_attrs(&self) -> EntryAttrs<'_> {
        EntryAttrs {
            name: &self.name,
            kind: self.kind,
            inode: self.inode,
            allocated: self.allocated,
            error: self.error,
        }
    }
}

/// Packs entries from an iterator into successive buffers
///
/// An entry that doesn't fit is carried to the next call. An error from
/// the source is held back until the records already packed have been
/// returned, the same way the kernel reports a failure on the call after
/// a partial batch.
#[derive(Debug, Default)]
pub struct Packer {
    carry: Option<OwnedEntry>,
    deferred: Option<io::Error>,
}

impl Packer {
    pub fn fill<I>(&mut self, buf: &mut [u8], source: I) -> io::Result<u32>
    where
        I: Iterator<Item = io::Result<OwnedEntry>>,
    {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }

        let mut writer = RecordWriter::new(buf);

        if let Some(entry) = self.carry.take() {
            if !writer.push(&entry.as_attrs()) {
                return Err(entry_too_large(&entry));
            }
        }

        for next in source {
            match next {
                Ok(entry) => {
                    if !writer.push(&entry.as_attrs()) {
                        if writer.is_empty() {
                            return Err(entry_too_large(&entry));
                        }
                        self.carry = Some(entry);
                        break;
                    }
                }
                Err(e) => {
                    if writer.is_empty() {
                        return Err(e);
                    }
                    self.deferred = Some(e);
                    break;
                }
            }
        }

        Ok(writer.count())
    }
}

fn entry_too_large(entry: &OwnedEntry) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!(
            "entry '{}' does not fit in the enumeration buffer",
            String::from_utf8_lossy(&entry.name)
        ),
    )
}
