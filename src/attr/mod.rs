//! Packed attribute records returned by bulk directory enumeration
//!
//! `getattrlistbulk(2)` fills a caller buffer with one variable-length
//! record per directory entry. Which fields a record carries depends on the
//! attribute set the kernel chose to return for that entry, so every record
//! is self-describing:
//!
//! ```text
//! offset  field                     present when
//! ──────  ────────────────────────  ─────────────────────────────
//!   0     length           u32      always
//!   4     returned attrs   5 × u32  always
//!  24     name ref         i32+u32  common & ATTR_CMN_NAME      <- offset origin
//!   .     error            u32      common & ATTR_CMN_ERROR
//!   .     objtype          u32      common & ATTR_CMN_OBJTYPE
//!   .     fileid           u64      common & ATTR_CMN_FILEID
//!   .     allocsize        i64      file   & ATTR_FILE_ALLOCSIZE
//!   .     name bytes       NUL, padded to 4
//! ```
//!
//! [`decode`] turns a filled buffer into [`DecodedRecord`]s, [`encode`]
//! produces the same layout for the portable primitive and for tests.

pub mod decode;
pub mod encode;

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

pub use decode::RecordDecoder;
pub use encode::{EntryAttrs, RecordWriter};

/// Common attribute: entry name (`attrreference_t`)
pub const ATTR_CMN_NAME: u32 = 0x0000_0001;
/// Common attribute: object type (`fsobj_type_t`)
pub const ATTR_CMN_OBJTYPE: u32 = 0x0000_0008;
/// Common attribute: file id / inode number (`u_int64_t`)
pub const ATTR_CMN_FILEID: u32 = 0x0200_0000;
/// Common attribute: per-entry error code (`u_int32_t`)
pub const ATTR_CMN_ERROR: u32 = 0x2000_0000;
/// Common attribute: the returned attribute set itself
pub const ATTR_CMN_RETURNED_ATTRS: u32 = 0x8000_0000;
/// File attribute: allocated size in bytes (`off_t`)
pub const ATTR_FILE_ALLOCSIZE: u32 = 0x0000_0004;

/// Attributes requested for every directory
pub const REQUESTED_COMMON: u32 =
    ATTR_CMN_RETURNED_ATTRS | ATTR_CMN_NAME | ATTR_CMN_ERROR | ATTR_CMN_OBJTYPE | ATTR_CMN_FILEID;
pub const REQUESTED_FILE: u32 = ATTR_FILE_ALLOCSIZE;

/// vnode types from `<sys/vnode.h>`
pub const VNON: u32 = 0;
pub const VREG: u32 = 1;
pub const VDIR: u32 = 2;
pub const VLNK: u32 = 5;

/// Size of the length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;
/// Size of `attribute_set_t`
pub const ATTRIBUTE_SET_LEN: usize = 20;
/// Every valid record is at least this long
pub const HEADER_LEN: usize = LENGTH_PREFIX_LEN + ATTRIBUTE_SET_LEN;
/// Size of `attrreference_t`
pub const ATTR_REF_LEN: usize = 8;

/// Disk usage is reported in units of this many bytes
pub const BLOCK_SIZE: u64 = 512;

/// Returned attribute groups (`attribute_set_t`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeSet {
    pub common: u32,
    pub vol: u32,
    pub dir: u32,
    pub file: u32,
    pub fork: u32,
}

impl AttributeSet {
    pub fn has_common(&self, bit: u32) -> bool {
        self.common & bit != 0
    }

    pub fn has_file(&self, bit: u32) -> bool {
        self.file & bit != 0
    }
}

/// Kind of filesystem object behind an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    SymbolicLink,
    /// Devices, fifos, sockets and anything without a type
    Other,
}

impl ObjKind {
    /// Convert from a vnode type
    pub fn from_vtype(vtype: u32) -> Self {
        match vtype {
            VREG => ObjKind::Regular,
            VDIR => ObjKind::Directory,
            VLNK => ObjKind::SymbolicLink,
            _ => ObjKind::Other,
        }
    }

    /// vnode type written on the wire
    pub fn as_vtype(&self) -> u32 {
        match self {
            ObjKind::Regular => VREG,
            ObjKind::Directory => VDIR,
            ObjKind::SymbolicLink => VLNK,
            // VBLK, closest generic "not a file" type
            ObjKind::Other => 3,
        }
    }
}

/// Outcome of decoding one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Fully decoded
    Ok,
    /// "." or "..", nothing past the name was decoded
    DotEntry,
    /// Kernel reported an error for this entry (errno value)
    Failed(u32),
}

/// One directory entry decoded from an enumeration buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// Entry name without the NUL terminator (empty if not returned)
    pub name: Vec<u8>,

    /// Object kind (`Other` if not returned)
    pub kind: ObjKind,

    /// Inode number, 0 if not returned
    pub inode: u64,

    /// Allocated bytes, regular files only
    pub allocated_bytes: Option<u64>,

    pub status: RecordStatus,
}

impl DecodedRecord {
    /// Name as an OS string, for path joins
    pub fn name_os(&self) -> &OsStr {
        OsStr::from_bytes(&self.name)
    }

    /// Lossy name for diagnostics
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    pub fn is_dot_entry(&self) -> bool {
        self.status == RecordStatus::DotEntry
    }

    /// Errno if the kernel flagged this entry
    pub fn error_code(&self) -> Option<u32> {
        match self.status {
            RecordStatus::Failed(code) => Some(code),
            _ => None,
        }
    }

    /// 512-byte blocks this entry occupies, 0 for anything but a regular file
    pub fn blocks(&self) -> u64 {
        match (self.kind, self.allocated_bytes) {
            (ObjKind::Regular, Some(bytes)) => blocks_from_bytes(bytes),
            _ => 0,
        }
    }
}

/// Convert bytes to 512-byte blocks, rounding up like du
pub fn blocks_from_bytes(bytes: u64) -> u64 {
    bytes.div_ceil(BLOCK_SIZE)
}

/// "." and ".." are never counted or descended into
pub fn is_dot_or_dotdot(name: &[u8]) -> bool {
    name == b"." || name == b".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_from_bytes() {
        assert_eq!(blocks_from_bytes(0), 0);
        assert_eq!(blocks_from_bytes(1), 1);
        assert_eq!(blocks_from_bytes(512), 1);
        assert_eq!(blocks_from_bytes(513), 2);
        assert_eq!(blocks_from_bytes(4096), 8);
    }

    #[test]
    fn test_obj_kind_from_vtype() {
        assert_eq!(ObjKind::from_vtype(VREG), ObjKind::Regular);
        assert_eq!(ObjKind::from_vtype(VDIR), ObjKind::Directory);
        assert_eq!(ObjKind::from_vtype(VLNK), ObjKind::SymbolicLink);
        assert_eq!(ObjKind::from_vtype(VNON), ObjKind::Other);
        assert_eq!(ObjKind::from_vtype(7), ObjKind::Other);
        assert_eq!(ObjKind::from_vtype(ObjKind::Other.as_vtype()), ObjKind::Other);
    }

    #[test]
    fn test_dot_detection() {
        assert!(is_dot_or_dotdot(b"."));
        assert!(is_dot_or_dotdot(b".."));
        assert!(!is_dot_or_dotdot(b"..."));
        assert!(!is_dot_or_dotdot(b".hidden"));
    }

    #[test]
    fn test_record_blocks_only_for_regular() {
        let mut rec = DecodedRecord {
            name: b"x".to_vec(),
            kind: ObjKind::Regular,
            inode: 1,
            allocated_bytes: Some(1000),
            status: RecordStatus::Ok,
        };
        assert_eq!(rec.blocks(), 2);

        rec.kind = ObjKind::SymbolicLink;
        assert_eq!(rec.blocks(), 0);
    }
}
