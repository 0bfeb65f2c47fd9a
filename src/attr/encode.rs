//! Encoder for packed attribute records
//!
//! Produces exactly what the kernel writes for the attributes dumac
//! requests, so the portable enumeration primitive and the tests can drive
//! the same decoder as `getattrlistbulk(2)`.

use super::{
    AttributeSet, ObjKind, ATTR_CMN_ERROR, ATTR_CMN_FILEID, ATTR_CMN_NAME, ATTR_CMN_OBJTYPE,
    ATTR_CMN_RETURNED_ATTRS, ATTR_FILE_ALLOCSIZE, ATTR_REF_LEN, HEADER_LEN,
};

/// Attributes of one entry to encode
///
/// Only the name is mandatory; every other field is written, and flagged
/// in the returned attribute set, only when it is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryAttrs<'a> {
    pub name: &'a [u8],
    pub kind: Option<ObjKind>,
    pub inode: Option<u64>,
    pub allocated: Option<u64>,
    pub error: Option<u32>,
}

impl<'a> EntryAttrs<'a> {
    pub fn new(name: &'a [u8]) -> Self {
        Self {
            name,
            kind: None,
            inode: None,
            allocated: None,
            error: None,
        }
    }

    pub fn kind(mut self, kind: ObjKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn inode(mut self, inode: u64) -> Self {
        self.inode = Some(inode);
        self
    }

    pub fn allocated(mut self, bytes: u64) -> Self {
        self.allocated = Some(bytes);
        self
    }

    pub fn error(mut self, code: u32) -> Self {
        self.error = Some(code);
        self
    }

    /// Attribute set the record will advertise
    pub fn returned(&self) -> AttributeSet {
        let mut set = AttributeSet {
            common: ATTR_CMN_RETURNED_ATTRS | ATTR_CMN_NAME,
            ..Default::default()
        };
        if self.error.is_some() {
            set.common |= ATTR_CMN_ERROR;
        }
        if self.kind.is_some() {
            set.common |= ATTR_CMN_OBJTYPE;
        }
        if self.inode.is_some() {
            set.common |= ATTR_CMN_FILEID;
        }
        if self.allocated.is_some() {
            set.file |= ATTR_FILE_ALLOCSIZE;
        }
        set
    }

    fn fixed_len(&self) -> usize {
        HEADER_LEN
            + ATTR_REF_LEN
            + self.error.map_or(0, |_| 4)
            + self.kind.map_or(0, |_| 4)
            + self.inode.map_or(0, |_| 8)
            + self.allocated.map_or(0, |_| 8)
    }

    /// Total record span including the NUL-terminated, padded name
    pub fn encoded_len(&self) -> usize {
        align4(self.fixed_len() + self.name.len() + 1)
    }
}

/// Packs records into a caller-provided buffer
#[derive(Debug)]
pub struct RecordWriter<'b> {
    buf: &'b mut [u8],
    len: usize,
    count: u32,
}

impl<'b> RecordWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self {
            buf,
            len: 0,
            count: 0,
        }
    }

    /// Append one record, returns false (writing nothing) if it doesn't fit
    pub fn push(&mut self, entry: &EntryAttrs<'_>) -> bool {
        let record_len = entry.encoded_len();
        let Some(end) = self.len.checked_add(record_len) else {
            return false;
        };
        if end > self.buf.len() || u32::try_from(record_len).is_err() {
            return false;
        }

        let record = &mut self.buf[self.len..end];
        record.fill(0);

        let returned = entry.returned();
        let mut pos = 0;
        put(record, &mut pos, &(record_len as u32).to_le_bytes());
        for group in [returned.common, returned.vol, returned.dir, returned.file, returned.fork] {
            put(record, &mut pos, &group.to_le_bytes());
        }

        // Name data goes after every fixed field, the offset is relative
        // to the attrreference_t itself
        let ref_origin = pos;
        let data_at = entry.fixed_len();
        put(record, &mut pos, &((data_at - ref_origin) as i32).to_le_bytes());
        put(record, &mut pos, &((entry.name.len() + 1) as u32).to_le_bytes());

        if let Some(code) = entry.error {
            put(record, &mut pos, &code.to_le_bytes());
        }
        if let Some(kind) = entry.kind {
            put(record, &mut pos, &kind.as_vtype().to_le_bytes());
        }
        if let Some(inode) = entry.inode {
            put(record, &mut pos, &inode.to_le_bytes());
        }
        if let Some(bytes) = entry.allocated {
            let off = i64::try_from(bytes).unwrap_or(i64::MAX);
            put(record, &mut pos, &off.to_le_bytes());
        }

        debug_assert_eq!(pos, data_at);
        put(record, &mut pos, entry.name);

        self.len = end;
        self.count += 1;
        true
    }

    /// Records written so far
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Encode every entry into a fresh buffer sized to fit them all
pub fn encode_all(entries: &[EntryAttrs<'_>]) -> (Vec<u8>, u32) {
    let total = entries.iter().map(EntryAttrs::encoded_len).sum();
    let mut buf = vec![0u8; total];
    let mut writer = RecordWriter::new(&mut buf);
    for entry in entries {
        writer.push(entry);
    }
    let count = writer.count();
    (buf, count)
}

fn put(record: &mut [u8], pos: &mut usize, bytes: &[u8]) {
    record[*pos..*pos + bytes.len()].copy_from_slice(bytes);
    *pos += bytes.len();
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}
