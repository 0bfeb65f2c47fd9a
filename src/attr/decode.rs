//! Decoder for packed attribute records
//!
//! All reads are bounds-checked slice accesses against the current record.
//! A record whose length prefix or fields don't fit ends decoding of the
//! buffer: it means the usable data is exhausted, not that the directory is
//! broken, so it never surfaces as an error.

use super::{
    is_dot_or_dotdot, AttributeSet, DecodedRecord, ObjKind, RecordStatus, ATTR_CMN_ERROR,
    ATTR_CMN_FILEID, ATTR_CMN_NAME, ATTR_CMN_OBJTYPE, ATTR_FILE_ALLOCSIZE, HEADER_LEN,
    LENGTH_PREFIX_LEN,
};

/// Iterator over the records of one filled enumeration buffer
///
/// Yields at most `count` records. Stops early, setting [`truncated`], on
/// the first record that would read past the buffer or its own span.
///
/// [`truncated`]: RecordDecoder::truncated
#[derive(Debug)]
pub struct RecordDecoder<'a> {
    buf: &'a [u8],
    offset: usize,
    remaining: u32,
    truncated: bool,
}

impl<'a> RecordDecoder<'a> {
    /// Decode `count` records from the front of `buf`
    pub fn new(buf: &'a [u8], count: u32) -> Self {
        Self {
            buf,
            offset: 0,
            remaining: count,
            truncated: false,
        }
    }

    /// True if decoding stopped before `count` records were produced
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Records not yet produced
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    fn stop(&mut self) -> Option<DecodedRecord> {
        self.truncated = true;
        self.remaining = 0;
        None
    }
}

impl Iterator for RecordDecoder<'_> {
    type Item = DecodedRecord;

    fn next(&mut self) -> Option<DecodedRecord> {
        if self.remaining == 0 {
            return None;
        }

        let rest = &self.buf[self.offset..];
        let length = match read_u32(rest, 0) {
            Some(len) => len as usize,
            None => return self.stop(),
        };
        if length < HEADER_LEN || length > rest.len() {
            return self.stop();
        }

        // Advance by the prefix no matter how much of the record we parse
        let record = &rest[..length];
        self.offset += length;
        self.remaining -= 1;

        match decode_record(record) {
            Some(decoded) => Some(decoded),
            None => self.stop(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

/// Decode a single record, `record` spans exactly its length prefix
///
/// Returns `None` if any present field lies outside the record.
pub fn decode_record(record: &[u8]) -> Option<DecodedRecord> {
    let mut cur = Cursor::new(record, LENGTH_PREFIX_LEN);

    let returned = AttributeSet {
        common: cur.u32()?,
        vol: cur.u32()?,
        dir: cur.u32()?,
        file: cur.u32()?,
        fork: cur.u32()?,
    };

    let mut name: &[u8] = &[];
    if returned.has_common(ATTR_CMN_NAME) {
        // The data offset is relative to the attrreference_t, not the cursor
        let origin = cur.pos;
        let data_offset = cur.i32()?;
        let data_len = cur.u32()? as usize;
        name = resolve_name(record, origin, data_offset, data_len)?;

        if is_dot_or_dotdot(name) {
            return Some(DecodedRecord {
                name: name.to_vec(),
                kind: ObjKind::Other,
                inode: 0,
                allocated_bytes: None,
                status: RecordStatus::DotEntry,
            });
        }
    }

    if returned.has_common(ATTR_CMN_ERROR) {
        let code = cur.u32()?;
        if code != 0 {
            return Some(DecodedRecord {
                name: name.to_vec(),
                kind: ObjKind::Other,
                inode: 0,
                allocated_bytes: None,
                status: RecordStatus::Failed(code),
            });
        }
    }

    let kind = if returned.has_common(ATTR_CMN_OBJTYPE) {
        ObjKind::from_vtype(cur.u32()?)
    } else {
        ObjKind::Other
    };

    let inode = if returned.has_common(ATTR_CMN_FILEID) {
        cur.u64()?
    } else {
        0
    };

    let allocated_bytes = if kind == ObjKind::Regular && returned.has_file(ATTR_FILE_ALLOCSIZE) {
        // off_t, a negative size means nothing usable was reported
        Some(cur.i64()?.max(0) as u64)
    } else {
        None
    };

    Some(DecodedRecord {
        name: name.to_vec(),
        kind,
        inode,
        allocated_bytes,
        status: RecordStatus::Ok,
    })
}

/// Slice out the name referenced by an `attrreference_t` at `origin`
fn resolve_name(record: &[u8], origin: usize, data_offset: i32, data_len: usize) -> Option<&[u8]> {
    if data_len == 0 {
        return Some(&[]);
    }
    let start = usize::try_from(origin as i64 + data_offset as i64).ok()?;
    let end = start.checked_add(data_len)?;
    let bytes = record.get(start..end)?;

    // attr_length counts the terminator
    Some(match bytes.iter().position(|&b| b == 0) {
        Some(nul) => &bytes[..nul],
        None => bytes,
    })
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

/// Forward reader over one record
struct Cursor<'a> {
    record: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(record: &'a [u8], pos: usize) -> Self {
        Self { record, pos }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.pos.checked_add(N)?;
        let bytes = self.record.get(self.pos..end)?;
        self.pos = end;
        bytes.try_into().ok()
    }

    fn u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn i64(&mut self) -> Option<i64> {
        self.take::<8>().map(i64::from_le_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::encode::{encode_all, EntryAttrs};
    use crate::attr::ATTRIBUTE_SET_LEN;

    fn file(name: &str, inode: u64, bytes: u64) -> EntryAttrs<'_> {
        EntryAttrs::new(name.as_bytes())
            .kind(ObjKind::Regular)
            .inode(inode)
            .allocated(bytes)
    }

    #[test]
    fn test_decode_full_buffer() {
        let entries = [
            file("a.txt", 10, 1024),
            EntryAttrs::new(b"sub").kind(ObjKind::Directory).inode(11),
            EntryAttrs::new(b"link").kind(ObjKind::SymbolicLink).inode(12),
        ];
        let (buf, count) = encode_all(&entries);

        let mut decoder = RecordDecoder::new(&buf, count);
        let records: Vec<_> = decoder.by_ref().collect();
        assert!(!decoder.truncated());
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].name, b"a.txt");
        assert_eq!(records[0].kind, ObjKind::Regular);
        assert_eq!(records[0].inode, 10);
        assert_eq!(records[0].allocated_bytes, Some(1024));
        assert_eq!(records[0].status, RecordStatus::Ok);

        assert_eq!(records[1].kind, ObjKind::Directory);
        assert_eq!(records[1].allocated_bytes, None);
        assert_eq!(records[2].kind, ObjKind::SymbolicLink);
    }

    #[test]
    fn test_dot_entries_marked_without_decoding() {
        let entries = [
            EntryAttrs::new(b".").kind(ObjKind::Directory).inode(1),
            EntryAttrs::new(b"..").kind(ObjKind::Directory).inode(2),
            file("real", 3, 512),
        ];
        let (buf, count) = encode_all(&entries);
        let records: Vec<_> = RecordDecoder::new(&buf, count).collect();

        assert_eq!(records.len(), 3);
        assert!(records[0].is_dot_entry());
        assert!(records[1].is_dot_entry());
        // Fields past the name are left alone
        assert_eq!(records[0].inode, 0);
        assert_eq!(records[2].status, RecordStatus::Ok);
    }

    #[test]
    fn test_error_entry_skips_classification() {
        let entries = [
            EntryAttrs::new(b"broken").error(13),
            file("after", 5, 100),
        ];
        let (buf, count) = encode_all(&entries);
        let records: Vec<_> = RecordDecoder::new(&buf, count).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, RecordStatus::Failed(13));
        assert_eq!(records[0].error_code(), Some(13));
        assert_eq!(records[0].name, b"broken");
        assert_eq!(records[0].kind, ObjKind::Other);
        assert_eq!(records[1].name, b"after");
        assert_eq!(records[1].allocated_bytes, Some(100));
    }

    #[test]
    fn test_zero_error_code_is_not_a_failure() {
        let entries = [file("ok", 9, 10).error(0)];
        let (buf, count) = encode_all(&entries);
        let records: Vec<_> = RecordDecoder::new(&buf, count).collect();
        assert_eq!(records[0].status, RecordStatus::Ok);
        assert_eq!(records[0].inode, 9);
    }

    #[test]
    fn test_absent_fields_default() {
        // Name only: no type, no inode, no size
        let entries = [EntryAttrs::new(b"bare")];
        let (buf, count) = encode_all(&entries);
        let records: Vec<_> = RecordDecoder::new(&buf, count).collect();

        assert_eq!(records[0].kind, ObjKind::Other);
        assert_eq!(records[0].inode, 0);
        assert_eq!(records[0].allocated_bytes, None);

        // Regular file without ALLOCSIZE
        let entries = [EntryAttrs::new(b"nosize").kind(ObjKind::Regular).inode(4)];
        let (buf, count) = encode_all(&entries);
        let records: Vec<_> = RecordDecoder::new(&buf, count).collect();
        assert_eq!(records[0].kind, ObjKind::Regular);
        assert_eq!(records[0].allocated_bytes, None);
        assert_eq!(records[0].blocks(), 0);
    }

    #[test]
    fn test_zero_length_prefix_stops() {
        let (mut buf, count) = encode_all(&[file("a", 1, 1), file("b", 2, 1)]);
        let first_len = read_u32(&buf, 0).unwrap() as usize;
        buf[first_len..first_len + 4].copy_from_slice(&0u32.to_le_bytes());

        let mut decoder = RecordDecoder::new(&buf, count);
        let records: Vec<_> = decoder.by_ref().collect();
        assert_eq!(records.len(), 1);
        assert!(decoder.truncated());
    }

    #[test]
    fn test_length_past_buffer_stops() {
        let (buf, count) = encode_all(&[file("a", 1, 1), file("b", 2, 1)]);
        let cut = &buf[..buf.len() - 4];

        let mut decoder = RecordDecoder::new(cut, count);
        assert_eq!(decoder.by_ref().count(), 1);
        assert!(decoder.truncated());
    }

    #[test]
    fn test_count_larger_than_data_stops() {
        let (buf, _) = encode_all(&[file("only", 1, 1)]);
        let mut decoder = RecordDecoder::new(&buf, 5);
        assert_eq!(decoder.by_ref().count(), 1);
        assert!(decoder.truncated());
        assert_eq!(decoder.remaining(), 0);
    }

    #[test]
    fn test_count_smaller_than_data() {
        let (buf, _) = encode_all(&[file("a", 1, 1), file("b", 2, 1)]);
        let mut decoder = RecordDecoder::new(&buf, 1);
        assert_eq!(decoder.by_ref().count(), 1);
        assert!(!decoder.truncated());
    }

    #[test]
    fn test_short_record_stops() {
        let mut buf = vec![0u8; 64];
        buf[..4].copy_from_slice(&(HEADER_LEN as u32 - 1).to_le_bytes());
        let mut decoder = RecordDecoder::new(&buf, 1);
        assert!(decoder.next().is_none());
        assert!(decoder.truncated());
    }

    #[test]
    fn test_field_past_span_stops() {
        // Header claims NAME + FILEID but the span ends right after the header
        let mut record = vec![0u8; HEADER_LEN];
        record[..4].copy_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        record[4..8].copy_from_slice(&(ATTR_CMN_NAME | ATTR_CMN_FILEID).to_le_bytes());

        let mut decoder = RecordDecoder::new(&record, 1);
        assert!(decoder.next().is_none());
        assert!(decoder.truncated());
    }

    #[test]
    fn test_name_offset_outside_record_stops() {
        let (mut buf, count) = encode_all(&[file("abc", 1, 1)]);
        let ref_at = LENGTH_PREFIX_LEN + ATTRIBUTE_SET_LEN;
        buf[ref_at..ref_at + 4].copy_from_slice(&4096i32.to_le_bytes());

        let mut decoder = RecordDecoder::new(&buf, count);
        assert!(decoder.next().is_none());
        assert!(decoder.truncated());

        buf[ref_at..ref_at + 4].copy_from_slice(&(-100i32).to_le_bytes());
        assert!(RecordDecoder::new(&buf, count).next().is_none());
    }

    #[test]
    fn test_name_resolved_from_reference_origin() {
        let (buf, count) = encode_all(&[file("origin-check", 1, 1)]);
        let ref_at = LENGTH_PREFIX_LEN + ATTRIBUTE_SET_LEN;
        let offset = i32::from_le_bytes(buf[ref_at..ref_at + 4].try_into().unwrap()) as usize;
        assert_eq!(&buf[ref_at + offset..ref_at + offset + 12], b"origin-check");

        let rec = RecordDecoder::new(&buf, count).next().unwrap();
        assert_eq!(rec.name, b"origin-check");
    }

    #[test]
    fn test_negative_alloc_size_clamped() {
        let (mut buf, count) = encode_all(&[file("neg", 1, 0)]);
        let len = read_u32(&buf, 0).unwrap() as usize;
        // allocsize is the last fixed field before the padded name "neg\0"
        let alloc_at = len - 4 - 8;
        buf[alloc_at..alloc_at + 8].copy_from_slice(&(-1i64).to_le_bytes());

        let rec = RecordDecoder::new(&buf, count).next().unwrap();
        assert_eq!(rec.allocated_bytes, Some(0));
    }
}
