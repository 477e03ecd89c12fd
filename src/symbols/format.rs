//! Framing of the offset index and value store.
//!
//! ```text
//! <name>.o   header[64] | offset[0]: u64 LE | offset[1] | ...
//! <name>.c   varint(len) utf8[len] | varint(len) utf8[len] | ...
//! ```
//!
//! Offsets are contiguous: `offset[k + 1]` is where payload `k` ends.

use std::path::Path;

use tracing::warn;

use super::header::HEADER_LEN;
use crate::primitives::bytes::var;
use crate::primitives::io::FileIo;
use crate::types::{Result, SymbolError};

/// Width of one offset index entry.
pub const OFFSET_ENTRY_LEN: usize = 8;

/// File position of the offset entry for symbol `index`.
pub fn offset_pos(index: usize) -> u64 {
    HEADER_LEN as u64 + index as u64 * OFFSET_ENTRY_LEN as u64
}

/// Number of whole offset entries in an offset file of `len` bytes.
pub fn entries_in(len: u64) -> usize {
    (len.saturating_sub(HEADER_LEN as u64) / OFFSET_ENTRY_LEN as u64) as usize
}

/// Appends the framed payload for `value` to `out`.
pub fn encode_payload(value: &str, out: &mut Vec<u8>) {
    var::encode_u64(value.len() as u64, out);
    out.extend_from_slice(value.as_bytes());
}

/// Length of the framed payload for `value`.
pub fn payload_len(value: &str) -> usize {
    var::encoded_len(value.len() as u64) + value.len()
}

/// Decodes the payload starting at `off`. Returns the body and the position
/// just past it, or `None` if the payload runs past the end of `values`.
pub fn decode_payload(values: &[u8], off: usize) -> Option<(&[u8], usize)> {
    let mut pos = off;
    let len = usize::try_from(var::decode_u64(values, &mut pos)?).ok()?;
    let end = pos.checked_add(len)?;
    let body = values.get(pos..end)?;
    Some((body, end))
}

/// Reads offset entry `index` from a mapped offset file.
pub fn offset_at(offsets: &[u8], index: usize) -> Option<u64> {
    let start = offset_pos(index) as usize;
    let bytes = offsets.get(start..start + OFFSET_ENTRY_LEN)?;
    let mut buf = [0u8; OFFSET_ENTRY_LEN];
    buf.copy_from_slice(bytes);
    Some(u64::from_le_bytes(buf))
}

/// Reads offset entry `index` through positioned I/O.
pub fn read_offset(io: &dyn FileIo, index: usize) -> Result<u64> {
    let mut buf = [0u8; OFFSET_ENTRY_LEN];
    io.read_at(offset_pos(index), &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Valid extent of a symbol map: how many symbols are addressable and how
/// many value store bytes they occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Extent {
    /// Number of complete symbols.
    pub count: usize,
    /// Value store bytes covered by those symbols.
    pub values_len: u64,
}

/// End position of the payload at `off`, if it lies wholly within the first
/// `values_len` bytes of the value store.
fn payload_end(values: &dyn FileIo, off: u64, values_len: u64) -> Result<Option<u64>> {
    if off >= values_len {
        return Ok(None);
    }
    let avail = (values_len - off).min(var::MAX_LEN as u64) as usize;
    let mut prefix = [0u8; var::MAX_LEN];
    values.read_at(off, &mut prefix[..avail])?;
    let mut pos = 0usize;
    let Some(len) = var::decode_u64(&prefix[..avail], &mut pos) else {
        return Ok(None);
    };
    let end = off
        .checked_add(pos as u64)
        .and_then(|p| p.checked_add(len));
    Ok(end.filter(|&end| end <= values_len))
}

/// End of payload `index` if the entry is complete and starts where payload
/// `index - 1` ends. An undecodable predecessor is left to the contiguity
/// scan rather than treated as tail damage.
fn chained_end(
    offsets: &dyn FileIo,
    values: &dyn FileIo,
    index: usize,
    values_len: u64,
) -> Result<Option<u64>> {
    let off = read_offset(offsets, index)?;
    let start = if index == 0 {
        Some(0)
    } else {
        payload_end(values, read_offset(offsets, index - 1)?, values_len)?
    };
    if start.is_some_and(|start| start != off) {
        return Ok(None);
    }
    payload_end(values, off, values_len)
}

/// Slice counterpart of the entry check used by recovery, for mapped files.
pub fn chained_end_at(offsets: &[u8], values: &[u8], index: usize) -> Option<usize> {
    let off = usize::try_from(offset_at(offsets, index)?).ok()?;
    let start = if index == 0 {
        Some(0)
    } else {
        let prev = usize::try_from(offset_at(offsets, index - 1)?).ok()?;
        decode_payload(values, prev).map(|(_, end)| end)
    };
    if start.is_some_and(|start| start != off) {
        return None;
    }
    decode_payload(values, off).map(|(_, end)| end)
}

/// Finds the last fully written symbol.
///
/// Partial trailing offset bytes are ignored. Walking back from the last
/// entry, an entry is dropped when its payload is cut short, lies past the
/// value store end, or does not start where the previous payload ends (a
/// zero-filled or stale offset). The returned extent never exceeds what the
/// files hold; nothing is modified.
pub fn recover_extent(
    offsets: &dyn FileIo,
    values: &dyn FileIo,
    offsets_path: &Path,
) -> Result<Extent> {
    let offsets_len = offsets.len()?;
    let values_len = values.len()?;
    let mut count = entries_in(offsets_len);
    let whole = offset_pos(count);
    if whole != offsets_len {
        warn!(
            path = %offsets_path.display(),
            trailing = offsets_len - whole,
            "symbols.recover.partial_offset"
        );
    }
    while count > 0 {
        if let Some(end) = chained_end(offsets, values, count - 1, values_len)? {
            return Ok(Extent {
                count,
                values_len: end,
            });
        }
        warn!(
            path = %offsets_path.display(),
            index = count - 1,
            offset = read_offset(offsets, count - 1)?,
            values_len,
            "symbols.recover.discard_entry"
        );
        count -= 1;
    }
    Ok(Extent::default())
}

/// Value store length occupied by the first `count` symbols, given that the
/// map currently holds `extent`.
pub fn values_len_at(offsets: &dyn FileIo, count: usize, extent: Extent) -> Result<u64> {
    if count == extent.count {
        Ok(extent.values_len)
    } else if count == 0 {
        Ok(0)
    } else {
        read_offset(offsets, count)
    }
}

/// Walks the first `count` symbols, checking that offsets are contiguous and
/// that every payload is valid UTF-8.
pub struct PayloadScan<'a> {
    path: &'a Path,
    offsets: &'a [u8],
    values: &'a [u8],
    index: usize,
    count: usize,
    expected: u64,
}

impl<'a> PayloadScan<'a> {
    /// `offsets` is the full offset file image, header included.
    pub fn new(path: &'a Path, offsets: &'a [u8], values: &'a [u8], count: usize) -> Self {
        Self {
            path,
            offsets,
            values,
            index: 0,
            count,
            expected: 0,
        }
    }

    /// Starts the walk at symbol `index`, whose payload begins at `offset`.
    pub fn starting_at(mut self, index: usize, offset: u64) -> Self {
        self.index = index;
        self.expected = offset;
        self
    }

    /// Value store position where the next payload is expected.
    pub fn position(&self) -> u64 {
        self.expected
    }

    fn step(&mut self) -> Result<(usize, &'a str)> {
        let index = self.index;
        let off = offset_at(self.offsets, index).ok_or_else(|| {
            SymbolError::corrupt(self.path, format!("offset entry {index} missing"))
        })?;
        if off != self.expected {
            return Err(SymbolError::corrupt(
                self.path,
                format!(
                    "offset index inconsistent with value store at key {index} (offset {off}, expected {})",
                    self.expected
                ),
            ));
        }
        let start = usize::try_from(off)
            .map_err(|_| SymbolError::corrupt(self.path, "offset exceeds address space"))?;
        let (body, end) = decode_payload(self.values, start).ok_or_else(|| {
            SymbolError::corrupt(self.path, format!("payload for key {index} truncated"))
        })?;
        let value = std::str::from_utf8(body).map_err(|err| {
            SymbolError::corrupt(
                self.path,
                format!("payload for key {index} is not valid UTF-8: {err}"),
            )
        })?;
        self.index += 1;
        self.expected = end as u64;
        Ok((index, value))
    }
}

impl<'a> Iterator for PayloadScan<'a> {
    type Item = Result<(usize, &'a str)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        match self.step() {
            Ok(item) => Some(Ok(item)),
            Err(err) => {
                self.index = self.count;
                Some(Err(err))
            }
        }
    }
}
