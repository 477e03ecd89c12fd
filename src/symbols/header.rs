use std::ops::Range;
use std::path::Path;

use crate::primitives::io::FileIo;
use crate::types::{header_crc32, Result, SymbolError};

/// Size of the header at the start of the offset file. Offsets follow it.
pub const HEADER_LEN: usize = 64;

/// Magic identifying a symbol map offset file.
pub const HEADER_MAGIC: [u8; 4] = *b"SYMO";

/// Current on-disk format version.
pub const FORMAT_VERSION: u16 = 1;

const HDR_MAGIC: Range<usize> = 0..4;
const HDR_VERSION: Range<usize> = 4..6;
const HDR_FLAGS: Range<usize> = 6..8;
const HDR_CAPACITY: Range<usize> = 8..16;
const HDR_RESERVED: Range<usize> = 16..60;
const HDR_CRC: Range<usize> = 60..64;

const FLAG_CACHED: u16 = 1 << 0;

const _: () = assert!(HDR_CRC.end == HEADER_LEN);

/// Fixed metadata written once when a symbol column is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolMapHeader {
    /// On-disk format version.
    pub format_version: u16,
    /// Number of distinct symbols the column was provisioned for.
    pub capacity: u64,
    /// Whether writers were requested to keep a dedup cache.
    pub cached: bool,
}

impl SymbolMapHeader {
    /// Header for a freshly created column.
    pub fn new(capacity: u64, cached: bool) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            capacity,
            cached,
        }
    }

    /// Encodes the header into a fixed-size buffer.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[HDR_MAGIC].copy_from_slice(&HEADER_MAGIC);
        buf[HDR_VERSION].copy_from_slice(&self.format_version.to_le_bytes());
        let flags = if self.cached { FLAG_CACHED } else { 0 };
        buf[HDR_FLAGS].copy_from_slice(&flags.to_le_bytes());
        buf[HDR_CAPACITY].copy_from_slice(&self.capacity.to_le_bytes());
        buf[HDR_RESERVED].fill(0);
        let crc = header_crc32(&HEADER_MAGIC, &buf[HDR_MAGIC.end..HDR_CRC.start]);
        buf[HDR_CRC].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates a header. `path` only labels errors.
    pub fn decode(path: &Path, src: &[u8]) -> Result<Self> {
        if src.len() < HEADER_LEN {
            return Err(SymbolError::corrupt(
                path,
                format!(
                    "header too short ({} bytes, need {HEADER_LEN})",
                    src.len()
                ),
            ));
        }
        let buf = &src[..HEADER_LEN];
        if buf[HDR_MAGIC] != HEADER_MAGIC {
            return Err(SymbolError::corrupt(path, "bad header magic"));
        }
        let stored_crc = u32::from_le_bytes(le_bytes(&buf[HDR_CRC]));
        let crc = header_crc32(&HEADER_MAGIC, &buf[HDR_MAGIC.end..HDR_CRC.start]);
        if stored_crc != crc {
            return Err(SymbolError::corrupt(
                path,
                format!("header checksum mismatch (stored {stored_crc:#010x}, computed {crc:#010x})"),
            ));
        }
        let format_version = u16::from_le_bytes(le_bytes(&buf[HDR_VERSION]));
        if format_version != FORMAT_VERSION {
            return Err(SymbolError::corrupt(
                path,
                format!("unsupported format version {format_version}"),
            ));
        }
        let flags = u16::from_le_bytes(le_bytes(&buf[HDR_FLAGS]));
        let capacity = u64::from_le_bytes(le_bytes(&buf[HDR_CAPACITY]));
        Ok(Self {
            format_version,
            capacity,
            cached: flags & FLAG_CACHED != 0,
        })
    }

    /// Reads and validates the header of an open offset file.
    pub fn load(io: &dyn FileIo, path: &Path) -> Result<Self> {
        let len = io.len()?;
        if len < HEADER_LEN as u64 {
            return Err(SymbolError::corrupt(
                path,
                format!("header too short ({len} bytes, need {HEADER_LEN})"),
            ));
        }
        let mut buf = [0u8; HEADER_LEN];
        io.read_at(0, &mut buf)?;
        Self::decode(path, &buf)
    }

    /// Writes the header at the start of an offset file.
    pub fn store(&self, io: &dyn FileIo) -> Result<()> {
        io.write_at(0, &self.encode())
    }
}

fn le_bytes<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&src[..N]);
    out
}
