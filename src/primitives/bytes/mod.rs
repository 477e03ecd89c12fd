#![forbid(unsafe_code)]
//! Varint helpers used by the value store payload framing.

pub mod var {
    //! Unsigned LEB128 varints.

    /// Longest encoding of a u64.
    pub const MAX_LEN: usize = 10;

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    /// Number of bytes `encode_u64` produces for `v`.
    pub fn encoded_len(v: u64) -> usize {
        let bits = 64 - v.max(1).leading_zeros() as usize;
        bits.div_ceil(7)
    }

    /// Decodes a varint at `*off`, advancing the offset.
    ///
    /// Returns `None` when the slice ends mid-varint or the value overflows
    /// 64 bits; `*off` is left untouched in that case.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Option<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        let mut idx = *off;
        for i in 0..MAX_LEN {
            let byte = *src.get(idx)?;
            idx += 1;
            let payload = (byte & 0x7f) as u64;
            if i == MAX_LEN - 1 && payload > 1 {
                return None;
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                *off = idx;
                return Some(result);
            }
            shift += 7;
        }
        None
    }
}
