#![forbid(unsafe_code)]

/// CRC32 over a header body, salted with the format magic so that a header
/// copied between file kinds never validates.
pub fn header_crc32(magic: &[u8; 4], body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(magic);
    hasher.update(body);
    hasher.finalize()
}
