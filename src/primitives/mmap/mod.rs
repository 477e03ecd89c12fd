#![allow(unsafe_code)]
//! Read-only memory mappings of symbol map files.

use std::fs::File;

use memmap2::Mmap;

use crate::types::Result;

/// Read-only view of a file, mapped at a fixed length.
///
/// Empty files are not mapped and expose an empty slice. The mapping does
/// not follow later growth of the file; callers remap to observe it.
pub struct MappedFile {
    map: Option<Mmap>,
}

impl MappedFile {
    /// Maps the current extent of `file`.
    pub fn map(file: &File) -> Result<Self> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(Self { map: None });
        }
        // SAFETY: symbol map files are append-only for the lifetime of a
        // mapping. Truncation (rollback) while a reader holds a mapping is a
        // documented caller obligation not to race.
        let map = unsafe { Mmap::map(file)? };
        Ok(Self { map: Some(map) })
    }

    /// Mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Mapped length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
