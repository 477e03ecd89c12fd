use std::path::{Path, PathBuf};

use crate::types::{Result, SymbolError};

/// Suffix of the file holding the header and the offset index.
pub const OFFSETS_SUFFIX: &str = ".o";
/// Suffix of the value store file.
pub const VALUES_SUFFIX: &str = ".c";

/// When symbol map files are flushed to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Synchronous {
    /// Sync on create, commit, rollback and close.
    Full,
    /// Sync on create and close only.
    #[default]
    Normal,
    /// Never sync; durability is left to the operating system.
    Off,
}

impl Synchronous {
    pub(crate) fn on_create(self) -> bool {
        !matches!(self, Synchronous::Off)
    }

    pub(crate) fn on_commit(self) -> bool {
        matches!(self, Synchronous::Full)
    }

    pub(crate) fn on_close(self) -> bool {
        !matches!(self, Synchronous::Off)
    }
}

/// Configuration shared by every symbol map opened under one root.
#[derive(Clone, Debug)]
pub struct SymbolMapConfig {
    /// Directory holding the column files.
    pub root: PathBuf,
    /// Flush policy.
    pub synchronous: Synchronous,
}

impl SymbolMapConfig {
    /// Creates a configuration rooted at `root` with default settings.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            synchronous: Synchronous::default(),
        }
    }

    /// Sets the flush policy.
    pub fn synchronous(mut self, synchronous: Synchronous) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// Path of the header/offset file for `name`.
    pub fn offsets_path(&self, name: &str) -> Result<PathBuf> {
        column_file(&self.root, name, OFFSETS_SUFFIX)
    }

    /// Path of the value store file for `name`.
    pub fn values_path(&self, name: &str) -> Result<PathBuf> {
        column_file(&self.root, name, VALUES_SUFFIX)
    }
}

fn column_file(root: &Path, name: &str, suffix: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(SymbolError::Invalid("column name is empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(SymbolError::Invalid("column name contains a path separator"));
    }
    Ok(root.join(format!("{name}{suffix}")))
}

/// Column properties supplied by schema handling when a symbol column is
/// declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolColumnDescriptor {
    /// Column name; also the stem of the column's files.
    pub name: String,
    /// Expected number of distinct symbols.
    pub capacity: u32,
    /// Whether writers keep an in-memory dedup cache.
    pub cached: bool,
}

impl SymbolColumnDescriptor {
    /// Describes a cached column.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            capacity,
            cached: true,
        }
    }

    /// Sets the cache flag.
    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }
}
