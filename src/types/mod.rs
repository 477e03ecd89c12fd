#![forbid(unsafe_code)]
//! Core identifiers and the error type shared by every layer.

use std::fmt;
use std::path::PathBuf;

/// Checksums guarding on-disk metadata.
pub mod checksum;

pub use checksum::header_crc32;

/// Sentinel key standing for the null symbol. Never stored, never assigned.
pub const VALUE_IS_NULL: i32 = -1;

/// Sentinel key returned when a lookup finds no matching symbol.
pub const VALUE_NOT_FOUND: i32 = -2;

/// Integer surrogate assigned to a symbol value.
///
/// Non-negative keys address stored symbols; the negative sentinels
/// [`SymbolKey::NULL`] and [`SymbolKey::NOT_FOUND`] never do.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct SymbolKey(pub i32);

impl SymbolKey {
    /// Key of the null symbol.
    pub const NULL: SymbolKey = SymbolKey(VALUE_IS_NULL);
    /// Result of a lookup that matched nothing.
    pub const NOT_FOUND: SymbolKey = SymbolKey(VALUE_NOT_FOUND);

    /// Returns true for the null sentinel.
    pub fn is_null(self) -> bool {
        self.0 == VALUE_IS_NULL
    }

    /// Returns true when the key addresses a stored symbol.
    pub fn is_found(self) -> bool {
        self.0 >= 0
    }

    /// Position of the key in the offset index, if it addresses a symbol.
    pub fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }

    pub(crate) fn from_index(index: usize) -> Option<Self> {
        i32::try_from(index)
            .ok()
            .filter(|&k| k != i32::MAX)
            .map(SymbolKey)
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for SymbolKey {
    fn from(key: i32) -> Self {
        SymbolKey(key)
    }
}

impl From<SymbolKey> for i32 {
    fn from(key: SymbolKey) -> Self {
        key.0
    }
}

/// Errors surfaced by symbol map operations.
#[derive(thiserror::Error, Debug)]
pub enum SymbolError {
    /// An expected file is missing.
    #[error("symbol map file {} does not exist", .0.display())]
    NotFound(PathBuf),
    /// `create` was called for a column whose files already exist.
    #[error("symbol map file {} already exists", .0.display())]
    AlreadyExists(PathBuf),
    /// On-disk layout is inconsistent or truncated.
    #[error("corrupt symbol map {}: {reason}", path.display())]
    CorruptFormat {
        /// File in which the inconsistency was found.
        path: PathBuf,
        /// Human-readable description of the violated invariant.
        reason: String,
    },
    /// `value_of` called with a key outside `[0, count)`.
    #[error("Invalid key {key}, symbol count is {count}")]
    InvalidKey {
        /// Offending key.
        key: i32,
        /// Number of symbols visible at the time of the call.
        count: usize,
    },
    /// Rollback target lies beyond the current symbol count.
    #[error("cannot roll back to {requested} symbols, only {count} present")]
    RollbackBeyondCount {
        /// Requested symbol count.
        requested: usize,
        /// Current symbol count.
        count: usize,
    },
    /// No further keys can be assigned.
    #[error("symbol key space exhausted at {0} symbols")]
    KeySpaceExhausted(usize),
    /// Caller supplied an unusable argument.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Underlying file or mapping operation failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl SymbolError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SymbolError::CorruptFormat {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for symbol map operations.
pub type Result<T> = std::result::Result<T, SymbolError>;
