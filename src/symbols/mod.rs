#![forbid(unsafe_code)]

//! Persistent symbol maps: dictionary encoding of bounded-cardinality
//! string columns.
//!
//! Each column lives in two files under [`SymbolMapConfig::root`]: `<name>.o`
//! holds a fixed header followed by one offset per key, and `<name>.c` holds
//! the length-prefixed values. [`SymbolMapWriter`] is the single mutator;
//! any number of [`SymbolMapReader`]s may map the same column.

/// On-disk framing of offsets and values.
pub mod format;
/// Fixed header at the start of the offset file.
pub mod header;
/// Writer counters.
pub mod metrics;
/// Configuration and column descriptors.
pub mod options;
/// Read-only, memory-mapped access.
pub mod reader;
/// Append, rollback and commit.
pub mod writer;

pub use header::SymbolMapHeader;
pub use metrics::{SymbolMapMetrics, SymbolMapMetricsSnapshot};
pub use options::{SymbolColumnDescriptor, SymbolMapConfig, Synchronous};
pub use reader::SymbolMapReader;
pub use writer::SymbolMapWriter;
