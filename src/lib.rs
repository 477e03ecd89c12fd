//! Persistent dictionary encoding for symbol columns.
//!
//! Strings appended to a symbol column receive dense, stable integer keys.
//! The mapping survives restart, can be rolled back to any earlier count and
//! is served in both directions without scanning.

#![warn(missing_docs)]

pub mod primitives;
pub mod symbols;
pub mod types;

pub use symbols::{
    SymbolColumnDescriptor, SymbolMapConfig, SymbolMapReader, SymbolMapWriter, Synchronous,
};
pub use types::{Result, SymbolError, SymbolKey, VALUE_IS_NULL, VALUE_NOT_FOUND};
