//! Low-level primitives for building the symbol store.
//!
//! Includes byte utilities, positioned file I/O and read-only mappings.

/// Byte-level utilities and encoding/decoding.
pub mod bytes;

/// I/O abstractions and utilities.
///
/// Interfaces for reading/writing data and file operations.
pub mod io;

/// Read-only memory mappings.
pub mod mmap;
