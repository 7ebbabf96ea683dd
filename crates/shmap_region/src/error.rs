//! Error types for region operations.

use std::io;
use thiserror::Error;

/// Result type for region operations.
pub type RegionResult<T> = Result<T, RegionError>;

/// Errors that can occur while mapping or accessing a region.
#[derive(Debug, Error)]
pub enum RegionError {
    /// An I/O error occurred while mapping, resizing or syncing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An access reached beyond the end of the region.
    #[error("access out of bounds: offset {offset}, len {len}, size {size}")]
    OutOfBounds {
        /// The requested offset.
        offset: usize,
        /// The requested length.
        len: usize,
        /// The region size.
        size: usize,
    },

    /// An atomic access was not naturally aligned.
    #[error("misaligned atomic access at offset {offset} (requires {align}-byte alignment)")]
    Misaligned {
        /// The requested offset.
        offset: usize,
        /// The required alignment.
        align: usize,
    },

    /// A region of zero bytes was requested.
    #[error("cannot map a zero-length region")]
    ZeroLength,
}
