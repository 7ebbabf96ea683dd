//! Error types for shmap core.

use shmap_region::RegionError;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Mapped region error.
    #[error("region error: {0}")]
    Region(#[from] RegionError),

    /// I/O error while opening, locking or closing the backing file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The segment owning the key has no free slot left.
    #[error("capacity exceeded in segment {segment}")]
    CapacityExceeded {
        /// Index of the exhausted segment.
        segment: usize,
    },

    /// A value is larger than the configured entry size.
    #[error("entry too large: {size} bytes exceeds the maximum of {max}")]
    EntryTooLarge {
        /// Size of the rejected value.
        size: usize,
        /// Configured maximum entry size.
        max: usize,
    },

    /// A key is larger than the configured key size.
    #[error("key too large: {size} bytes exceeds the maximum of {max}")]
    KeyTooLarge {
        /// Size of the rejected key.
        size: usize,
        /// Configured maximum key size.
        max: usize,
    },

    /// A value view was dereferenced before being bound to an entry.
    #[error("value view is not bound to an entry")]
    NotBound,

    /// The store backing a view has been closed.
    #[error("store is closed")]
    StoreClosed,

    /// An existing backing file does not match the requested layout.
    #[error("incompatible layout: {message}")]
    IncompatibleLayout {
        /// Description of the mismatch.
        message: String,
    },

    /// The configuration cannot produce a valid store.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A schema has no field with the given name.
    #[error("unknown field: {name}")]
    UnknownField {
        /// The requested field name.
        name: String,
    },

    /// A field was accessed as the wrong type.
    #[error("field {field} is {actual:?}, not {expected:?}")]
    FieldTypeMismatch {
        /// Field name.
        field: String,
        /// Type the caller asked for.
        expected: crate::view::FieldType,
        /// Type declared by the schema.
        actual: crate::view::FieldType,
    },

    /// Stored bytes could not be decoded into the requested type.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// A record busy-lock could not be taken in time.
    #[error("timed out waiting for record lock on field {field}")]
    LockTimeout {
        /// The lock field.
        field: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl StoreError {
    /// Creates an incompatible layout error.
    pub fn incompatible_layout(message: impl Into<String>) -> Self {
        Self::IncompatibleLayout {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(name: impl Into<String>) -> Self {
        Self::UnknownField { name: name.into() }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for failures caused by running out of space.
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}
