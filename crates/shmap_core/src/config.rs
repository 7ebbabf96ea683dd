//! Store configuration.

use crate::error::{StoreError, StoreResult};
use crate::view::Schema;
use std::path::{Path, PathBuf};

/// Largest number of segments a store may be partitioned into.
pub const MAX_SEGMENTS: usize = 1 << 16;

/// Configuration for creating or opening a shared map.
#[derive(Debug, Clone)]
pub struct Config {
    /// Planned total number of keys.
    pub entries: u64,

    /// Minimum number of segments; rounded up to a power of two.
    pub min_segments: usize,

    /// Maximum size of a stored value in bytes.
    pub entry_size: usize,

    /// Maximum size of an encoded key in bytes.
    pub max_key_size: usize,

    /// Skip reading back the previous value on `put`.
    pub put_returns_null: bool,

    /// Skip reading back the previous value on `remove`.
    pub remove_returns_null: bool,

    /// Backing file; `None` maps anonymous memory.
    pub path: Option<PathBuf>,

    /// Create missing parent directories of `path`.
    pub create_dirs: bool,

    /// Record layout for zero-copy value views.
    pub value_schema: Option<Schema>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entries: 1 << 14,
            min_segments: 128,
            entry_size: 256,
            max_key_size: 64,
            put_returns_null: false,
            remove_returns_null: false,
            path: None,
            create_dirs: false,
            value_schema: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the planned number of entries.
    #[must_use]
    pub const fn entries(mut self, entries: u64) -> Self {
        self.entries = entries;
        self
    }

    /// Sets the minimum number of segments.
    #[must_use]
    pub const fn min_segments(mut self, segments: usize) -> Self {
        self.min_segments = segments;
        self
    }

    /// Sets the maximum value size in bytes.
    #[must_use]
    pub const fn entry_size(mut self, size: usize) -> Self {
        self.entry_size = size;
        self
    }

    /// Sets the maximum encoded key size in bytes.
    #[must_use]
    pub const fn max_key_size(mut self, size: usize) -> Self {
        self.max_key_size = size;
        self
    }

    /// Makes `put` skip reading back the previous value.
    #[must_use]
    pub const fn put_returns_null(mut self, value: bool) -> Self {
        self.put_returns_null = value;
        self
    }

    /// Makes `remove` skip reading back the previous value.
    #[must_use]
    pub const fn remove_returns_null(mut self, value: bool) -> Self {
        self.remove_returns_null = value;
        self
    }

    /// Backs the store with the file at `path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets whether missing parent directories of the backing file are created.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }

    /// Registers the record layout used by zero-copy value views.
    #[must_use]
    pub fn value_schema(mut self, schema: Schema) -> Self {
        self.value_schema = Some(schema);
        self
    }

    /// Returns `true` if values are accessed through a schema-driven view.
    #[must_use]
    pub fn generated_value_type(&self) -> bool {
        self.value_schema.is_some()
    }

    /// Returns the backing file path, if any.
    #[must_use]
    pub fn backing_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the segment count the store will use.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.min_segments.clamp(1, MAX_SEGMENTS).next_power_of_two()
    }

    /// Checks that the configuration can produce a store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> StoreResult<()> {
        if self.entries == 0 {
            return Err(StoreError::invalid_config("entries must be greater than zero"));
        }
        if self.entry_size == 0 {
            return Err(StoreError::invalid_config(
                "entry size must be greater than zero",
            ));
        }
        if self.max_key_size == 0 {
            return Err(StoreError::invalid_config(
                "max key size must be greater than zero",
            ));
        }
        if self.entry_size > u32::MAX as usize {
            return Err(StoreError::invalid_config(format!(
                "entry size must fit in 32 bits, got {}",
                self.entry_size
            )));
        }
        if self.max_key_size > u32::MAX as usize {
            return Err(StoreError::invalid_config(format!(
                "max key size must fit in 32 bits, got {}",
                self.max_key_size
            )));
        }
        if self.min_segments > MAX_SEGMENTS {
            return Err(StoreError::invalid_config(format!(
                "at most {MAX_SEGMENTS} segments are supported, got {}",
                self.min_segments
            )));
        }
        if let Some(schema) = &self.value_schema {
            if schema.size() > self.entry_size {
                return Err(StoreError::invalid_config(format!(
                    "value schema {} needs {} bytes but entry size is {}",
                    schema.name(),
                    schema.size(),
                    self.entry_size
                )));
            }
        }
        Ok(())
    }
}
