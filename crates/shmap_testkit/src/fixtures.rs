//! Test fixtures and map helpers.

use shmap_core::{Config, Decode, Encode, SharedMap};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// The small geometry used throughout the tutorials: 10 entries spread over
/// 128 segments, values of at most 24 bytes.
pub fn tutorial_config() -> Config {
    Config::new().entries(10).min_segments(128).entry_size(24)
}

/// A test map with automatic cleanup of its backing file.
pub struct TestMap<K, V> {
    /// The map instance.
    pub map: SharedMap<K, V>,
    config: Config,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl<K, V> TestMap<K, V> {
    /// Creates a map in anonymous memory.
    pub fn memory(config: Config) -> Self {
        let map = SharedMap::open(config.clone()).expect("Failed to open anonymous map");
        Self {
            map,
            config,
            _temp_dir: None,
        }
    }

    /// Creates a map backed by a file in a fresh temporary directory.
    pub fn file(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config.path(temp_dir.path().join("map.shm"));
        let map = SharedMap::open(config.clone()).expect("Failed to open file map");
        Self {
            map,
            config,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the backing file path, if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        self.config.path.clone()
    }

    /// Returns the configuration the map was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a second, independent handle on the same backing file.
    ///
    /// This is how tests stand in for a second process.
    pub fn second_handle(&self) -> SharedMap<K, V> {
        assert!(self.path().is_some(), "only file maps can be shared");
        SharedMap::open(self.config.clone()).expect("Failed to open second handle")
    }

    /// Closes the map and opens the same file again.
    pub fn reopen(self) -> Self {
        let Self {
            map,
            config,
            _temp_dir,
        } = self;
        map.close().expect("Failed to close map");
        let map = SharedMap::open(config.clone()).expect("Failed to reopen map");
        Self {
            map,
            config,
            _temp_dir,
        }
    }
}

impl<K, V> std::ops::Deref for TestMap<K, V> {
    type Target = SharedMap<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.map
    }
}

/// Runs a test with a temporary anonymous map using [`tutorial_config`].
pub fn with_temp_map<K, V, F, R>(f: F) -> R
where
    F: FnOnce(&SharedMap<K, V>) -> R,
{
    let test_map = TestMap::memory(tutorial_config());
    f(&test_map.map)
}

/// Runs a test with a temporary file-backed map using [`tutorial_config`].
pub fn with_file_map<K, V, F, R>(f: F) -> R
where
    F: FnOnce(&SharedMap<K, V>, &Path) -> R,
{
    let test_map = TestMap::file(tutorial_config());
    let path = test_map.path().expect("File map should have a path");
    f(&test_map.map, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A map holding `1 -> "1"`, `2 -> "2"`, `3 -> "3"`.
    pub fn numbered_map() -> TestMap<i32, String> {
        let test_map = TestMap::memory(Config::new().entries(16).min_segments(4).entry_size(16));
        for i in 1..=3 {
            test_map
                .put(&i, i.to_string().as_str())
                .expect("Failed to populate map");
        }
        test_map
    }

    /// A map populated with `count` keys `key{i}` mapped to `value{i}`.
    pub fn populated_map(count: usize) -> TestMap<String, String> {
        let test_map = TestMap::memory(
            Config::new()
                .entries(count as u64 * 4)
                .min_segments(16)
                .entry_size(32),
        );
        for i in 0..count {
            test_map
                .put(format!("key{i}").as_str(), format!("value{i}").as_str())
                .expect("Failed to populate map");
        }
        test_map
    }

    /// Collects every entry of `map`, panicking on store errors.
    pub fn snapshot<K, V>(map: &SharedMap<K, V>) -> Vec<(K, V)>
    where
        K: Encode + Decode,
        V: Encode + Decode,
    {
        map.iter()
            .map(|entry| entry.expect("Failed to iterate").into_pair())
            .collect()
    }
}
