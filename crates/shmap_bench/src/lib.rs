//! Benchmark utilities.

use rand::Rng;
use shmap_core::{Config, SharedMap};

/// Generate random value bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct string keys in random order.
pub fn shuffled_keys(count: usize) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut keys: Vec<String> = (0..count).map(|i| format!("key:{i}")).collect();
    for i in (1..keys.len()).rev() {
        keys.swap(i, rng.gen_range(0..=i));
    }
    keys
}

/// Configuration sized for `entries` keys and values of `value_size` bytes.
pub fn bench_config(entries: usize, value_size: usize) -> Config {
    Config::new()
        .entries(entries as u64)
        .min_segments(64)
        .entry_size(value_size.max(8))
}

/// Open an anonymous map holding `count` entries with `value_size`-byte values.
pub fn populated_map(count: usize, value_size: usize) -> (SharedMap<String, Vec<u8>>, Vec<String>) {
    let map = SharedMap::open(bench_config(count, value_size)).expect("Failed to open map");
    let keys = shuffled_keys(count);
    let value = random_data(value_size);
    for key in &keys {
        map.put(key.as_str(), &value).expect("Failed to populate map");
    }
    (map, keys)
}
