//! Key hash test vectors.
//!
//! The key hash decides where every entry lives in a mapped file, so any
//! process that opens the file has to compute exactly the same value. These
//! vectors pin the function and can be exported as JSON for other readers of
//! the format.

use serde::{Deserialize, Serialize};
use shmap_core::hash_key;

/// A hash test vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Encoded key bytes (hex-encoded).
    pub input_hex: String,
    /// Expected 64-bit hash (hex-encoded, big-endian, no prefix).
    pub expected_hash: String,
    /// Segment the key routes to in a 128-segment store.
    pub segment_of_128: u32,
}

impl HashVector {
    fn new(id: &str, description: &str, input: &[u8], hash: u64) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_hex: to_hex(input),
            expected_hash: format!("{hash:016x}"),
            segment_of_128: (hash & 127) as u32,
        }
    }

    /// Decodes the input bytes.
    pub fn input(&self) -> Vec<u8> {
        from_hex(&self.input_hex).expect("invalid input hex")
    }

    /// Parses the expected hash.
    pub fn expected(&self) -> u64 {
        u64::from_str_radix(&self.expected_hash, 16).expect("invalid hash hex")
    }

    /// Returns true if `hash_key` agrees with this vector.
    pub fn check(&self) -> bool {
        hash_key(&self.input()) == self.expected()
    }
}

/// Key hash vectors.
pub fn hash_vectors() -> Vec<HashVector> {
    vec![
        HashVector::new("hash_empty", "Empty key", b"", 0xf52a_15e9_a9b5_e89b),
        HashVector::new("hash_nul", "Single NUL byte", &[0], 0x4d2e_17cf_f9d4_7d4b),
        HashVector::new("hash_a", "Single ASCII byte", b"a", 0x8097_ca68_b9cc_797b),
        HashVector::new("hash_key1", "Tutorial string key", b"key1", 0x63e6_1ec3_f75b_ef90),
        HashVector::new(
            "hash_user_42",
            "String key with separator",
            b"user:42",
            0xcc91_215c_b293_ae75,
        ),
        HashVector::new(
            "hash_hello_world",
            "Multi-word string key",
            b"hello world",
            0x9ced_922f_75a3_2c9d,
        ),
        HashVector::new(
            "hash_i32_42",
            "32-bit integer 42, little-endian",
            &[0x2a, 0, 0, 0],
            0xcd84_3100_da99_643a,
        ),
        HashVector::new(
            "hash_u64_zero",
            "64-bit zero",
            &[0; 8],
            0x2ab0_190e_678f_8793,
        ),
        HashVector::new(
            "hash_u64_one",
            "64-bit integer 1, little-endian",
            &[1, 0, 0, 0, 0, 0, 0, 0],
            0xe0a4_b28d_e12a_a617,
        ),
    ]
}

/// All vectors as pretty-printed JSON.
pub fn all_vectors_json() -> String {
    serde_json::to_string_pretty(&hash_vectors()).expect("vectors serialize")
}

/// Parses vectors from JSON.
pub fn vectors_from_json(json: &str) -> Result<Vec<HashVector>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Encodes bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes hex, returning `None` on odd length or invalid digits.
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
