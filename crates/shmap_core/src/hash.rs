//! Key hashing.
//!
//! The hash decides which segment owns a key and where the key sits in that
//! segment's index. Both are persisted implicitly in the mapped region, so the
//! function must produce the same value in every process and every build:
//! it is FNV-1a over the encoded key bytes followed by the SplitMix64
//! finalizer for avalanche.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hashes encoded key bytes.
#[inline]
#[must_use]
pub fn hash_key(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= u64::from(b);
        h = h.wrapping_mul(FNV_PRIME);
    }
    // Length is mixed in so that zero-padded keys do not collide trivially.
    h ^= bytes.len() as u64;

    h ^= h >> 30;
    h = h.wrapping_mul(0xbf58_476d_1ce4_e5b9);
    h ^= h >> 27;
    h = h.wrapping_mul(0x94d0_49bb_1331_11eb);
    h ^= h >> 31;
    h
}

/// Segment owning a hash, for a power-of-two segment count.
#[inline]
#[must_use]
pub(crate) fn segment_for(hash: u64, segments: usize) -> usize {
    (hash as usize) & (segments - 1)
}

/// Home index cell of a hash, for a power-of-two index capacity.
///
/// Uses the high half of the hash so it is independent of the segment choice.
#[inline]
#[must_use]
pub(crate) fn home_cell(hash: u64, capacity: usize) -> usize {
    ((hash >> 32) as usize) & (capacity - 1)
}
