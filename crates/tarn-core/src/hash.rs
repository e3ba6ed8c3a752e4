//! Snapshot version hashing for optimistic concurrency.
//!
//! A table's version is a digest of its `(id, updated)` pairs sorted by id.
//! The commit gate recomputes the digest from freshly loaded rows and
//! refuses to apply deltas when it has moved. The encoding below is a
//! stability contract: seed, version byte, and framing are frozen by tests.

use crate::record::DataRecord;
use xxhash_rust::xxh3::Xxh3;

/// Version-hash format byte included in every digest.
const VERSION_HASH_VERSION: u8 = 1;

/// Stable XXH3 seed for version hashing.
const VERSION_HASH_SEED: u64 = 0;

fn feed_u32(h: &mut Xxh3, x: u32) {
    h.update(&x.to_be_bytes());
}

fn feed_i64(h: &mut Xxh3, x: i64) {
    h.update(&x.to_be_bytes());
}

fn feed_str(h: &mut Xxh3, s: &str) {
    #[expect(clippy::cast_possible_truncation)]
    feed_u32(h, s.len() as u32);
    h.update(s.as_bytes());
}

/// Digest of a table snapshot's `(id, updated)` pairs, order-insensitive.
#[must_use]
pub fn version_hash(records: &[DataRecord]) -> u64 {
    let mut pairs: Vec<(&str, i64)> = records
        .iter()
        .map(|record| (record.id.as_str(), record.updated))
        .collect();
    pairs.sort_unstable();

    let mut h = Xxh3::with_seed(VERSION_HASH_SEED);
    h.update(&[VERSION_HASH_VERSION]);
    #[expect(clippy::cast_possible_truncation)]
    feed_u32(&mut h, pairs.len() as u32);
    for (id, updated) in pairs {
        feed_str(&mut h, id);
        feed_i64(&mut h, updated);
    }

    h.digest()
}

///
/// TESTS
///
