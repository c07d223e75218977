//! Reduction of a raw payload to a two-dimensional feature vector.
//!
//! The scalar feature is a djb2-style rolling hash (`hash * 33 + byte`,
//! seeded with 5381) computed with `u64` wraparound. It is fast and
//! order-sensitive, not a cryptographic digest.

use crate::invariant;
use crate::runtime::limits::BUFFER_CAPACITY;
use std::fmt;

/// Seed for the rolling hash accumulator.
pub const HASH_SEED: u64 = 5381;

/// Multiplier applied to the accumulator for every byte.
const HASH_MULTIPLIER: u64 = 33;

/// A `(hash, length)` pair produced for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureVector {
    hash: u64,
    length: isize,
}

impl FeatureVector {
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Number of bytes consumed from the connection.
    ///
    /// This is the read length, which may exceed the number of bytes hashed.
    pub fn length(&self) -> isize {
        self.length
    }
}

/// Formats the record body consumed downstream: `{"v": [<hash>, <length>]}`.
impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{\"v\": [{}, {}]}}", self.hash, self.length)
    }
}

/// Vectorize the first `len` bytes of `data`.
///
/// Only the first `min(len, BUFFER_CAPACITY)` bytes contribute to the hash;
/// the reported length is always `len`. `data` must hold at least that many
/// bytes, otherwise the process is terminated.
pub fn vectorize(data: &[u8], len: usize) -> FeatureVector {
    let hashed = len.min(BUFFER_CAPACITY);
    invariant::ensure(data.len() >= hashed, "vectorize input shorter than length");
    invariant::ensure(len <= isize::MAX as usize, "vectorize length overflows isize");

    FeatureVector {
        hash: rolling_hash(&data[..hashed]),
        length: len as isize,
    }
}

fn rolling_hash(bytes: &[u8]) -> u64 {
    bytes.iter().fold(HASH_SEED, |acc, &b| {
        acc.wrapping_mul(HASH_MULTIPLIER).wrapping_add(u64::from(b))
    })
}
