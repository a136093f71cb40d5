//! ## availsim-core::random
//! **Deterministic per-producer random streams**
//!
//! Every producer draws from its own ChaCha8 stream. The stream number is
//! derived from a BLAKE3 hash of the producer id, so a fixed global seed
//! gives each producer a fixed sequence regardless of registration order,
//! initialisation order or how many worker threads evaluate the graph.

pub mod distribution;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

pub use distribution::{Distribution, DistributionProvider};

/// Issues independent random streams from one global seed.
///
/// Issuance is a pure function of `(seed, key)`, which makes the provider
/// safe to share across threads initialising producers concurrently.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomProvider {
    seed: u64,
}

impl RandomProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Opens stream number `key`.
    pub fn new_stream(&self, key: u64) -> RandomStream {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(key);
        RandomStream { rng, key }
    }

    /// Opens the stream that belongs to producer `id`.
    pub fn stream_for(&self, id: &str) -> RandomStream {
        let key = stream_key(id);
        trace!(producer = id, seed = self.seed, stream = key, "random stream issued");
        self.new_stream(key)
    }
}

fn stream_key(id: &str) -> u64 {
    let hash = blake3::hash(id.as_bytes());
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(word)
}

/// A private random stream owned by exactly one producer.
#[derive(Clone, Debug)]
pub struct RandomStream {
    rng: ChaCha8Rng,
    key: u64,
}

impl RandomStream {
    pub fn key(&self) -> u64 {
        self.key
    }
}

impl RngCore for RandomStream {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    #[inline]
    fn fill_bytes(&mut self, dst: &mut [u8]) {
        self.rng.fill_bytes(dst)
    }
}
