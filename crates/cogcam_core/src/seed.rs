//! Deterministic random number generation.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Master seed for an experiment.
///
/// Every random decision in the pipeline (stratified split, batch shuffling,
/// weight initialisation) draws from a stream derived from one `Seed`, so an
/// experiment is reproducible from its configuration alone.
///
/// # Example
///
/// ```rust
/// use cogcam_core::Seed;
/// use rand::Rng;
///
/// let seed = Seed::new(42);
/// let a: u32 = seed.derive("split").to_rng().gen();
/// let b: u32 = seed.derive("split").to_rng().gen();
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seed(u64);

impl Seed {
    /// Create a new seed with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the underlying seed value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Create a ChaCha8 generator seeded with this value.
    #[must_use]
    pub fn to_rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.0)
    }

    /// Derive an independent seed for a named stream.
    ///
    /// Uses FNV-1a over the seed bytes and the key so the derivation is
    /// stable across Rust releases and platforms.
    #[must_use]
    pub fn derive(&self, key: &str) -> Self {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = OFFSET;
        for byte in self.0.to_le_bytes().iter().chain(key.as_bytes()) {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        Self(hash)
    }
}

impl Default for Seed {
    fn default() -> Self {
        Self::new(42)
    }
}

impl From<u64> for Seed {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}
