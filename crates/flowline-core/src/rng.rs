//! Deterministic PRNG for per-machine crafting-speed variance.
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, and seeded
//! explicitly by the factory so runs are reproducible.

use crate::fixed::Fixed64;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_unit(&mut self) -> Fixed64 {
        // The upper 32 bits become the fractional bits of a Q32.32 value.
        let upper = self.next_u64() >> 32;
        Fixed64::from_bits(upper as i64)
    }

    /// Uniform value in `[low, high)`. Returns `low` if the range is empty.
    pub fn range(&mut self, low: Fixed64, high: Fixed64) -> Fixed64 {
        if high <= low {
            return low;
        }
        low.saturating_add(high.saturating_sub(low).saturating_mul(self.next_unit()))
    }

    /// Get the internal state (for hashing).
    pub fn state(&self) -> u64 {
        self.state
    }
}
