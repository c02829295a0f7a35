//! Simulation strategy and state types.
//!
//! The factory is parameterized by a [`SimulationStrategy`] that determines
//! how elapsed time turns into steps. Every step runs the same two phases
//! (machines, then connections); strategies differ only in how many steps
//! run per `advance()` call and how long each one is.

use crate::fixed::{Fixed64, Seconds, Ticks, fixed64_to_f64};

// ---------------------------------------------------------------------------
// Simulation strategy
// ---------------------------------------------------------------------------

/// How the factory advances time. Chosen at factory construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SimulationStrategy {
    /// One step per `advance(dt)` call, lasting exactly `dt`.
    #[default]
    Variable,

    /// Accumulates elapsed time and runs as many steps of `timestep` as fit,
    /// carrying the remainder forward.
    Fixed {
        /// Duration of one step in seconds. Must be positive.
        timestep: Seconds,
    },
}

// ---------------------------------------------------------------------------
// Simulation state
// ---------------------------------------------------------------------------

/// Mutable simulation state tracked by the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimState {
    /// Number of completed steps.
    pub tick: Ticks,

    /// Simulated seconds elapsed across all steps.
    pub elapsed: Seconds,

    /// Unconsumed time in fixed-step mode. Always below one timestep.
    pub accumulator: Seconds,
}

impl SimState {
    /// Create a new simulation state starting at tick 0.
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Step report
// ---------------------------------------------------------------------------

/// Aggregate outcome of one or more steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Number of simulation steps actually executed.
    pub steps_run: u64,
    /// Crafts that began.
    pub crafts_started: u64,
    /// Crafts that finished and deposited their outputs.
    pub crafts_completed: u64,
    /// Total amount moved by all connections.
    pub transferred: Fixed64,
}

impl StepReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: &StepReport) {
        self.steps_run += other.steps_run;
        self.crafts_started += other.crafts_started;
        self.crafts_completed += other.crafts_completed;
        self.transferred = self.transferred.saturating_add(other.transferred);
    }
}

// ---------------------------------------------------------------------------
// Tick errors
// ---------------------------------------------------------------------------

/// A misconfigured driver passed an unusable tick duration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TickError {
    #[error("tick duration must be positive, got {0}s")]
    NonPositiveDelta(f64),
}

/// Reject `dt <= 0` before it can produce a division by zero.
pub fn ensure_positive_delta(dt: Seconds) -> Result<(), TickError> {
    if dt <= Fixed64::ZERO {
        return Err(TickError::NonPositiveDelta(fixed64_to_f64(dt)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for desync detection.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    /// Feed a u64 into the hash.
    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a u32 into the hash.
    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed a Fixed64 into the hash.
    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}
