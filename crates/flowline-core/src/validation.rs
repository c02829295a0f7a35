//! Invariant checks and determinism validation.
//!
//! [`check_invariants`] walks a factory and reports every broken buffer or
//! handle invariant. [`validate_determinism`] runs two copies of a factory
//! side by side and compares their state hashes every step.

use crate::factory::Factory;
use crate::fixed::{Amount, Fixed64, Seconds};
use crate::id::{ConnectionId, IngredientId, MachineId};
use crate::machine::MAX_BUFFER;
use crate::sim::TickError;

// ---------------------------------------------------------------------------
// Invariants
// ---------------------------------------------------------------------------

/// A broken simulation invariant. Any of these indicates a bug.
#[derive(Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    /// A buffer holds a negative amount.
    NegativeBuffer {
        machine: MachineId,
        ingredient: IngredientId,
        amount: Amount,
    },
    /// A buffer holds more than `MAX_BUFFER`.
    OverfullBuffer {
        machine: MachineId,
        ingredient: IngredientId,
        amount: Amount,
    },
    NegativeProgress { machine: MachineId },
    /// Progress accumulated on an idle machine.
    ProgressWhileIdle { machine: MachineId },
    DanglingSource {
        connection: ConnectionId,
        machine: MachineId,
    },
    DanglingDestination {
        connection: ConnectionId,
        machine: MachineId,
    },
    /// Observed flow exceeds the configured rate.
    RateExceeded { connection: ConnectionId },
}

/// Every invariant violation currently present in `factory`.
pub fn check_invariants(factory: &Factory) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (machine, m) in factory.machines() {
        for (&ingredient, &amount) in m.inputs().iter().chain(m.outputs()) {
            if amount < Fixed64::ZERO {
                violations.push(InvariantViolation::NegativeBuffer { machine, ingredient, amount });
            } else if amount > MAX_BUFFER {
                violations.push(InvariantViolation::OverfullBuffer { machine, ingredient, amount });
            }
        }
        if m.progress() < Fixed64::ZERO {
            violations.push(InvariantViolation::NegativeProgress { machine });
        }
        if !m.is_crafting() && m.progress() != Fixed64::ZERO {
            violations.push(InvariantViolation::ProgressWhileIdle { machine });
        }
    }

    for (connection, c) in factory.connections() {
        for &machine in c.sources() {
            if factory.machine(machine).is_none() {
                violations.push(InvariantViolation::DanglingSource { connection, machine });
            }
        }
        for &machine in c.destinations() {
            if factory.machine(machine).is_none() {
                violations.push(InvariantViolation::DanglingDestination { connection, machine });
            }
        }
        if c.last_flow() > c.max_flow_rate() {
            violations.push(InvariantViolation::RateExceeded { connection });
        }
    }

    violations
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug, Clone)]
pub struct DeterminismResult {
    pub is_deterministic: bool,
    /// Tick at which divergence was first detected (if any).
    pub divergence_tick: Option<u64>,
    /// Hash log: (tick, hash_run1, hash_run2) for each tick.
    pub hash_log: Vec<(u64, u64, u64)>,
}

/// Run two clones of `factory` for `ticks` steps of `dt` and compare their
/// state hashes after every step.
pub fn validate_determinism(factory: &Factory, ticks: u64, dt: Seconds) -> Result<DeterminismResult, TickError> {
    let mut a = factory.clone();
    let mut b = factory.clone();

    let mut hash_log = Vec::new();
    let mut divergence_tick = None;

    for _ in 0..ticks {
        a.step(dt)?;
        b.step(dt)?;

        let hash_a = a.state_hash();
        let hash_b = b.state_hash();
        let tick = a.tick();

        hash_log.push((tick, hash_a, hash_b));

        if hash_a != hash_b && divergence_tick.is_none() {
            divergence_tick = Some(tick);
        }
    }

    Ok(DeterminismResult {
        is_deterministic: divergence_tick.is_none(),
        divergence_tick,
        hash_log,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
