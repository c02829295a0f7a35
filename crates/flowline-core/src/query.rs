//! Read-only query API for inspecting simulation state.
//!
//! Snapshot types aggregate factory state into convenient views for
//! rendering and reporting. All types are owned copies, with no references
//! into internal factory storage.

use crate::fixed::{Amount, Fixed64};
use crate::id::{ConnectionId, IngredientId, MachineId, RecipeId};
use crate::machine::MachineState;

/// One buffered ingredient.
#[derive(Debug, Clone, PartialEq)]
pub struct Stock {
    pub ingredient: IngredientId,
    /// Display name from the registry.
    pub name: String,
    pub amount: Amount,
}

// ---------------------------------------------------------------------------
// Machine snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of a single machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    pub id: MachineId,
    pub name: String,
    pub recipe: RecipeId,
    /// Derived state (Empty, Filling, Crafting, Blocked, Draining).
    pub state: MachineState,
    /// Craft progress as a 0..1 fraction. 0 when idle.
    pub progress: Fixed64,
    /// Share of the next craft's ingredients already buffered, 0..1.
    pub input_fill: Fixed64,
    pub inputs: Vec<Stock>,
    pub outputs: Vec<Stock>,
    pub crafts_completed: u64,
}

// ---------------------------------------------------------------------------
// Connection snapshot
// ---------------------------------------------------------------------------

/// An aggregated, read-only view of a single connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub ingredient: IngredientId,
    pub ingredient_name: String,
    /// Units per second.
    pub max_flow_rate: Fixed64,
    /// Rate observed on the last step, in units per second.
    pub last_flow: Fixed64,
    /// `last_flow / max_flow_rate` as a 0..1 fraction.
    pub utilization: Fixed64,
    pub sources: Vec<MachineId>,
    pub destinations: Vec<MachineId>,
}

impl MachineSnapshot {
    /// Buffered input of one ingredient, zero if absent.
    pub fn input(&self, ingredient: IngredientId) -> Amount {
        find(&self.inputs, ingredient)
    }

    /// Waiting output of one ingredient, zero if absent.
    pub fn output(&self, ingredient: IngredientId) -> Amount {
        find(&self.outputs, ingredient)
    }
}

fn find(stock: &[Stock], ingredient: IngredientId) -> Amount {
    stock
        .iter()
        .find(|s| s.ingredient == ingredient)
        .map_or(Fixed64::ZERO, |s| s.amount)
}
