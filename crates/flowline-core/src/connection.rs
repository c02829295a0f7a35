//! Rate-limited edges that move one ingredient between machines.
//!
//! A connection drains its sources' output buffers and fills its
//! destinations' input buffers in the same call. Both sides are split with
//! [`water_fill`], so scarce sources and nearly full destinations are
//! settled first and the rest is spread evenly over the others.

use crate::allocation::water_fill;
use crate::fixed::{Amount, Fixed64, Seconds, fixed64_to_f64, saturating_sum};
use crate::id::{IngredientId, MachineId};
use crate::machine::Machine;
use crate::registry::Registry;
use crate::sim::{TickError, ensure_positive_delta};
use slotmap::SlotMap;

/// Rejected connection configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("max flow rate must be positive, got {0} units/s")]
    NonPositiveRate(f64),
}

/// Amounts moved by one [`Connection::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowResult {
    /// Taken out of source output buffers.
    pub drained: Amount,
    /// Put into destination input buffers.
    pub delivered: Amount,
}

/// A directed, rate-limited edge carrying a single ingredient from a set of
/// source machines to a set of destination machines.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    ingredient: IngredientId,
    max_flow_rate: Fixed64,
    sources: Vec<MachineId>,
    destinations: Vec<MachineId>,
    last_flow: Fixed64,
}

impl Connection {
    pub fn new(ingredient: IngredientId, max_flow_rate: Fixed64) -> Result<Self, ConnectionError> {
        if max_flow_rate <= Fixed64::ZERO {
            return Err(ConnectionError::NonPositiveRate(fixed64_to_f64(max_flow_rate)));
        }
        Ok(Self {
            ingredient,
            max_flow_rate,
            sources: Vec::new(),
            destinations: Vec::new(),
            last_flow: Fixed64::ZERO,
        })
    }

    pub fn ingredient(&self) -> IngredientId {
        self.ingredient
    }

    /// Units per second.
    pub fn max_flow_rate(&self) -> Fixed64 {
        self.max_flow_rate
    }

    /// Rate observed on the last update, in units per second.
    pub fn last_flow(&self) -> Fixed64 {
        self.last_flow
    }

    /// `last_flow / max_flow_rate`, in `[0, 1]`.
    pub fn utilization(&self) -> Fixed64 {
        self.last_flow
            .checked_div(self.max_flow_rate)
            .unwrap_or(Fixed64::ZERO)
            .clamp(Fixed64::ZERO, Fixed64::from_num(1))
    }

    pub fn sources(&self) -> &[MachineId] {
        &self.sources
    }

    pub fn destinations(&self) -> &[MachineId] {
        &self.destinations
    }

    /// Attach a source. Returns false if it was already attached.
    pub fn add_source(&mut self, machine: MachineId) -> bool {
        insert_unique(&mut self.sources, machine)
    }

    /// Detach a source. Returns false if it was not attached.
    pub fn remove_source(&mut self, machine: MachineId) -> bool {
        remove_one(&mut self.sources, machine)
    }

    /// Attach a destination. Returns false if it was already attached.
    pub fn add_destination(&mut self, machine: MachineId) -> bool {
        insert_unique(&mut self.destinations, machine)
    }

    /// Detach a destination. Returns false if it was not attached.
    pub fn remove_destination(&mut self, machine: MachineId) -> bool {
        remove_one(&mut self.destinations, machine)
    }

    /// Whether the machine appears on either side.
    pub fn touches(&self, machine: MachineId) -> bool {
        self.sources.contains(&machine) || self.destinations.contains(&machine)
    }

    /// Move up to `max_flow_rate * dt` units from sources to destinations.
    ///
    /// Handles that no longer resolve are skipped. With no usable source or
    /// destination the call is a no-op and `last_flow` drops to zero.
    pub fn update(
        &mut self,
        machines: &mut SlotMap<MachineId, Machine>,
        registry: &Registry,
        dt: Seconds,
    ) -> Result<FlowResult, TickError> {
        ensure_positive_delta(dt)?;
        let ingredient = self.ingredient;

        let supply: Vec<(MachineId, Amount)> = self
            .sources
            .iter()
            .filter_map(|&id| match machines.get(id) {
                Some(m) => Some((id, m.available_output(ingredient))),
                None => {
                    tracing::warn!(?id, "connection source does not resolve");
                    None
                }
            })
            .filter(|&(_, available)| available > Fixed64::ZERO)
            .collect();

        let demand: Vec<(MachineId, Amount)> = self
            .destinations
            .iter()
            .filter_map(|&id| match machines.get(id) {
                Some(m) => Some((id, m.available_input_capacity(registry, ingredient))),
                None => {
                    tracing::warn!(?id, "connection destination does not resolve");
                    None
                }
            })
            .filter(|&(_, capacity)| capacity > Fixed64::ZERO)
            .collect();

        if supply.is_empty() || demand.is_empty() {
            self.last_flow = Fixed64::ZERO;
            return Ok(FlowResult::default());
        }

        let total = self
            .max_flow_rate
            .saturating_mul(dt)
            .min(saturating_sum(supply.iter().map(|&(_, a)| a)))
            .min(saturating_sum(demand.iter().map(|&(_, c)| c)));

        if total <= Fixed64::ZERO {
            self.last_flow = Fixed64::ZERO;
            return Ok(FlowResult::default());
        }

        let mut result = FlowResult::default();

        for (id, share) in water_fill(total, &supply) {
            if let Some(machine) = machines.get_mut(id) {
                result.drained += machine.consume_output(ingredient, share);
            }
        }

        // The fill pass spreads what was actually drained, so nothing is lost
        // if a share was clamped on the way out.
        for (id, share) in water_fill(result.drained, &demand) {
            if let Some(machine) = machines.get_mut(id) {
                result.delivered += machine.add_input(registry, ingredient, share);
            }
        }

        debug_assert_eq!(result.drained, result.delivered, "connection lost mass");

        self.last_flow = result
            .delivered
            .checked_div(dt)
            .unwrap_or(self.max_flow_rate)
            .min(self.max_flow_rate);

        tracing::trace!(
            ingredient = ingredient.0,
            amount = fixed64_to_f64(result.delivered),
            sources = supply.len(),
            destinations = demand.len(),
            "transfer"
        );

        Ok(result)
    }
}

fn insert_unique(list: &mut Vec<MachineId>, machine: MachineId) -> bool {
    if list.contains(&machine) {
        return false;
    }
    list.push(machine);
    true
}

fn remove_one(list: &mut Vec<MachineId>, machine: MachineId) -> bool {
    match list.iter().position(|&m| m == machine) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}
