//! The simulation driver: owns every machine and connection and runs the
//! two-phase step.
//!
//! # Architecture
//!
//! The `Factory` owns:
//! - A frozen [`Registry`] of ingredients and recipes
//! - A machine arena and a connection arena (`slotmap`)
//! - A seeded [`SimRng`] used once per machine for its crafting speed
//! - A [`SimState`] (tick counter, elapsed time, fixed-step accumulator)
//! - An [`EventLog`] drained by the caller after each step
//!
//! # Step
//!
//! Each `step(dt)` runs:
//! 1. **Machines** -- every machine updates, in arena order
//! 2. **Connections** -- every connection moves flow, in arena order
//! 3. **Bookkeeping** -- tick counter and elapsed time advance
//!
//! Connections always see the outputs produced in the same step.

use crate::connection::{Connection, ConnectionError};
use crate::event::{Event, EventKind, EventLog};
use crate::fixed::{Fixed64, Seconds, Ticks, fixed64_to_f64};
use crate::id::{ConnectionId, IngredientId, MachineId, RecipeId};
use crate::machine::{Machine, MachineTick};
use crate::query::{ConnectionSnapshot, MachineSnapshot, Stock};
use crate::registry::Registry;
use crate::rng::SimRng;
use crate::sim::{SimState, SimulationStrategy, StateHash, StepReport, TickError, ensure_positive_delta};
use slotmap::{Key, SlotMap};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Construction-time settings for a [`Factory`].
#[derive(Debug, Clone, PartialEq)]
pub struct FactoryConfig {
    /// Seed for per-machine crafting-speed variance.
    pub seed: u64,
    /// Crafting speeds are drawn from `[1 - jitter, 1 + jitter)`.
    pub speed_jitter: Fixed64,
    pub strategy: SimulationStrategy,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            speed_jitter: Fixed64::from_num(0.05),
            strategy: SimulationStrategy::Variable,
        }
    }
}

/// Setup errors. Nothing in the step loop produces these.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown recipe: {0:?}")]
    UnknownRecipe(RecipeId),
    #[error("unknown ingredient: {0:?}")]
    UnknownIngredient(IngredientId),
    #[error("unknown machine: {0:?}")]
    UnknownMachine(MachineId),
    #[error("unknown connection: {0:?}")]
    UnknownConnection(ConnectionId),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// A running production line.
#[derive(Debug, Clone)]
pub struct Factory {
    registry: Registry,
    config: FactoryConfig,
    machines: SlotMap<MachineId, Machine>,
    connections: SlotMap<ConnectionId, Connection>,
    rng: SimRng,
    sim_state: SimState,
    events: EventLog,
}

impl Factory {
    pub fn new(registry: Registry, config: FactoryConfig) -> Self {
        Self {
            registry,
            rng: SimRng::new(config.seed),
            config,
            machines: SlotMap::with_key(),
            connections: SlotMap::with_key(),
            sim_state: SimState::new(),
            events: EventLog::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn sim_state(&self) -> &SimState {
        &self.sim_state
    }

    /// Completed steps.
    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    /// Simulated seconds across all steps.
    pub fn elapsed(&self) -> Seconds {
        self.sim_state.elapsed
    }

    // -----------------------------------------------------------------------
    // Machines
    // -----------------------------------------------------------------------

    /// Add a machine whose crafting speed is drawn from the seeded RNG.
    pub fn add_machine(&mut self, name: impl Into<String>, recipe: RecipeId) -> Result<MachineId, FactoryError> {
        let one = Fixed64::from_num(1);
        let jitter = self.config.speed_jitter.max(Fixed64::ZERO);
        let speed = self.rng.range(one.saturating_sub(jitter), one.saturating_add(jitter));
        self.add_machine_with_speed(name, recipe, speed)
    }

    /// Add a machine with an explicit crafting speed. Does not touch the RNG.
    pub fn add_machine_with_speed(
        &mut self,
        name: impl Into<String>,
        recipe: RecipeId,
        crafting_speed: Fixed64,
    ) -> Result<MachineId, FactoryError> {
        if self.registry.get_recipe(recipe).is_none() {
            return Err(FactoryError::UnknownRecipe(recipe));
        }
        Ok(self.machines.insert(Machine::new(name, recipe, crafting_speed)))
    }

    pub fn machine(&self, id: MachineId) -> Option<&Machine> {
        self.machines.get(id)
    }

    /// Direct access for drivers that seed buffers by hand.
    pub fn machine_mut(&mut self, id: MachineId) -> Option<&mut Machine> {
        self.machines.get_mut(id)
    }

    /// Machines in arena order.
    pub fn machines(&self) -> impl Iterator<Item = (MachineId, &Machine)> {
        self.machines.iter()
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    pub fn add_connection(&mut self, ingredient: IngredientId, max_flow_rate: Fixed64) -> Result<ConnectionId, FactoryError> {
        if self.registry.get_ingredient(ingredient).is_none() {
            return Err(FactoryError::UnknownIngredient(ingredient));
        }
        let connection = Connection::new(ingredient, max_flow_rate)?;
        Ok(self.connections.insert(connection))
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection, FactoryError> {
        self.connections.remove(id).ok_or(FactoryError::UnknownConnection(id))
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Connections in arena order.
    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.connections.iter()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Attach `machine` as a source. Returns false if it already was one.
    pub fn connect_source(&mut self, connection: ConnectionId, machine: MachineId) -> Result<bool, FactoryError> {
        Ok(self.endpoint(connection, machine)?.add_source(machine))
    }

    /// Attach `machine` as a destination. Returns false if it already was one.
    pub fn connect_destination(&mut self, connection: ConnectionId, machine: MachineId) -> Result<bool, FactoryError> {
        Ok(self.endpoint(connection, machine)?.add_destination(machine))
    }

    pub fn disconnect_source(&mut self, connection: ConnectionId, machine: MachineId) -> Result<bool, FactoryError> {
        Ok(self.endpoint(connection, machine)?.remove_source(machine))
    }

    pub fn disconnect_destination(&mut self, connection: ConnectionId, machine: MachineId) -> Result<bool, FactoryError> {
        Ok(self.endpoint(connection, machine)?.remove_destination(machine))
    }

    fn endpoint(&mut self, connection: ConnectionId, machine: MachineId) -> Result<&mut Connection, FactoryError> {
        if !self.machines.contains_key(machine) {
            return Err(FactoryError::UnknownMachine(machine));
        }
        self.connections
            .get_mut(connection)
            .ok_or(FactoryError::UnknownConnection(connection))
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Remove and return events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.events.suppress(kind);
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance the simulation according to the configured strategy.
    ///
    /// - **Variable**: exactly one step of `dt` runs.
    /// - **Fixed**: `dt` is accumulated; as many fixed steps run as fit and
    ///   the remainder carries to the next call.
    pub fn advance(&mut self, dt: Seconds) -> Result<StepReport, TickError> {
        ensure_positive_delta(dt)?;
        match self.config.strategy {
            SimulationStrategy::Variable => self.step(dt),
            SimulationStrategy::Fixed { timestep } => {
                ensure_positive_delta(timestep)?;
                let mut report = StepReport::default();
                self.sim_state.accumulator = self.sim_state.accumulator.saturating_add(dt);
                while self.sim_state.accumulator >= timestep {
                    self.sim_state.accumulator -= timestep;
                    report.merge(&self.step(timestep)?);
                }
                Ok(report)
            }
        }
    }

    /// Run one step of `dt` seconds: all machines, then all connections.
    pub fn step(&mut self, dt: Seconds) -> Result<StepReport, TickError> {
        ensure_positive_delta(dt)?;
        let tick = self.sim_state.tick;
        let mut report = StepReport {
            steps_run: 1,
            ..StepReport::default()
        };

        // Phase 1: machines.
        for (machine, recipe, outcome) in self.update_machines(dt)? {
            if outcome.started {
                report.crafts_started += 1;
                self.events.emit(Event::CraftStarted { machine, recipe, tick });
            }
            if outcome.blocked {
                self.events.emit(Event::OutputBlocked { machine, recipe, tick });
            }
            if outcome.completed {
                report.crafts_completed += 1;
                self.events.emit(Event::CraftCompleted { machine, recipe, tick });
            }
        }

        // Phase 2: connections, sequentially, since they share machines.
        for (connection, conn) in self.connections.iter_mut() {
            let flow = conn.update(&mut self.machines, &self.registry, dt)?;
            if flow.delivered > Fixed64::ZERO {
                report.transferred = report.transferred.saturating_add(flow.delivered);
                self.events.emit(Event::Transferred {
                    connection,
                    amount: flow.delivered,
                    tick,
                });
            }
        }

        // Phase 3: bookkeeping.
        self.sim_state.tick += 1;
        self.sim_state.elapsed = self.sim_state.elapsed.saturating_add(dt);

        debug_assert!(
            crate::validation::check_invariants(self).is_empty(),
            "invariant violated after tick {tick}: {:?}",
            crate::validation::check_invariants(self)
        );

        tracing::debug!(
            tick,
            dt = fixed64_to_f64(dt),
            started = report.crafts_started,
            completed = report.crafts_completed,
            transferred = fixed64_to_f64(report.transferred),
            "step"
        );

        Ok(report)
    }

    #[cfg(not(feature = "parallel"))]
    fn update_machines(&mut self, dt: Seconds) -> Result<Vec<(MachineId, RecipeId, MachineTick)>, TickError> {
        let registry = &self.registry;
        self.machines
            .iter_mut()
            .map(|(id, machine)| Ok((id, machine.recipe(), machine.update(registry, dt)?)))
            .collect()
    }

    /// Machines never touch each other's buffers, so this phase can fan out.
    #[cfg(feature = "parallel")]
    fn update_machines(&mut self, dt: Seconds) -> Result<Vec<(MachineId, RecipeId, MachineTick)>, TickError> {
        use rayon::prelude::*;

        let registry = &self.registry;
        let mut machines: Vec<(MachineId, &mut Machine)> = self.machines.iter_mut().collect();
        machines
            .par_iter_mut()
            .map(|(id, machine)| Ok((*id, machine.recipe(), machine.update(registry, dt)?)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Hash of the full simulation state, for determinism checks.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.sim_state.tick);
        h.write_fixed64(self.sim_state.elapsed);
        h.write_fixed64(self.sim_state.accumulator);
        h.write_u64(self.rng.state());

        for (id, m) in &self.machines {
            h.write_u64(id.data().as_ffi());
            h.write_u32(m.recipe().0);
            h.write_fixed64(m.progress());
            h.write(&[u8::from(m.is_crafting())]);
            h.write_fixed64(m.crafting_speed());
            h.write_u64(m.crafts_completed());
            for (ingredient, &amount) in m.inputs() {
                h.write_u32(ingredient.0);
                h.write_fixed64(amount);
            }
            h.write(&[0xff]);
            for (ingredient, &amount) in m.outputs() {
                h.write_u32(ingredient.0);
                h.write_fixed64(amount);
            }
            h.write(&[0xfe]);
        }

        for (id, c) in &self.connections {
            h.write_u64(id.data().as_ffi());
            h.write_u32(c.ingredient().0);
            h.write_fixed64(c.max_flow_rate());
            h.write_fixed64(c.last_flow());
            for source in c.sources() {
                h.write_u64(source.data().as_ffi());
            }
            h.write(&[0xff]);
            for destination in c.destinations() {
                h.write_u64(destination.data().as_ffi());
            }
            h.write(&[0xfe]);
        }

        h.finish()
    }

    // -----------------------------------------------------------------------
    // Query API (read-only)
    // -----------------------------------------------------------------------

    /// Create a snapshot of a single machine.
    pub fn snapshot_machine(&self, id: MachineId) -> Option<MachineSnapshot> {
        let m = self.machines.get(id)?;
        Some(MachineSnapshot {
            id,
            name: m.name().to_string(),
            recipe: m.recipe(),
            state: m.state(&self.registry),
            progress: m.progress_fraction(&self.registry),
            input_fill: m.input_fill_fraction(&self.registry),
            inputs: self.stock(m.inputs()),
            outputs: self.stock(m.outputs()),
            crafts_completed: m.crafts_completed(),
        })
    }

    /// Snapshots of every machine, in arena order.
    pub fn snapshot_all_machines(&self) -> Vec<MachineSnapshot> {
        self.machines
            .keys()
            .filter_map(|id| self.snapshot_machine(id))
            .collect()
    }

    /// Create a snapshot of a single connection.
    pub fn snapshot_connection(&self, id: ConnectionId) -> Option<ConnectionSnapshot> {
        let c = self.connections.get(id)?;
        Some(ConnectionSnapshot {
            id,
            ingredient: c.ingredient(),
            ingredient_name: self.registry.ingredient_name(c.ingredient()).to_string(),
            max_flow_rate: c.max_flow_rate(),
            last_flow: c.last_flow(),
            utilization: c.utilization(),
            sources: c.sources().to_vec(),
            destinations: c.destinations().to_vec(),
        })
    }

    /// Snapshots of every connection, in arena order.
    pub fn snapshot_all_connections(&self) -> Vec<ConnectionSnapshot> {
        self.connections
            .keys()
            .filter_map(|id| self.snapshot_connection(id))
            .collect()
    }

    fn stock(&self, buffer: &BTreeMap<IngredientId, Fixed64>) -> Vec<Stock> {
        buffer
            .iter()
            .map(|(&ingredient, &amount)| Stock {
                ingredient,
                name: self.registry.ingredient_name(ingredient).to_string(),
                amount,
            })
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
