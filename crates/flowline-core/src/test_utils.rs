//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::factory::{Factory, FactoryConfig};
use crate::fixed::{Amount, Fixed64, saturating_sum};
use crate::id::*;
use crate::registry::{Registry, RegistryBuilder};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Iron line registry
// ===========================================================================

/// Handles into the iron line registry.
#[derive(Debug, Clone, Copy)]
pub struct IronLine {
    pub ore: IngredientId,
    pub plate: IngredientId,
    pub gear: IngredientId,
    /// 3s, nothing -> 1 ore.
    pub mine: RecipeId,
    /// 5s, 1 ore -> 1 plate.
    pub smelt: RecipeId,
    /// 2s, 2 plate -> 1 gear.
    pub gears: RecipeId,
}

/// Mine iron ore, smelt it into plates, press plates into gears.
pub fn iron_line_registry() -> (Registry, IronLine) {
    let mut b = RegistryBuilder::new();
    let ore = b.register_ingredient("Iron Ore");
    let plate = b.register_ingredient("Iron Plate");
    let gear = b.register_ingredient("Iron Gear");

    let mine = b.register_recipe("Mine Iron", fixed(3.0));
    let smelt = b.register_recipe("Smelt Iron Ore", fixed(5.0));
    let gears = b.register_recipe("Craft Iron Gears", fixed(2.0));

    b.produce(mine, ore, fixed(1.0)).unwrap();
    b.require(smelt, ore, fixed(1.0)).unwrap();
    b.produce(smelt, plate, fixed(1.0)).unwrap();
    b.require(gears, plate, fixed(2.0)).unwrap();
    b.produce(gears, gear, fixed(1.0)).unwrap();

    let registry = b.build().unwrap();
    let ids = IronLine { ore, plate, gear, mine, smelt, gears };
    (registry, ids)
}

/// An empty factory over the iron line registry.
pub fn iron_line_factory(config: FactoryConfig) -> (Factory, IronLine) {
    let (registry, ids) = iron_line_registry();
    (Factory::new(registry, config), ids)
}

/// Default config with every crafting speed exactly 1.
pub fn unit_config() -> FactoryConfig {
    FactoryConfig {
        speed_jitter: Fixed64::ZERO,
        ..FactoryConfig::default()
    }
}

// ===========================================================================
// Demo line
// ===========================================================================

/// Machine and connection handles of [`demo_factory_with_ids`].
#[derive(Debug, Clone)]
pub struct DemoLine {
    pub ids: IronLine,
    pub miners: Vec<MachineId>,
    pub furnaces: Vec<MachineId>,
    pub assemblers: Vec<MachineId>,
    pub ore_belt: ConnectionId,
    pub plate_belt: ConnectionId,
}

/// Five miners feed five furnaces over an ore connection (rate 2), which
/// feed five assemblers over a plate connection (rate 2).
pub fn demo_factory(seed: u64) -> Factory {
    demo_factory_with_ids(seed).0
}

pub fn demo_factory_with_ids(seed: u64) -> (Factory, DemoLine) {
    let config = FactoryConfig {
        seed,
        ..FactoryConfig::default()
    };
    let (mut factory, ids) = iron_line_factory(config);

    let mut group = |name: &str, recipe: RecipeId| -> Vec<MachineId> {
        (1..=5)
            .map(|i| factory.add_machine(format!("{name} {i}"), recipe).unwrap())
            .collect()
    };
    let miners = group("Miner", ids.mine);
    let furnaces = group("Furnace", ids.smelt);
    let assemblers = group("Assembler", ids.gears);

    let ore_belt = belt(&mut factory, ids.ore, &miners, &furnaces);
    let plate_belt = belt(&mut factory, ids.plate, &furnaces, &assemblers);

    let line = DemoLine {
        ids,
        miners,
        furnaces,
        assemblers,
        ore_belt,
        plate_belt,
    };
    (factory, line)
}

/// Connect every source to every destination at rate 2.
pub fn belt(factory: &mut Factory, ingredient: IngredientId, sources: &[MachineId], destinations: &[MachineId]) -> ConnectionId {
    let conn = factory.add_connection(ingredient, fixed(2.0)).unwrap();
    for &m in sources {
        factory.connect_source(conn, m).unwrap();
    }
    for &m in destinations {
        factory.connect_destination(conn, m).unwrap();
    }
    conn
}

// ===========================================================================
// Accounting
// ===========================================================================

/// Everything of `ingredient` sitting in any buffer of any machine.
pub fn total_buffered(factory: &Factory, ingredient: IngredientId) -> Amount {
    saturating_sum(
        factory
            .machines()
            .map(|(_, m)| m.available_input(ingredient) + m.available_output(ingredient)),
    )
}

/// Output buffer levels of `ingredient`, one per machine.
pub fn outputs_of(factory: &Factory, machines: &[MachineId], ingredient: IngredientId) -> Vec<Amount> {
    machines
        .iter()
        .map(|&id| factory.machine(id).map_or(Fixed64::ZERO, |m| m.available_output(ingredient)))
        .collect()
}

/// Input buffer levels of `ingredient`, one per machine.
pub fn inputs_of(factory: &Factory, machines: &[MachineId], ingredient: IngredientId) -> Vec<Amount> {
    machines
        .iter()
        .map(|&id| factory.machine(id).map_or(Fixed64::ZERO, |m| m.available_input(ingredient)))
        .collect()
}
