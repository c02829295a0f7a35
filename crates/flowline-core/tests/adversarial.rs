//! Adversarial input tests for the factory.
//!
//! Tests edge cases that should either return errors or be handled gracefully
//! without panics.

use flowline_core::factory::{Factory, FactoryError};
use flowline_core::fixed::Fixed64;
use flowline_core::id::{MachineId, RecipeId};
use flowline_core::machine::MAX_BUFFER;
use flowline_core::registry::RegistryBuilder;
use flowline_core::sim::TickError;
use flowline_core::test_utils::*;
use flowline_core::validation::check_invariants;

/// Machine feeding its own input through one connection.
#[test]
fn self_loop_connection_conserves_mass() {
    let mut b = RegistryBuilder::new();
    let ore = b.register_ingredient("Iron Ore");
    let wash = b.register_recipe("Wash Ore", fixed(1.0));
    b.require(wash, ore, fixed(1.0)).unwrap();
    b.produce(wash, ore, fixed(1.0)).unwrap();
    let mut factory = Factory::new(b.build().unwrap(), unit_config());

    let washer = factory.add_machine("Washer", wash).unwrap();
    let registry = factory.registry().clone();
    factory.machine_mut(washer).unwrap().add_input(&registry, ore, fixed(10.0));
    belt(&mut factory, ore, &[washer], &[washer]);

    for _ in 0..200 {
        factory.step(fixed(0.3)).unwrap();
        let m = factory.machine(washer).unwrap();
        let in_flight = if m.is_crafting() { fixed(1.0) } else { Fixed64::ZERO };
        assert_eq!(total_buffered(&factory, ore) + in_flight, fixed(10.0));
    }
}

/// Zero craft time: completes every step without dividing by zero.
#[test]
fn instant_recipe_runs_every_step() {
    let mut b = RegistryBuilder::new();
    let ore = b.register_ingredient("Iron Ore");
    let plate = b.register_ingredient("Iron Plate");
    let source = b.register_recipe("Spawn", Fixed64::ZERO);
    b.produce(source, ore, fixed(1.0)).unwrap();
    let press = b.register_recipe("Press", Fixed64::ZERO);
    b.require(press, ore, fixed(1.0)).unwrap();
    b.produce(press, plate, fixed(1.0)).unwrap();
    let mut factory = Factory::new(b.build().unwrap(), unit_config());

    let spawner = factory.add_machine("Spawner", source).unwrap();
    let presser = factory.add_machine("Press", press).unwrap();
    let conn = factory.add_connection(ore, fixed(1000.0)).unwrap();
    factory.connect_source(conn, spawner).unwrap();
    factory.connect_destination(conn, presser).unwrap();

    for _ in 0..10 {
        factory.step(fixed(0.01)).unwrap();
    }
    assert_eq!(factory.machine(spawner).unwrap().crafts_completed(), 10);
    // The first unit arrives after the press already ran in step 1.
    assert_eq!(factory.machine(presser).unwrap().crafts_completed(), 9);
    assert_eq!(
        factory.machine(presser).unwrap().progress_fraction(factory.registry()),
        Fixed64::ZERO
    );
}

/// Zero crafting speed behaves like an instant recipe.
#[test]
fn zero_speed_machine_crafts_instantly() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    let miner = factory.add_machine_with_speed("Miner", ids.mine, Fixed64::ZERO).unwrap();
    factory.step(fixed(0.1)).unwrap();
    assert_eq!(factory.machine(miner).unwrap().crafts_completed(), 1);
}

#[test]
fn zero_and_negative_dt_are_rejected() {
    let mut factory = demo_factory(1);
    let before = factory.state_hash();
    assert_eq!(factory.step(Fixed64::ZERO), Err(TickError::NonPositiveDelta(0.0)));
    assert!(matches!(factory.step(fixed(-1.0)), Err(TickError::NonPositiveDelta(_))));
    assert!(factory.advance(Fixed64::ZERO).is_err());
    assert_eq!(factory.state_hash(), before);
}

#[test]
fn smallest_positive_dt_is_accepted() {
    let mut factory = demo_factory(1);
    factory.step(Fixed64::DELTA).unwrap();
    assert_eq!(factory.tick(), 1);
    assert!(check_invariants(&factory).is_empty());
}

#[test]
fn huge_dt_stays_bounded() {
    let (mut factory, line) = demo_factory_with_ids(2);
    factory.step(fixed(1_000_000.0)).unwrap();
    factory.step(fixed(1_000_000.0)).unwrap();
    assert!(check_invariants(&factory).is_empty());
    for &m in &line.miners {
        assert!(factory.machine(m).unwrap().crafts_completed() <= 2);
    }
}

#[test]
fn huge_rate_does_not_overflow() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    let miner = factory.add_machine("Miner", ids.mine).unwrap();
    let furnace = factory.add_machine("Furnace", ids.smelt).unwrap();
    factory.machine_mut(miner).unwrap().add_output(ids.ore, MAX_BUFFER);
    let conn = factory.add_connection(ids.ore, Fixed64::MAX).unwrap();
    factory.connect_source(conn, miner).unwrap();
    factory.connect_destination(conn, furnace).unwrap();

    factory.step(fixed(1000.0)).unwrap();
    assert_eq!(factory.machine(furnace).unwrap().available_input(ids.ore), MAX_BUFFER);
    assert!(factory.connection(conn).unwrap().last_flow() <= Fixed64::MAX);
}

#[test]
fn wrong_ingredient_connection_moves_nothing() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    let miner = factory.add_machine("Miner", ids.mine).unwrap();
    let furnace = factory.add_machine("Furnace", ids.smelt).unwrap();
    factory.machine_mut(miner).unwrap().add_output(ids.ore, fixed(10.0));
    // Furnaces do not take plates, miners do not make them.
    let conn = belt(&mut factory, ids.plate, &[miner], &[furnace]);

    factory.step(fixed(1.0)).unwrap();
    assert_eq!(factory.machine(miner).unwrap().available_output(ids.ore), fixed(10.0));
    assert_eq!(factory.connection(conn).unwrap().last_flow(), Fixed64::ZERO);
}

#[test]
fn connection_without_endpoints_is_a_no_op() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    let conn = factory.add_connection(ids.ore, fixed(2.0)).unwrap();
    let report = factory.step(fixed(1.0)).unwrap();
    assert_eq!(report.transferred, Fixed64::ZERO);
    assert_eq!(factory.connection(conn).unwrap().last_flow(), Fixed64::ZERO);
}

#[test]
fn disconnecting_all_sources_drops_flow_to_zero() {
    let (mut factory, line) = demo_factory_with_ids(6);
    let mut saw_flow = false;
    for _ in 0..100 {
        factory.step(fixed(0.1)).unwrap();
        saw_flow |= factory.connection(line.ore_belt).unwrap().last_flow() > Fixed64::ZERO;
    }
    assert!(saw_flow);

    for &m in &line.miners {
        assert_eq!(factory.disconnect_source(line.ore_belt, m), Ok(true));
    }
    factory.step(fixed(0.1)).unwrap();
    assert_eq!(factory.connection(line.ore_belt).unwrap().last_flow(), Fixed64::ZERO);
}

#[test]
fn removing_a_connection_mid_run() {
    let (mut factory, line) = demo_factory_with_ids(6);
    for _ in 0..50 {
        factory.step(fixed(0.1)).unwrap();
    }
    factory.remove_connection(line.plate_belt).unwrap();
    assert_eq!(factory.connection_count(), 1);
    for _ in 0..50 {
        factory.step(fixed(0.1)).unwrap();
    }
    assert!(factory.snapshot_connection(line.plate_belt).is_none());
    assert!(check_invariants(&factory).is_empty());
}

#[test]
fn two_connections_share_one_destination() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    let a = factory.add_machine("Miner 1", ids.mine).unwrap();
    let b = factory.add_machine("Miner 2", ids.mine).unwrap();
    let furnace = factory.add_machine("Furnace", ids.smelt).unwrap();
    factory.machine_mut(a).unwrap().add_output(ids.ore, fixed(60.0));
    factory.machine_mut(b).unwrap().add_output(ids.ore, fixed(60.0));
    let registry = factory.registry().clone();
    factory.machine_mut(furnace).unwrap().add_input(&registry, ids.ore, fixed(95.0));

    for (src, rate) in [(a, 10.0), (b, 10.0)] {
        let conn = factory.add_connection(ids.ore, fixed(rate)).unwrap();
        factory.connect_source(conn, src).unwrap();
        factory.connect_destination(conn, furnace).unwrap();
    }

    // The furnace starts a craft (95 -> 94) and then has room for 6: the
    // first connection fills it, the second finds it full.
    factory.step(fixed(1.0)).unwrap();
    let furnace_ore = factory.machine(furnace).unwrap().available_input(ids.ore);
    assert_eq!(furnace_ore, MAX_BUFFER);
    assert_eq!(outputs_of(&factory, &[a, b], ids.ore), vec![fixed(54.0), fixed(60.0)]);
}

#[test]
fn unknown_handles_are_rejected() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    assert_eq!(
        factory.add_machine("Ghost", RecipeId(u32::MAX)),
        Err(FactoryError::UnknownRecipe(RecipeId(u32::MAX)))
    );
    let conn = factory.add_connection(ids.ore, fixed(1.0)).unwrap();
    assert_eq!(
        factory.connect_source(conn, MachineId::default()),
        Err(FactoryError::UnknownMachine(MachineId::default()))
    );
}

#[test]
fn overfilled_input_requests_are_clamped() {
    let (mut factory, ids) = iron_line_factory(unit_config());
    let furnace = factory.add_machine("Furnace", ids.smelt).unwrap();
    let registry = factory.registry().clone();
    let m = factory.machine_mut(furnace).unwrap();
    assert_eq!(m.add_input(&registry, ids.ore, Fixed64::MAX), MAX_BUFFER);
    assert_eq!(m.consume_input(ids.ore, Fixed64::MAX), MAX_BUFFER);
    assert_eq!(m.consume_output(ids.plate, Fixed64::MAX), Fixed64::ZERO);
    assert!(check_invariants(&factory).is_empty());
}
