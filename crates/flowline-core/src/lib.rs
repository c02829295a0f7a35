//! Flowline Core -- a deterministic flow simulation of a production line.
//!
//! Machines turn buffered ingredients into products over a craft time.
//! Rate-limited connections move one ingredient from a set of source
//! machines to a set of destination machines, sharing scarcity and surplus
//! fairly between them. All amounts are Q32.32 fixed point, so a run is
//! reproducible bit for bit and flow is conserved exactly.
//!
//! # Two-Phase Step
//!
//! Each call to [`factory::Factory::step`] advances the simulation by `dt`
//! seconds:
//!
//! 1. **Machines** -- every machine starts, advances or completes its craft.
//! 2. **Connections** -- every connection drains its sources and fills its
//!    destinations, seeing the outputs produced in phase 1.
//!
//! # Example
//!
//! ```rust
//! use flowline_core::factory::{Factory, FactoryConfig};
//! use flowline_core::fixed::Fixed64;
//! use flowline_core::registry::RegistryBuilder;
//!
//! let mut b = RegistryBuilder::new();
//! let ore = b.register_ingredient("Iron Ore");
//! let mine = b.register_recipe("Mine Iron", Fixed64::from_num(3));
//! b.produce(mine, ore, Fixed64::from_num(1)).unwrap();
//!
//! let mut factory = Factory::new(b.build().unwrap(), FactoryConfig::default());
//! let miner = factory.add_machine("Miner", mine).unwrap();
//! for _ in 0..40 {
//!     factory.step(Fixed64::from_num(0.1)).unwrap();
//! }
//! assert_eq!(factory.machine(miner).unwrap().crafts_completed(), 1);
//! ```
//!
//! # Key Types
//!
//! - [`factory::Factory`] -- Owns machines, connections and the step loop.
//! - [`machine::Machine`] -- Bounded buffers and the craft state machine.
//! - [`connection::Connection`] -- Rate-limited water-filling transfer.
//! - [`allocation::water_fill`] -- The fair-share split both sides use.
//! - [`registry::Registry`] -- Immutable ingredients and recipes (frozen
//!   before the first step).
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`event::EventLog`] -- Buffered craft and transfer events.

pub mod allocation;
pub mod connection;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod event;
pub mod factory;
pub mod fixed;
pub mod id;
pub mod machine;
pub mod query;
pub mod registry;
pub mod rng;
pub mod sim;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
