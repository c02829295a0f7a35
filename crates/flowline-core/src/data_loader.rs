//! Data-driven factory loading from JSON.
//!
//! Feature-gated behind `data-loader`. A scenario document declares the
//! recipes, groups of identical machines, and the connections between
//! groups. Ingredients are registered implicitly the first time a recipe
//! mentions them.

use crate::factory::{Factory, FactoryConfig, FactoryError};
use crate::fixed::Fixed64;
use crate::id::MachineId;
use crate::registry::{Registry, RegistryBuilder, RegistryError};
use crate::sim::SimulationStrategy;
use std::collections::{BTreeMap, HashMap};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("factory error: {0}")]
    Factory(#[from] FactoryError),
    #[error("unknown ingredient reference: {0}")]
    UnknownIngredientRef(String),
    #[error("unknown recipe reference: {0}")]
    UnknownRecipeRef(String),
    #[error("unknown machine group: {0}")]
    UnknownGroupRef(String),
    #[error("duplicate machine group: {0}")]
    DuplicateGroup(String),
    #[error("number out of range: {0}")]
    OutOfRange(f64),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level scenario document.
#[derive(Debug, serde::Deserialize)]
pub struct ScenarioData {
    #[serde(default)]
    pub config: ConfigData,
    #[serde(default)]
    pub recipes: Vec<RecipeData>,
    #[serde(default)]
    pub machines: Vec<MachineGroupData>,
    #[serde(default)]
    pub connections: Vec<ConnectionData>,
}

/// Factory settings. Every field is optional.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ConfigData {
    pub seed: Option<u64>,
    pub speed_jitter: Option<f64>,
    /// Seconds per fixed step. Absent means variable stepping.
    pub fixed_timestep: Option<f64>,
}

/// JSON representation of a recipe. Maps go from ingredient name to amount.
#[derive(Debug, serde::Deserialize)]
pub struct RecipeData {
    pub name: String,
    pub craft_time: f64,
    #[serde(default)]
    pub ingredients: BTreeMap<String, f64>,
    #[serde(default)]
    pub outputs: BTreeMap<String, f64>,
}

/// A group of identical machines.
#[derive(Debug, serde::Deserialize)]
pub struct MachineGroupData {
    /// Name connections use to refer to this group.
    pub group: String,
    /// Display name; numbered when `count > 1`.
    pub name: String,
    pub recipe: String, // references recipe by name
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    1
}

/// JSON representation of a connection between machine groups.
#[derive(Debug, serde::Deserialize)]
pub struct ConnectionData {
    pub ingredient: String,
    pub max_flow_rate: f64,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub destinations: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

impl ScenarioData {
    /// Parse a scenario without building it, so callers can adjust the
    /// config first.
    pub fn from_json(json: &str) -> Result<Self, DataLoadError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Parse a scenario and build a ready-to-run factory.
pub fn load_factory_json(json: &str) -> Result<Factory, DataLoadError> {
    build_factory(ScenarioData::from_json(json)?)
}

/// Load a scenario from JSON bytes.
pub fn load_factory_json_bytes(bytes: &[u8]) -> Result<Factory, DataLoadError> {
    let data: ScenarioData = serde_json::from_slice(bytes)?;
    build_factory(data)
}

/// Build only the registry part of a scenario.
pub fn load_registry_json(json: &str) -> Result<Registry, DataLoadError> {
    let data: ScenarioData = serde_json::from_str(json)?;
    build_registry(&data.recipes)
}

fn to_fixed(value: f64) -> Result<Fixed64, DataLoadError> {
    Fixed64::checked_from_num(value).ok_or(DataLoadError::OutOfRange(value))
}

impl ConfigData {
    fn to_config(&self) -> Result<FactoryConfig, DataLoadError> {
        let defaults = FactoryConfig::default();
        Ok(FactoryConfig {
            seed: self.seed.unwrap_or(defaults.seed),
            speed_jitter: match self.speed_jitter {
                Some(jitter) => to_fixed(jitter)?,
                None => defaults.speed_jitter,
            },
            strategy: match self.fixed_timestep {
                Some(step) => SimulationStrategy::Fixed {
                    timestep: to_fixed(step)?,
                },
                None => SimulationStrategy::Variable,
            },
        })
    }
}

fn build_registry(recipes: &[RecipeData]) -> Result<Registry, DataLoadError> {
    let mut builder = RegistryBuilder::new();

    for recipe in recipes {
        let id = builder.register_recipe(&recipe.name, to_fixed(recipe.craft_time)?);
        for (name, &amount) in &recipe.ingredients {
            let ingredient = builder.register_ingredient(name);
            builder.require(id, ingredient, to_fixed(amount)?)?;
        }
        for (name, &amount) in &recipe.outputs {
            let ingredient = builder.register_ingredient(name);
            builder.produce(id, ingredient, to_fixed(amount)?)?;
        }
    }

    Ok(builder.build()?)
}

/// Build a factory from an already parsed scenario.
pub fn build_factory(data: ScenarioData) -> Result<Factory, DataLoadError> {
    let registry = build_registry(&data.recipes)?;
    let mut factory = Factory::new(registry, data.config.to_config()?);

    // Phase 1: machines, group by group, so arena order follows the file.
    let mut groups: HashMap<&str, Vec<MachineId>> = HashMap::new();
    for group in &data.machines {
        if groups.contains_key(group.group.as_str()) {
            return Err(DataLoadError::DuplicateGroup(group.group.clone()));
        }
        let recipe = factory
            .registry()
            .recipe_id(&group.recipe)
            .ok_or_else(|| DataLoadError::UnknownRecipeRef(group.recipe.clone()))?;

        let mut members = Vec::with_capacity(group.count as usize);
        for index in 1..=group.count {
            let name = if group.count > 1 {
                format!("{} {index}", group.name)
            } else {
                group.name.clone()
            };
            members.push(factory.add_machine(name, recipe)?);
        }
        groups.insert(group.group.as_str(), members);
    }

    // Phase 2: connections (resolve ingredient and group refs by name).
    for conn in &data.connections {
        let ingredient = factory
            .registry()
            .ingredient_id(&conn.ingredient)
            .ok_or_else(|| DataLoadError::UnknownIngredientRef(conn.ingredient.clone()))?;
        let id = factory.add_connection(ingredient, to_fixed(conn.max_flow_rate)?)?;

        for machine in resolve_groups(&groups, &conn.sources)? {
            factory.connect_source(id, machine)?;
        }
        for machine in resolve_groups(&groups, &conn.destinations)? {
            factory.connect_destination(id, machine)?;
        }
    }

    tracing::debug!(
        machines = factory.machine_count(),
        connections = factory.connection_count(),
        "scenario loaded"
    );

    Ok(factory)
}

fn resolve_groups(groups: &HashMap<&str, Vec<MachineId>>, names: &[String]) -> Result<Vec<MachineId>, DataLoadError> {
    let mut machines = Vec::new();
    for name in names {
        let members = groups
            .get(name.as_str())
            .ok_or_else(|| DataLoadError::UnknownGroupRef(name.clone()))?;
        machines.extend_from_slice(members);
    }
    Ok(machines)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionError;

    const IRON_LINE: &str = r#"{
        "config": {"seed": 9, "speed_jitter": 0.0},
        "recipes": [
            {"name": "Mine Iron", "craft_time": 3, "outputs": {"Iron Ore": 1}},
            {"name": "Smelt Iron Ore", "craft_time": 5,
             "ingredients": {"Iron Ore": 1}, "outputs": {"Iron Plate": 1}}
        ],
        "machines": [
            {"group": "miners", "name": "Miner", "recipe": "Mine Iron", "count": 3},
            {"group": "furnaces", "name": "Furnace", "recipe": "Smelt Iron Ore"}
        ],
        "connections": [
            {"ingredient": "Iron Ore", "max_flow_rate": 2,
             "sources": ["miners"], "destinations": ["furnaces"]}
        ]
    }"#;

    #[test]
    fn load_empty_json() {
        let factory = load_factory_json("{}").unwrap();
        assert_eq!(factory.machine_count(), 0);
        assert_eq!(factory.connection_count(), 0);
        assert_eq!(factory.config(), &FactoryConfig::default());
    }

    #[test]
    fn load_full_scenario() {
        let factory = load_factory_json(IRON_LINE).unwrap();
        assert_eq!(factory.registry().recipe_count(), 2);
        assert_eq!(factory.registry().ingredient_count(), 2);
        assert_eq!(factory.machine_count(), 4);
        assert_eq!(factory.config().seed, 9);

        let names: Vec<&str> = factory.machines().map(|(_, m)| m.name()).collect();
        assert_eq!(names, vec!["Miner 1", "Miner 2", "Miner 3", "Furnace"]);

        let (_, conn) = factory.connections().next().unwrap();
        assert_eq!(conn.sources().len(), 3);
        assert_eq!(conn.destinations().len(), 1);
        assert_eq!(conn.max_flow_rate(), Fixed64::from_num(2));
    }

    #[test]
    fn parsed_config_can_be_overridden() {
        let mut data = ScenarioData::from_json(IRON_LINE).unwrap();
        data.config.seed = Some(77);
        let factory = build_factory(data).unwrap();
        assert_eq!(factory.config().seed, 77);
        assert_eq!(factory.machine_count(), 4);
    }

    #[test]
    fn zero_jitter_gives_unit_speeds() {
        let factory = load_factory_json(IRON_LINE).unwrap();
        assert!(factory.machines().all(|(_, m)| m.crafting_speed() == Fixed64::from_num(1)));
    }

    #[test]
    fn fixed_timestep_selects_fixed_strategy() {
        let json = r#"{"config": {"fixed_timestep": 0.25}}"#;
        let factory = load_factory_json(json).unwrap();
        assert_eq!(
            factory.config().strategy,
            SimulationStrategy::Fixed { timestep: Fixed64::from_num(0.25) }
        );
    }

    #[test]
    fn loaded_scenario_runs() {
        let mut factory = load_factory_json(IRON_LINE).unwrap();
        for _ in 0..60 {
            factory.step(Fixed64::from_num(0.5)).unwrap();
        }
        let furnace = factory.machines().last().unwrap().1;
        assert!(furnace.crafts_completed() > 0);
    }

    #[test]
    fn load_registry_only() {
        let reg = load_registry_json(IRON_LINE).unwrap();
        let smelt = reg.get_recipe(reg.recipe_id("Smelt Iron Ore").unwrap()).unwrap();
        assert_eq!(smelt.ingredients.len(), 1);
        assert_eq!(smelt.outputs.len(), 1);
    }

    #[test]
    fn load_unknown_recipe_fails() {
        let json = r#"{"machines": [{"group": "g", "name": "M", "recipe": "nope"}]}"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::UnknownRecipeRef(_)
        ));
    }

    #[test]
    fn load_unknown_group_fails() {
        let json = r#"{
            "recipes": [{"name": "Mine Iron", "craft_time": 3, "outputs": {"Iron Ore": 1}}],
            "connections": [{"ingredient": "Iron Ore", "max_flow_rate": 1, "sources": ["ghosts"]}]
        }"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::UnknownGroupRef(_)
        ));
    }

    #[test]
    fn load_unknown_ingredient_fails() {
        let json = r#"{"connections": [{"ingredient": "Unobtainium", "max_flow_rate": 1}]}"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::UnknownIngredientRef(_)
        ));
    }

    #[test]
    fn duplicate_group_fails() {
        let json = r#"{
            "recipes": [{"name": "Mine Iron", "craft_time": 3, "outputs": {"Iron Ore": 1}}],
            "machines": [
                {"group": "g", "name": "A", "recipe": "Mine Iron"},
                {"group": "g", "name": "B", "recipe": "Mine Iron"}
            ]
        }"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::DuplicateGroup(_)
        ));
    }

    #[test]
    fn zero_rate_fails() {
        let json = r#"{
            "recipes": [{"name": "Mine Iron", "craft_time": 3, "outputs": {"Iron Ore": 1}}],
            "connections": [{"ingredient": "Iron Ore", "max_flow_rate": 0}]
        }"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::Factory(FactoryError::Connection(ConnectionError::NonPositiveRate(_)))
        ));
    }

    #[test]
    fn invalid_recipe_amount_fails() {
        let json = r#"{"recipes": [{"name": "r", "craft_time": 1, "outputs": {"x": 0}}]}"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::Registry(RegistryError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn huge_numbers_are_rejected() {
        let json = r#"{"recipes": [{"name": "r", "craft_time": 1e30}]}"#;
        assert!(matches!(
            load_factory_json(json).unwrap_err(),
            DataLoadError::OutOfRange(_)
        ));
    }

    #[test]
    fn load_invalid_json_fails() {
        let result = load_factory_json("not valid json {{{");
        assert!(matches!(result.unwrap_err(), DataLoadError::JsonParse(_)));
    }

    #[test]
    fn load_from_bytes() {
        let factory = load_factory_json_bytes(IRON_LINE.as_bytes()).unwrap();
        assert_eq!(factory.machine_count(), 4);
    }
}
