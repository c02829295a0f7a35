use crate::fixed::{Amount, Fixed64, Seconds, fixed64_to_f64};
use crate::id::*;
use crate::machine::MAX_BUFFER;
use std::collections::{BTreeMap, HashMap};

/// An ingredient definition in the registry.
#[derive(Debug, Clone)]
pub struct IngredientDef {
    pub name: String,
}

/// A recipe definition: required ingredients, produced outputs and the
/// nominal craft time in seconds.
#[derive(Debug, Clone)]
pub struct RecipeDef {
    pub name: String,
    /// Zero means the craft completes on the tick it starts.
    pub craft_time: Seconds,
    /// Required amount per ingredient. Absence means "not required".
    pub ingredients: BTreeMap<IngredientId, Amount>,
    /// Produced amount per output per completed craft.
    pub outputs: BTreeMap<IngredientId, Amount>,
}

impl RecipeDef {
    /// Whether this recipe consumes the given ingredient.
    pub fn requires(&self, ingredient: IngredientId) -> bool {
        self.ingredients.contains_key(&ingredient)
    }

    /// Required amount of an ingredient, if the recipe consumes it.
    pub fn required(&self, ingredient: IngredientId) -> Option<Amount> {
        self.ingredients.get(&ingredient).copied()
    }
}

/// Builder for constructing an immutable Registry.
/// Two-phase lifecycle: registration -> finalization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    ingredients: Vec<IngredientDef>,
    ingredient_name_to_id: HashMap<String, IngredientId>,
    recipes: Vec<RecipeDef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an ingredient by name. Registering an existing name returns
    /// the id it already has.
    pub fn register_ingredient(&mut self, name: &str) -> IngredientId {
        if let Some(&id) = self.ingredient_name_to_id.get(name) {
            return id;
        }
        let id = IngredientId(self.ingredients.len() as u32);
        self.ingredients.push(IngredientDef {
            name: name.to_string(),
        });
        self.ingredient_name_to_id.insert(name.to_string(), id);
        id
    }

    /// Register a recipe with no ingredients or outputs yet. Returns its ID.
    pub fn register_recipe(&mut self, name: &str, craft_time: Seconds) -> RecipeId {
        let id = RecipeId(self.recipes.len() as u32);
        self.recipes.push(RecipeDef {
            name: name.to_string(),
            craft_time,
            ingredients: BTreeMap::new(),
            outputs: BTreeMap::new(),
        });
        id
    }

    /// Declare that `recipe` consumes `amount` of `ingredient` per craft.
    pub fn require(
        &mut self,
        recipe: RecipeId,
        ingredient: IngredientId,
        amount: Amount,
    ) -> Result<(), RegistryError> {
        let def = self
            .recipes
            .get_mut(recipe.0 as usize)
            .ok_or_else(|| RegistryError::NotFound(format!("{recipe:?}")))?;
        def.ingredients.insert(ingredient, amount);
        Ok(())
    }

    /// Declare that `recipe` yields `amount` of `ingredient` per craft.
    pub fn produce(
        &mut self,
        recipe: RecipeId,
        ingredient: IngredientId,
        amount: Amount,
    ) -> Result<(), RegistryError> {
        let def = self
            .recipes
            .get_mut(recipe.0 as usize)
            .ok_or_else(|| RegistryError::NotFound(format!("{recipe:?}")))?;
        def.outputs.insert(ingredient, amount);
        Ok(())
    }

    /// Lookup ingredient ID by name.
    pub fn ingredient_id(&self, name: &str) -> Option<IngredientId> {
        self.ingredient_name_to_id.get(name).copied()
    }

    /// Finalize and build the immutable registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        let mut recipe_name_to_id = HashMap::with_capacity(self.recipes.len());

        for (index, recipe) in self.recipes.iter().enumerate() {
            if recipe_name_to_id
                .insert(recipe.name.clone(), RecipeId(index as u32))
                .is_some()
            {
                return Err(RegistryError::DuplicateRecipe(recipe.name.clone()));
            }

            if recipe.craft_time < Fixed64::ZERO {
                return Err(RegistryError::NegativeCraftTime {
                    recipe: recipe.name.clone(),
                });
            }

            for (&ingredient, &amount) in recipe.ingredients.iter().chain(recipe.outputs.iter()) {
                if ingredient.0 as usize >= self.ingredients.len() {
                    return Err(RegistryError::InvalidIngredientRef(ingredient));
                }
                if amount <= Fixed64::ZERO || amount > MAX_BUFFER {
                    return Err(RegistryError::InvalidAmount {
                        recipe: recipe.name.clone(),
                        amount: fixed64_to_f64(amount),
                    });
                }
            }
        }

        Ok(Registry {
            ingredients: self.ingredients,
            ingredient_name_to_id: self.ingredient_name_to_id,
            recipes: self.recipes,
            recipe_name_to_id,
        })
    }
}

/// Immutable registry. Frozen after build(), so machines never observe a
/// recipe changing mid-tick.
#[derive(Debug, Clone)]
pub struct Registry {
    ingredients: Vec<IngredientDef>,
    ingredient_name_to_id: HashMap<String, IngredientId>,
    recipes: Vec<RecipeDef>,
    recipe_name_to_id: HashMap<String, RecipeId>,
}

impl Registry {
    pub fn get_recipe(&self, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes.get(id.0 as usize)
    }

    pub fn get_ingredient(&self, id: IngredientId) -> Option<&IngredientDef> {
        self.ingredients.get(id.0 as usize)
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipe_name_to_id.get(name).copied()
    }

    pub fn ingredient_id(&self, name: &str) -> Option<IngredientId> {
        self.ingredient_name_to_id.get(name).copied()
    }

    /// Ingredient display name, or `"?"` for an unknown id.
    pub fn ingredient_name(&self, id: IngredientId) -> &str {
        self.get_ingredient(id).map_or("?", |i| i.name.as_str())
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    pub fn ingredient_count(&self) -> usize {
        self.ingredients.len()
    }

    /// One-line summary: `name: inputs -> 5.0s -> outputs`.
    pub fn describe_recipe(&self, id: RecipeId) -> Option<String> {
        let recipe = self.get_recipe(id)?;
        let names = |entries: &BTreeMap<IngredientId, Amount>| {
            entries
                .keys()
                .map(|&i| self.ingredient_name(i))
                .collect::<Vec<_>>()
                .join(", ")
        };
        Some(format!(
            "{}: {} -> {:.1}s -> {}",
            recipe.name,
            names(&recipe.ingredients),
            fixed64_to_f64(recipe.craft_time),
            names(&recipe.outputs),
        ))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid ingredient reference: {0:?}")]
    InvalidIngredientRef(IngredientId),
    #[error("recipe '{recipe}' has invalid amount {amount}")]
    InvalidAmount { recipe: String, amount: f64 },
    #[error("recipe '{recipe}' has a negative craft time")]
    NegativeCraftTime { recipe: String },
    #[error("duplicate recipe name: {0}")]
    DuplicateRecipe(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(v: f64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn setup_builder() -> RegistryBuilder {
        let mut b = RegistryBuilder::new();
        let ore = b.register_ingredient("Iron Ore");
        let plate = b.register_ingredient("Iron Plate");
        let smelt = b.register_recipe("Smelt Iron Ore", fixed(5.0));
        b.require(smelt, ore, fixed(1.0)).unwrap();
        b.produce(smelt, plate, fixed(1.0)).unwrap();
        b
    }

    #[test]
    fn register_and_build() {
        let reg = setup_builder().build().unwrap();
        assert_eq!(reg.ingredient_count(), 2);
        assert_eq!(reg.recipe_count(), 1);
    }

    #[test]
    fn ingredient_registration_is_idempotent() {
        let mut b = RegistryBuilder::new();
        let a = b.register_ingredient("Iron Ore");
        let c = b.register_ingredient("Iron Ore");
        assert_eq!(a, c);
        assert_eq!(b.build().unwrap().ingredient_count(), 1);
    }

    #[test]
    fn lookup_by_name() {
        let reg = setup_builder().build().unwrap();
        assert!(reg.ingredient_id("Iron Ore").is_some());
        assert!(reg.ingredient_id("Copper Ore").is_none());
        let smelt = reg.recipe_id("Smelt Iron Ore").unwrap();
        let recipe = reg.get_recipe(smelt).unwrap();
        assert!(recipe.requires(reg.ingredient_id("Iron Ore").unwrap()));
        assert!(!recipe.requires(reg.ingredient_id("Iron Plate").unwrap()));
    }

    #[test]
    fn require_overwrites_previous_amount() {
        let mut b = setup_builder();
        let ore = b.ingredient_id("Iron Ore").unwrap();
        b.require(RecipeId(0), ore, fixed(3.0)).unwrap();
        let reg = b.build().unwrap();
        assert_eq!(reg.get_recipe(RecipeId(0)).unwrap().required(ore), Some(fixed(3.0)));
    }

    #[test]
    fn require_on_unknown_recipe_fails() {
        let mut b = setup_builder();
        let ore = b.ingredient_id("Iron Ore").unwrap();
        let result = b.require(RecipeId(42), ore, fixed(1.0));
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
        let result = b.produce(RecipeId(42), ore, fixed(1.0));
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn invalid_ingredient_ref_fails() {
        let mut b = RegistryBuilder::new();
        let r = b.register_recipe("bad", fixed(1.0));
        b.produce(r, IngredientId(999), fixed(1.0)).unwrap();
        match b.build() {
            Err(RegistryError::InvalidIngredientRef(id)) => assert_eq!(id, IngredientId(999)),
            other => panic!("expected InvalidIngredientRef, got: {other:?}"),
        }
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut b = RegistryBuilder::new();
        let ore = b.register_ingredient("Iron Ore");
        let r = b.register_recipe("bad", fixed(1.0));
        b.require(r, ore, Fixed64::ZERO).unwrap();
        assert!(matches!(b.build(), Err(RegistryError::InvalidAmount { .. })));
    }

    #[test]
    fn amount_above_buffer_is_rejected() {
        let mut b = RegistryBuilder::new();
        let ore = b.register_ingredient("Iron Ore");
        let r = b.register_recipe("bad", fixed(1.0));
        b.produce(r, ore, fixed(101.0)).unwrap();
        let err = b.build().unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("invalid amount"), "got: {msg}");
    }

    #[test]
    fn negative_craft_time_is_rejected() {
        let mut b = RegistryBuilder::new();
        b.register_recipe("backwards", fixed(-1.0));
        assert!(matches!(
            b.build(),
            Err(RegistryError::NegativeCraftTime { .. })
        ));
    }

    #[test]
    fn zero_craft_time_is_allowed() {
        let mut b = RegistryBuilder::new();
        b.register_recipe("instant", Fixed64::ZERO);
        assert!(b.build().is_ok());
    }

    #[test]
    fn duplicate_recipe_names_are_rejected() {
        let mut b = setup_builder();
        b.register_recipe("Smelt Iron Ore", fixed(2.0));
        match b.build() {
            Err(RegistryError::DuplicateRecipe(name)) => assert_eq!(name, "Smelt Iron Ore"),
            other => panic!("expected DuplicateRecipe, got: {other:?}"),
        }
    }

    #[test]
    fn describe_recipe_lists_inputs_time_and_outputs() {
        let reg = setup_builder().build().unwrap();
        let text = reg.describe_recipe(RecipeId(0)).unwrap();
        assert_eq!(text, "Smelt Iron Ore: Iron Ore -> 5.0s -> Iron Plate");
        assert!(reg.describe_recipe(RecipeId(9)).is_none());
    }

    #[test]
    fn registry_get_nonexistent_returns_none() {
        let reg = setup_builder().build().unwrap();
        assert!(reg.get_recipe(RecipeId(999)).is_none());
        assert!(reg.get_ingredient(IngredientId(999)).is_none());
        assert!(reg.recipe_id("nonexistent").is_none());
        assert_eq!(reg.ingredient_name(IngredientId(999)), "?");
    }

    #[test]
    fn empty_registry_builds_successfully() {
        let reg = RegistryBuilder::new().build().unwrap();
        assert_eq!(reg.ingredient_count(), 0);
        assert_eq!(reg.recipe_count(), 0);
    }
}
