use crate::fixed::{Amount, Fixed64, Seconds, saturating_sum};
use crate::id::{IngredientId, RecipeId};
use crate::registry::{RecipeDef, Registry};
use crate::sim::{TickError, ensure_positive_delta};
use std::collections::BTreeMap;

/// Upper bound for every input and output buffer: 100 units.
pub const MAX_BUFFER: Amount = Fixed64::from_bits(100 << 32);

// ---------------------------------------------------------------------------
// Machine state
// ---------------------------------------------------------------------------

/// Derived view of what a machine is doing. Only the `crafting` flag is
/// stored; everything else is recomputed from buffers and progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    /// Nothing buffered, nothing in flight.
    Empty,
    /// Idle with some inputs buffered, waiting for the rest.
    Filling,
    /// Consuming the craft duration.
    Crafting,
    /// Craft finished but its outputs do not fit the output buffer.
    Blocked,
    /// Idle with output waiting to be drained.
    Draining,
}

/// What happened to a machine during one `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineTick {
    /// A craft began and its ingredients were deducted.
    pub started: bool,
    /// A craft finished and its outputs were deposited.
    pub completed: bool,
    /// A finished craft could not deposit its outputs (first tick only).
    pub blocked: bool,
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A production node bound to one recipe, with bounded input and output
/// buffers.
///
/// Ingredients for a craft are deducted the moment it starts and are not
/// visible to connections while it runs. When a craft finishes but its
/// outputs would overflow the output buffer the machine holds at full
/// progress until they fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    name: String,
    recipe: RecipeId,
    inputs: BTreeMap<IngredientId, Amount>,
    outputs: BTreeMap<IngredientId, Amount>,
    progress: Seconds,
    crafting: bool,
    /// Stretches the recipe's craft time; 1.05 means 5% slower.
    crafting_speed: Fixed64,
    crafts_completed: u64,
}

impl Machine {
    /// Create an idle machine with empty buffers. A negative speed is
    /// treated as zero (instant crafts).
    pub fn new(name: impl Into<String>, recipe: RecipeId, crafting_speed: Fixed64) -> Self {
        Self {
            name: name.into(),
            recipe,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            progress: Fixed64::ZERO,
            crafting: false,
            crafting_speed: crafting_speed.max(Fixed64::ZERO),
            crafts_completed: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn recipe(&self) -> RecipeId {
        self.recipe
    }

    /// Seconds spent on the current craft.
    pub fn progress(&self) -> Seconds {
        self.progress
    }

    pub fn is_crafting(&self) -> bool {
        self.crafting
    }

    pub fn crafting_speed(&self) -> Fixed64 {
        self.crafting_speed
    }

    pub fn crafts_completed(&self) -> u64 {
        self.crafts_completed
    }

    /// Buffered inputs. Ingredients in flight are not included.
    pub fn inputs(&self) -> &BTreeMap<IngredientId, Amount> {
        &self.inputs
    }

    /// Produced output awaiting a connection.
    pub fn outputs(&self) -> &BTreeMap<IngredientId, Amount> {
        &self.outputs
    }

    /// Craft time after applying this machine's speed.
    pub fn effective_craft_time(&self, registry: &Registry) -> Option<Seconds> {
        registry.get_recipe(self.recipe).map(|r| self.target(r))
    }

    fn target(&self, recipe: &RecipeDef) -> Seconds {
        recipe.craft_time.saturating_mul(self.crafting_speed)
    }

    // -----------------------------------------------------------------------
    // Input buffers
    // -----------------------------------------------------------------------

    /// Room left for `ingredient`. Zero when the recipe does not consume it
    /// or the recipe is missing.
    pub fn available_input_capacity(&self, registry: &Registry, ingredient: IngredientId) -> Amount {
        match registry.get_recipe(self.recipe) {
            Some(recipe) if recipe.requires(ingredient) => {
                (MAX_BUFFER - buffered(&self.inputs, ingredient)).max(Fixed64::ZERO)
            }
            _ => Fixed64::ZERO,
        }
    }

    /// Amount of `ingredient` currently buffered.
    pub fn available_input(&self, ingredient: IngredientId) -> Amount {
        buffered(&self.inputs, ingredient)
    }

    /// Buffer up to `amount` of `ingredient`. Returns what was accepted,
    /// which may be less than offered.
    pub fn add_input(&mut self, registry: &Registry, ingredient: IngredientId, amount: Amount) -> Amount {
        let accepted = amount.min(self.available_input_capacity(registry, ingredient));
        if accepted <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        deposit(&mut self.inputs, ingredient, accepted);
        accepted
    }

    /// Top `ingredient` up to the buffer limit. Returns the amount added.
    pub fn fill_input(&mut self, registry: &Registry, ingredient: IngredientId) -> Amount {
        let capacity = self.available_input_capacity(registry, ingredient);
        self.add_input(registry, ingredient, capacity)
    }

    /// Remove up to `amount` of `ingredient`. Never goes below zero.
    pub fn consume_input(&mut self, ingredient: IngredientId, amount: Amount) -> Amount {
        withdraw(&mut self.inputs, ingredient, amount)
    }

    // -----------------------------------------------------------------------
    // Output buffer
    // -----------------------------------------------------------------------

    /// Amount of `ingredient` waiting to be drained.
    pub fn available_output(&self, ingredient: IngredientId) -> Amount {
        buffered(&self.outputs, ingredient)
    }

    /// Deposit up to `amount` into the output buffer, clamped at
    /// [`MAX_BUFFER`]. Returns what was accepted.
    pub fn add_output(&mut self, ingredient: IngredientId, amount: Amount) -> Amount {
        let room = (MAX_BUFFER - buffered(&self.outputs, ingredient)).max(Fixed64::ZERO);
        let accepted = amount.min(room);
        if accepted <= Fixed64::ZERO {
            return Fixed64::ZERO;
        }
        deposit(&mut self.outputs, ingredient, accepted);
        accepted
    }

    /// Drain up to `amount`. Asking for more than is present drains what is
    /// present.
    pub fn consume_output(&mut self, ingredient: IngredientId, amount: Amount) -> Amount {
        withdraw(&mut self.outputs, ingredient, amount)
    }

    /// Drain everything buffered for `ingredient`.
    pub fn consume_all_output(&mut self, ingredient: IngredientId) -> Amount {
        self.outputs.remove(&ingredient).unwrap_or(Fixed64::ZERO)
    }

    // -----------------------------------------------------------------------
    // Crafting
    // -----------------------------------------------------------------------

    /// True when idle and every required ingredient is buffered in full.
    /// A recipe without ingredients is always craftable.
    pub fn can_craft(&self, registry: &Registry) -> bool {
        if self.crafting {
            return false;
        }
        let Some(recipe) = registry.get_recipe(self.recipe) else {
            return false;
        };
        recipe
            .ingredients
            .iter()
            .all(|(&ingredient, &amount)| buffered(&self.inputs, ingredient) >= amount)
    }

    /// Begin a craft if [`can_craft`](Self::can_craft) allows it, deducting
    /// every ingredient at once. Returns whether a craft started.
    pub fn start_crafting(&mut self, registry: &Registry) -> bool {
        if !self.can_craft(registry) {
            return false;
        }
        let Some(recipe) = registry.get_recipe(self.recipe) else {
            return false;
        };
        for (&ingredient, &amount) in &recipe.ingredients {
            withdraw(&mut self.inputs, ingredient, amount);
        }
        self.crafting = true;
        self.progress = Fixed64::ZERO;
        true
    }

    /// Advance the machine by `dt` seconds.
    ///
    /// Starts a craft when idle and supplied, then accumulates progress. A
    /// craft completes once progress reaches `craft_time * crafting_speed`
    /// and every output fits its buffer.
    pub fn update(&mut self, registry: &Registry, dt: Seconds) -> Result<MachineTick, TickError> {
        ensure_positive_delta(dt)?;
        let mut tick = MachineTick::default();
        let Some(recipe) = registry.get_recipe(self.recipe) else {
            return Ok(tick);
        };
        let was_blocked = self.is_blocked(recipe);

        if !self.crafting && self.start_crafting(registry) {
            tick.started = true;
        }

        if self.crafting {
            let target = self.target(recipe);
            self.progress = self.progress.saturating_add(dt).min(target);

            if self.progress >= target {
                if outputs_fit(&self.outputs, recipe) {
                    for (&ingredient, &amount) in &recipe.outputs {
                        deposit(&mut self.outputs, ingredient, amount);
                    }
                    self.progress = Fixed64::ZERO;
                    self.crafting = false;
                    self.crafts_completed += 1;
                    tick.completed = true;
                } else if !was_blocked {
                    tick.blocked = true;
                }
            }
        }

        Ok(tick)
    }

    fn is_blocked(&self, recipe: &RecipeDef) -> bool {
        self.crafting && self.progress >= self.target(recipe) && !outputs_fit(&self.outputs, recipe)
    }

    // -----------------------------------------------------------------------
    // Derived views
    // -----------------------------------------------------------------------

    /// Current derived state.
    pub fn state(&self, registry: &Registry) -> MachineState {
        if self.crafting {
            let blocked = registry
                .get_recipe(self.recipe)
                .is_some_and(|recipe| self.is_blocked(recipe));
            if blocked {
                MachineState::Blocked
            } else {
                MachineState::Crafting
            }
        } else if self.outputs.values().any(|&a| a > Fixed64::ZERO) {
            MachineState::Draining
        } else if self.inputs.values().any(|&a| a > Fixed64::ZERO) {
            MachineState::Filling
        } else {
            MachineState::Empty
        }
    }

    /// Share of the current craft completed, in `[0, 1]`. Zero when idle.
    pub fn progress_fraction(&self, registry: &Registry) -> Fixed64 {
        let one = Fixed64::from_num(1);
        if !self.crafting {
            return Fixed64::ZERO;
        }
        let Some(target) = self.effective_craft_time(registry) else {
            return Fixed64::ZERO;
        };
        if target <= Fixed64::ZERO {
            return one;
        }
        self.progress
            .checked_div(target)
            .unwrap_or(one)
            .clamp(Fixed64::ZERO, one)
    }

    /// Share of the next craft's ingredients already buffered, in `[0, 1]`.
    pub fn input_fill_fraction(&self, registry: &Registry) -> Fixed64 {
        let one = Fixed64::from_num(1);
        let Some(recipe) = registry.get_recipe(self.recipe) else {
            return Fixed64::ZERO;
        };
        let required = saturating_sum(recipe.ingredients.values().copied());
        if required <= Fixed64::ZERO {
            return one;
        }
        let satisfied = saturating_sum(
            recipe
                .ingredients
                .iter()
                .map(|(&ingredient, &amount)| buffered(&self.inputs, ingredient).min(amount)),
        );
        satisfied.checked_div(required).unwrap_or(one).min(one)
    }
}

// ---------------------------------------------------------------------------
// Buffer helpers
// ---------------------------------------------------------------------------

fn buffered(buffer: &BTreeMap<IngredientId, Amount>, ingredient: IngredientId) -> Amount {
    buffer.get(&ingredient).copied().unwrap_or(Fixed64::ZERO)
}

fn deposit(buffer: &mut BTreeMap<IngredientId, Amount>, ingredient: IngredientId, amount: Amount) {
    let slot = buffer.entry(ingredient).or_insert(Fixed64::ZERO);
    *slot = slot.saturating_add(amount);
}

/// Remove up to `amount`, dropping the entry once it is empty.
fn withdraw(buffer: &mut BTreeMap<IngredientId, Amount>, ingredient: IngredientId, amount: Amount) -> Amount {
    if amount <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }
    let Some(slot) = buffer.get_mut(&ingredient) else {
        return Fixed64::ZERO;
    };
    let taken = amount.min(*slot);
    *slot -= taken;
    if *slot <= Fixed64::ZERO {
        buffer.remove(&ingredient);
    }
    taken
}

fn outputs_fit(buffer: &BTreeMap<IngredientId, Amount>, recipe: &RecipeDef) -> bool {
    recipe
        .outputs
        .iter()
        .all(|(&ingredient, &amount)| buffered(buffer, ingredient).saturating_add(amount) <= MAX_BUFFER)
}

// ===========================================================================
// Tests
// ===========================================================================
