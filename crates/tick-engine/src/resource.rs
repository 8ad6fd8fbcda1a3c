//! Resource definitions, inventories, crafting, and decay.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tick_ecs::prelude::*;

use crate::clock::TickContext;
use crate::engine::System;
use crate::EngineError;

// ---------------------------------------------------------------------------
// ResourceDef / ResourceRegistry
// ---------------------------------------------------------------------------

/// Immutable resource type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Unique identifier for this resource type.
    pub name: String,
    /// Maximum quantity per inventory slot (-1 for unlimited).
    pub max_stack: i64,
    /// Units lost per tick (0 for no decay).
    pub decay_rate: u32,
    /// Arbitrary user metadata (e.g. `{"edible": true}`).
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl ResourceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_stack: -1,
            decay_rate: 0,
            properties: serde_json::Map::new(),
        }
    }

    pub fn with_max_stack(mut self, max_stack: i64) -> Self {
        self.max_stack = max_stack;
        self
    }

    pub fn with_decay_rate(mut self, decay_rate: u32) -> Self {
        self.decay_rate = decay_rate;
        self
    }

    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_owned(), value);
        self
    }
}

/// Stores resource type definitions with snapshot/restore support.
#[derive(Default)]
pub struct ResourceRegistry {
    definitions: RefCell<IndexMap<String, ResourceDef>>,
}

impl ResourceRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register a resource type. Overwrites if the name exists.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] for an empty name or `max_stack < -1`.
    pub fn define(&self, def: ResourceDef) -> Result<(), EngineError> {
        if def.name.is_empty() {
            return Err(EngineError::BadInput(
                "resource name must be non-empty".to_owned(),
            ));
        }
        if def.max_stack < -1 {
            return Err(EngineError::BadInput(format!(
                "max_stack must be >= -1, got {}",
                def.max_stack
            )));
        }
        self.definitions.borrow_mut().insert(def.name.clone(), def);
        Ok(())
    }

    /// Look up a definition.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] if the name is not defined.
    pub fn get(&self, name: &str) -> Result<ResourceDef, EngineError> {
        self.definitions
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownName {
                kind: "resource",
                name: name.to_owned(),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.definitions.borrow().contains_key(name)
    }

    /// All defined resource names in definition order.
    pub fn defined_resources(&self) -> Vec<String> {
        self.definitions.borrow().keys().cloned().collect()
    }

    /// Remove a definition.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] if the name is not defined.
    pub fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.definitions
            .borrow_mut()
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::UnknownName {
                kind: "resource",
                name: name.to_owned(),
            })
    }

    /// Serialize all definitions.
    pub fn snapshot(&self) -> serde_json::Value {
        let definitions: BTreeMap<String, ResourceDef> = self
            .definitions
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::json!({ "definitions": definitions })
    }

    /// Restore definitions from snapshot data.
    ///
    /// # Errors
    ///
    /// [`EngineError::Snapshot`] for a malformed value tree.
    pub fn restore(&self, data: &serde_json::Value) -> Result<(), EngineError> {
        let definitions: BTreeMap<String, ResourceDef> = serde_json::from_value(
            data.get("definitions")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({})),
        )
        .map_err(|e| EngineError::Snapshot(format!("resource registry: {e}")))?;
        let mut defs = self.definitions.borrow_mut();
        defs.clear();
        for (_, def) in definitions {
            defs.insert(def.name.clone(), def);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Mutable inventory component: resource name -> positive quantity, with an
/// optional total capacity (-1 for unlimited).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub slots: BTreeMap<String, u64>,
    pub capacity: i64,
}

impl Component for Inventory {
    const NAME: &'static str = "resource.Inventory";
}

impl Default for Inventory {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl Inventory {
    /// An inventory with no capacity limit.
    pub fn unlimited() -> Self {
        Self {
            slots: BTreeMap::new(),
            capacity: -1,
        }
    }

    /// An inventory capped at `capacity` total units across all resources.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            slots: BTreeMap::new(),
            capacity: capacity as i64,
        }
    }

    /// Add resources, respecting capacity. Returns the amount actually
    /// added, which may be less than requested (0 for a full inventory).
    pub fn add(&mut self, name: &str, amount: u64) -> u64 {
        if amount == 0 {
            return 0;
        }
        let actual = if self.capacity < 0 {
            amount
        } else {
            let available = (self.capacity as u64).saturating_sub(self.total());
            amount.min(available)
        };
        if actual > 0 {
            *self.slots.entry(name.to_owned()).or_insert(0) += actual;
        }
        actual
    }

    /// Remove resources, deleting the slot when it reaches zero. Returns the
    /// amount actually removed.
    pub fn remove(&mut self, name: &str, amount: u64) -> u64 {
        let Some(current) = self.slots.get(name).copied() else {
            return 0;
        };
        let actual = amount.min(current);
        if actual == current {
            self.slots.remove(name);
        } else if actual > 0 {
            self.slots.insert(name.to_owned(), current - actual);
        }
        actual
    }

    /// Current quantity of one resource.
    pub fn count(&self, name: &str) -> u64 {
        self.slots.get(name).copied().unwrap_or(0)
    }

    /// Total quantity across all resource types.
    pub fn total(&self) -> u64 {
        self.slots.values().sum()
    }

    /// Whether at least `amount` of `name` is present.
    pub fn has(&self, name: &str, amount: u64) -> bool {
        self.count(name) >= amount
    }

    /// Whether every requirement is met.
    pub fn has_all(&self, requirements: &BTreeMap<String, u64>) -> bool {
        requirements
            .iter()
            .all(|(name, needed)| self.count(name) >= *needed)
    }

    /// All resource names currently held.
    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    /// Remove all of one resource type.
    pub fn clear(&mut self, name: &str) {
        self.slots.remove(name);
    }

    /// Empty the inventory.
    pub fn clear_all(&mut self) {
        self.slots.clear();
    }

    /// Move resources between inventories, limited by source quantity and
    /// target capacity. Atomic: units the target cannot hold go back into
    /// the source. Returns the amount transferred.
    pub fn transfer(source: &mut Inventory, target: &mut Inventory, name: &str, amount: u64) -> u64 {
        let removed = source.remove(name, amount);
        let added = target.add(name, removed);
        if added < removed {
            source.add(name, removed - added);
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Recipe and crafting
// ---------------------------------------------------------------------------

/// Immutable crafting recipe. `duration` is metadata only; no subsystem
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub inputs: BTreeMap<String, u64>,
    pub outputs: BTreeMap<String, u64>,
    pub duration: u32,
}

impl Recipe {
    /// # Errors
    ///
    /// [`EngineError::BadInput`] for an empty name.
    pub fn new(
        name: impl Into<String>,
        inputs: BTreeMap<String, u64>,
        outputs: BTreeMap<String, u64>,
        duration: u32,
    ) -> Result<Self, EngineError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::BadInput(
                "recipe name must be non-empty".to_owned(),
            ));
        }
        Ok(Self {
            name,
            inputs,
            outputs,
            duration,
        })
    }
}

/// Whether the inventory holds every input of the recipe.
pub fn can_craft(inventory: &Inventory, recipe: &Recipe) -> bool {
    inventory.has_all(&recipe.inputs)
}

/// Consume inputs and produce outputs (capacity-capped, excess lost).
/// Returns `false` without mutating anything when inputs are missing.
pub fn craft(inventory: &mut Inventory, recipe: &Recipe) -> bool {
    if !can_craft(inventory, recipe) {
        return false;
    }
    for (name, amount) in &recipe.inputs {
        inventory.remove(name, *amount);
    }
    for (name, amount) in &recipe.outputs {
        inventory.add(name, *amount);
    }
    true
}

// ---------------------------------------------------------------------------
// Decay system
// ---------------------------------------------------------------------------

/// Callback fired when resources are lost to decay.
pub type SpoilHook = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &str, u64)>;

/// A system that removes up to `decay_rate` units per tick from every
/// inventory, for every resource whose registered `decay_rate > 0`.
/// Resources not in the registry are ignored.
pub fn decay_system(registry: Rc<ResourceRegistry>, mut on_spoiled: Option<SpoilHook>) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let holders: Vec<EntityId> = world.query::<(Inventory,)>().map(|(e, _)| e).collect();
        for entity in holders {
            let names = match world.get::<Inventory>(entity) {
                Ok(inv) => inv.names(),
                Err(_) => continue,
            };
            for name in names {
                if !registry.has(&name) {
                    continue;
                }
                let rate = match registry.get(&name) {
                    Ok(def) => u64::from(def.decay_rate),
                    Err(_) => continue,
                };
                if rate == 0 {
                    continue;
                }
                let removed = match world.get_mut::<Inventory>(entity) {
                    Ok(inv) => inv.remove(&name, rate),
                    Err(_) => continue,
                };
                if removed > 0 {
                    if let Some(hook) = on_spoiled.as_mut() {
                        hook(world, ctx, entity, &name, removed);
                    }
                }
            }
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
