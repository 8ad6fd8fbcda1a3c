//! Blueprint registry: named component-composition recipes.
//!
//! A recipe maps registered component type names to field-override maps.
//! Spawning deep-copies the recipe, merges any per-spawn overrides, and
//! constructs each component through the world's name-indexed registry.
//! Recipes and metadata are plain JSON-compatible values, so blueprints can
//! be loaded from data files unchanged.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tick_ecs::prelude::*;

use crate::EngineError;

/// A recipe: component type name -> field map.
pub type BlueprintRecipe = BTreeMap<String, serde_json::Map<String, serde_json::Value>>;

// ---------------------------------------------------------------------------
// BlueprintRegistry
// ---------------------------------------------------------------------------

/// Stores and instantiates entity templates.
///
/// Metadata is opaque to the core; demos use it for footprints, terrain
/// requirements, and labels.
#[derive(Default)]
pub struct BlueprintRegistry {
    recipes: RefCell<IndexMap<String, BlueprintRecipe>>,
    meta: RefCell<IndexMap<String, serde_json::Value>>,
}

impl BlueprintRegistry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Define a named template with optional metadata. Overwrites if the
    /// name exists.
    pub fn define(&self, name: &str, recipe: BlueprintRecipe, meta: Option<serde_json::Value>) {
        self.recipes.borrow_mut().insert(name.to_owned(), recipe);
        match meta {
            Some(meta) => {
                self.meta.borrow_mut().insert(name.to_owned(), meta);
            }
            None => {
                self.meta.borrow_mut().shift_remove(name);
            }
        }
    }

    /// Whether a recipe name is defined.
    pub fn has(&self, name: &str) -> bool {
        self.recipes.borrow().contains_key(name)
    }

    /// A copy of a recipe's metadata. A recipe defined without metadata
    /// yields an empty object.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] if the blueprint is not defined.
    pub fn meta(&self, name: &str) -> Result<serde_json::Value, EngineError> {
        if !self.recipes.borrow().contains_key(name) {
            return Err(EngineError::UnknownName {
                kind: "blueprint",
                name: name.to_owned(),
            });
        }
        Ok(self
            .meta
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())))
    }

    /// A copy of all defined recipes.
    pub fn recipes(&self) -> IndexMap<String, BlueprintRecipe> {
        self.recipes.borrow().clone()
    }

    /// Remove a recipe and its metadata.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] if the name is not defined.
    pub fn remove(&self, name: &str) -> Result<(), EngineError> {
        self.recipes
            .borrow_mut()
            .shift_remove(name)
            .ok_or_else(|| EngineError::UnknownName {
                kind: "blueprint",
                name: name.to_owned(),
            })?;
        self.meta.borrow_mut().shift_remove(name);
        Ok(())
    }

    /// Spawn an entity from a template, merging `overrides` into the
    /// recipe's per-type field maps first.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] for an unknown blueprint or an unknown
    /// component type name inside the recipe; deserialization failures
    /// propagate as [`EngineError::Ecs`].
    pub fn spawn(
        &self,
        world: &mut World,
        name: &str,
        overrides: Option<&BlueprintRecipe>,
    ) -> Result<EntityId, EngineError> {
        let mut merged = self
            .recipes
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownName {
                kind: "blueprint",
                name: name.to_owned(),
            })?;

        if let Some(overrides) = overrides {
            for (comp_name, fields) in overrides {
                let entry = merged.entry(comp_name.clone()).or_default();
                for (field, value) in fields {
                    entry.insert(field.clone(), value.clone());
                }
            }
        }

        let entity = world.spawn();
        for (comp_name, fields) in &merged {
            world
                .attach_by_name(entity, comp_name, &serde_json::Value::Object(fields.clone()))
                .map_err(|err| match err {
                    EcsError::UnknownComponent(name) => EngineError::UnknownName {
                        kind: "component",
                        name,
                    },
                    other => EngineError::Ecs(other),
                })?;
        }
        Ok(entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
