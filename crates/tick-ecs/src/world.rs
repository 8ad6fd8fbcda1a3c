//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component registry, and one typed column per registered
//! component type.

use std::any::TypeId;
use std::collections::HashMap;

use crate::component::{new_column, Column, Component, ComponentColumn};
use crate::entity::{EntityAllocator, EntityId};
use crate::query::{QueryFilter, QueryIter, QuerySpec};
use crate::EcsError;

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Entity allocator plus typed component storage with name-indexed
/// registration.
///
/// Component types register themselves on first [`attach`](World::attach);
/// [`register_component`](World::register_component) exists for the restore
/// path, where a snapshot references types by name before any value of that
/// type has been attached.
pub struct World {
    pub(crate) allocator: EntityAllocator,
    pub(crate) columns: HashMap<TypeId, Box<dyn ComponentColumn>>,
    pub(crate) by_name: HashMap<&'static str, TypeId>,
    pub(crate) type_names: HashMap<TypeId, &'static str>,
    pub(crate) factories: HashMap<TypeId, fn() -> Box<dyn ComponentColumn>>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.allocator.alive_count())
            .field("component_types", &self.by_name.len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            columns: HashMap::new(),
            by_name: HashMap::new(),
            type_names: HashMap::new(),
            factories: HashMap::new(),
        }
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn a new entity with no components.
    pub fn spawn(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    /// Despawn an entity, dropping all of its components. Idempotent.
    pub fn despawn(&mut self, entity: EntityId) {
        self.allocator.deallocate(entity);
        for column in self.columns.values_mut() {
            column.remove_row(entity);
        }
    }

    /// Whether an entity is currently alive.
    pub fn alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    /// All alive entity IDs in ascending order.
    pub fn entities(&self) -> Vec<EntityId> {
        self.allocator.entities()
    }

    /// Number of currently alive entities.
    pub fn entity_count(&self) -> usize {
        self.allocator.alive_count()
    }

    // -- registration -------------------------------------------------------

    /// Register a component type by its stable name.
    ///
    /// Required before a restore that references the type; otherwise
    /// registration happens implicitly on first attach.
    pub fn register_component<T: Component>(&mut self) {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_name.get(T::NAME) {
            if existing != type_id {
                tracing::warn!(
                    name = T::NAME,
                    "component name re-registered with a different type; snapshots may not round-trip"
                );
            }
        }
        self.by_name.insert(T::NAME, type_id);
        self.type_names.insert(type_id, T::NAME);
        self.factories.insert(type_id, new_column::<T>);
        self.columns
            .entry(type_id)
            .or_insert_with(|| new_column::<T>());
    }

    /// Look up a registered type name's `TypeId`.
    pub(crate) fn type_id_of(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    /// All registered component type names, sorted.
    pub fn registered_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.by_name.keys().copied().collect();
        names.sort_unstable();
        names
    }

    // -- component access ---------------------------------------------------

    /// Attach a component, replacing any existing component of that type.
    ///
    /// Registers the type implicitly. Fails with [`EcsError::DeadEntity`] if
    /// the entity is not alive.
    pub fn attach<T: Component>(&mut self, entity: EntityId, component: T) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        self.register_component::<T>();
        let column = self.typed_column_mut::<T>();
        column.rows.insert(entity, component);
        Ok(())
    }

    /// Detach a component, returning it if present.
    ///
    /// Fails with [`EcsError::DeadEntity`] if the entity is not alive;
    /// a missing component is a no-op yielding `None`.
    pub fn detach<T: Component>(&mut self, entity: EntityId) -> Result<Option<T>, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        Ok(self
            .columns
            .get_mut(&TypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<Column<T>>())
            .and_then(|c| c.rows.shift_remove(&entity)))
    }

    /// Get a shared reference to the entity's component.
    ///
    /// Distinguishes a dead entity ([`EcsError::DeadEntity`]) from an alive
    /// entity missing the component ([`EcsError::MissingComponent`]).
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        self.peek::<T>(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: T::NAME,
        })
    }

    /// Get a mutable reference to the entity's component.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        self.columns
            .get_mut(&TypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<Column<T>>())
            .and_then(|c| c.rows.get_mut(&entity))
            .ok_or(EcsError::MissingComponent {
                entity,
                component: T::NAME,
            })
    }

    /// Whether the entity is alive and holds a component of type `T`.
    pub fn has<T: Component>(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity) && self.peek::<T>(entity).is_some()
    }

    // -- queries ------------------------------------------------------------

    /// Iterate all alive entities holding every component in `Q`, in
    /// insertion order of the first listed type.
    ///
    /// `Q` is a tuple of component types, e.g. `world.query::<(Pos, Vel)>()`
    /// yields `(EntityId, (&Pos, &Vel))`. A candidate missing a later
    /// component is skipped, not an error.
    pub fn query<Q: QuerySpec>(&self) -> QueryIter<'_, Q, ()> {
        QueryIter::new(self, self.column_entity_ids(Q::primary()))
    }

    /// [`query`](World::query) with an additional filter tuple of
    /// [`Not`](crate::query::Not) / [`AnyOf`](crate::query::AnyOf) markers.
    pub fn query_filtered<Q: QuerySpec, F: QueryFilter>(&self) -> QueryIter<'_, Q, F> {
        QueryIter::new(self, self.column_entity_ids(Q::primary()))
    }

    fn column_entity_ids(&self, type_id: TypeId) -> Vec<EntityId> {
        self.columns
            .get(&type_id)
            .map(|c| c.entity_ids())
            .unwrap_or_default()
    }

    /// Component lookup without the aliveness check. Query internals only;
    /// the iterator has already filtered dead entities.
    pub(crate) fn peek<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.columns
            .get(&TypeId::of::<T>())
            .and_then(|c| c.as_any().downcast_ref::<Column<T>>())
            .and_then(|c| c.rows.get(&entity))
    }

    pub(crate) fn peek_has<T: Component>(&self, entity: EntityId) -> bool {
        self.columns
            .get(&TypeId::of::<T>())
            .map(|c| c.contains(entity))
            .unwrap_or(false)
    }

    fn typed_column_mut<T: Component>(&mut self) -> &mut Column<T> {
        // Column was created by register_component::<T> just above; the
        // downcast cannot fail for a matching TypeId.
        self.columns
            .get_mut(&TypeId::of::<T>())
            .and_then(|c| c.as_any_mut().downcast_mut::<Column<T>>())
            .expect("column registered for TypeId must downcast to Column<T>")
    }

    // -- name-indexed access (restore, blueprints, tween) -------------------

    /// Construct and attach a component from its registered name and a JSON
    /// field map. Replaces any existing component of that type.
    pub fn attach_by_name(
        &mut self,
        entity: EntityId,
        type_name: &str,
        value: &serde_json::Value,
    ) -> Result<(), EcsError> {
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::DeadEntity(entity));
        }
        let type_id = self
            .type_id_of(type_name)
            .ok_or_else(|| EcsError::UnknownComponent(type_name.to_owned()))?;
        let factory = self.factories[&type_id];
        let column = self.columns.entry(type_id).or_insert_with(factory);
        column.insert_value(entity, value)
    }

    /// Write a numeric field of the entity's component, both looked up by
    /// name. Returns `false` (touching nothing) when the type is not
    /// registered, the entity has no such component, or the field is absent
    /// or non-numeric.
    pub fn set_field_by_name(
        &mut self,
        entity: EntityId,
        type_name: &str,
        field: &str,
        value: f64,
    ) -> bool {
        if !self.allocator.is_alive(entity) {
            return false;
        }
        let Some(type_id) = self.type_id_of(type_name) else {
            return false;
        };
        match self.columns.get_mut(&type_id) {
            Some(column) => column.write_field_f64(entity, field, value),
            None => false,
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
