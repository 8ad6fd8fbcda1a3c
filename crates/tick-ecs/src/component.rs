//! Component trait and typed column storage.
//!
//! A component is a plain serde-able record attached to an entity. Each
//! registered component type gets a [`Column`]: an insertion-ordered sparse
//! map from [`EntityId`] to the component value. The insertion order of a
//! column is the iteration order queries observe for their first listed type.
//!
//! Columns are type-erased behind the [`ComponentColumn`] trait so the world
//! can store heterogeneous columns in one map; the name-indexed operations
//! (snapshot, restore, blueprint construction, tween field writes) go through
//! the erased surface, while typed access downcasts to the concrete column.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::entity::EntityId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A user-defined component type.
///
/// The associated [`NAME`](Component::NAME) is the stable fully-qualified
/// name used by snapshots, blueprints, and tween target lookup. It must be
/// unique across all component types registered in a world and must never
/// change once snapshots referencing it exist.
pub trait Component: Clone + Serialize + DeserializeOwned + 'static {
    /// Stable fully-qualified name for serialization.
    const NAME: &'static str;
}

// ---------------------------------------------------------------------------
// ComponentColumn -- type-erased storage surface
// ---------------------------------------------------------------------------

/// Type-erased operations over a single component column.
pub(crate) trait ComponentColumn {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Remove the entity's row. Returns `true` if a row was removed.
    fn remove_row(&mut self, entity: EntityId) -> bool;

    /// Whether the entity has a row in this column.
    fn contains(&self, entity: EntityId) -> bool;

    /// All entity IDs in insertion order.
    fn entity_ids(&self) -> Vec<EntityId>;

    fn is_empty(&self) -> bool;

    /// Serialize every row belonging to an alive entity.
    ///
    /// Keys are decimal entity IDs; values are the component's JSON field
    /// map. A component that refuses to serialize fails the whole snapshot.
    fn serialize_rows(
        &self,
        alive: &HashSet<EntityId>,
    ) -> Result<BTreeMap<String, serde_json::Value>, EcsError>;

    /// Deserialize a JSON value and insert (or replace) the entity's row.
    fn insert_value(&mut self, entity: EntityId, value: &serde_json::Value)
        -> Result<(), EcsError>;

    /// Write a numeric field of the entity's row by name.
    ///
    /// Returns `false` without touching anything when the entity has no row,
    /// the field does not exist, or the field is not a number. Used only by
    /// the tween system.
    fn write_field_f64(&mut self, entity: EntityId, field: &str, value: f64) -> bool;

    fn clear(&mut self);
}

// ---------------------------------------------------------------------------
// Column<T> -- concrete typed storage
// ---------------------------------------------------------------------------

/// Insertion-ordered sparse storage for one component type.
pub(crate) struct Column<T: Component> {
    pub(crate) rows: IndexMap<EntityId, T>,
}

impl<T: Component> Column<T> {
    pub(crate) fn new() -> Self {
        Self {
            rows: IndexMap::new(),
        }
    }
}

/// Column factory used by the registry so restore can materialize a column
/// for a type known only by name.
pub(crate) fn new_column<T: Component>() -> Box<dyn ComponentColumn> {
    Box::new(Column::<T>::new())
}

impl<T: Component> ComponentColumn for Column<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove_row(&mut self, entity: EntityId) -> bool {
        // shift_remove keeps the remaining rows in insertion order.
        self.rows.shift_remove(&entity).is_some()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.rows.keys().copied().collect()
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn serialize_rows(
        &self,
        alive: &HashSet<EntityId>,
    ) -> Result<BTreeMap<String, serde_json::Value>, EcsError> {
        let mut out = BTreeMap::new();
        for (entity, component) in &self.rows {
            if !alive.contains(entity) {
                continue;
            }
            let value = serde_json::to_value(component).map_err(|e| {
                EcsError::Snapshot(format!(
                    "component '{}' on entity {entity} is not serializable: {e}",
                    T::NAME
                ))
            })?;
            out.insert(entity.to_raw().to_string(), value);
        }
        Ok(out)
    }

    fn insert_value(
        &mut self,
        entity: EntityId,
        value: &serde_json::Value,
    ) -> Result<(), EcsError> {
        let component: T =
            serde_json::from_value(value.clone()).map_err(|e| EcsError::Deserialize {
                component: T::NAME.to_owned(),
                details: e.to_string(),
            })?;
        self.rows.insert(entity, component);
        Ok(())
    }

    fn write_field_f64(&mut self, entity: EntityId, field: &str, value: f64) -> bool {
        let Some(component) = self.rows.get(&entity) else {
            return false;
        };
        let Ok(serde_json::Value::Object(mut fields)) = serde_json::to_value(component) else {
            return false;
        };
        match fields.get(field) {
            Some(serde_json::Value::Number(_)) => {}
            _ => return false,
        }
        let Some(number) = serde_json::Number::from_f64(value) else {
            return false;
        };
        fields.insert(field.to_owned(), serde_json::Value::Number(number));
        let Ok(updated) = serde_json::from_value::<T>(serde_json::Value::Object(fields)) else {
            return false;
        };
        self.rows.insert(entity, updated);
        true
    }

    fn clear(&mut self) {
        self.rows.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f64,
        y: f64,
    }

    impl Component for Pos {
        const NAME: &'static str = "test.Pos";
    }

    fn eid(raw: u64) -> EntityId {
        EntityId::from_raw(raw)
    }

    #[test]
    fn rows_keep_insertion_order_across_removal() {
        let mut col = Column::<Pos>::new();
        col.rows.insert(eid(3), Pos { x: 0.0, y: 0.0 });
        col.rows.insert(eid(1), Pos { x: 1.0, y: 0.0 });
        col.rows.insert(eid(2), Pos { x: 2.0, y: 0.0 });
        col.remove_row(eid(1));
        assert_eq!(col.entity_ids(), vec![eid(3), eid(2)]);
    }

    #[test]
    fn serialize_skips_dead_entities() {
        let mut col = Column::<Pos>::new();
        col.rows.insert(eid(0), Pos { x: 1.0, y: 2.0 });
        col.rows.insert(eid(1), Pos { x: 3.0, y: 4.0 });
        let alive: HashSet<EntityId> = [eid(0)].into_iter().collect();
        let rows = col.serialize_rows(&alive).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows["0"], serde_json::json!({"x": 1.0, "y": 2.0}));
    }

    #[test]
    fn insert_value_replaces_existing_row() {
        let mut col = Column::<Pos>::new();
        col.insert_value(eid(0), &serde_json::json!({"x": 1.0, "y": 2.0}))
            .unwrap();
        col.insert_value(eid(0), &serde_json::json!({"x": 9.0, "y": 9.0}))
            .unwrap();
        assert_eq!(col.rows[&eid(0)], Pos { x: 9.0, y: 9.0 });
    }

    #[test]
    fn insert_value_rejects_wrong_shape() {
        let mut col = Column::<Pos>::new();
        let err = col
            .insert_value(eid(0), &serde_json::json!({"x": "not a number"}))
            .unwrap_err();
        assert!(matches!(err, EcsError::Deserialize { .. }));
    }

    #[test]
    fn write_field_updates_numeric_fields_only() {
        let mut col = Column::<Pos>::new();
        col.rows.insert(eid(0), Pos { x: 0.0, y: 0.0 });
        assert!(col.write_field_f64(eid(0), "x", 5.5));
        assert_eq!(col.rows[&eid(0)].x, 5.5);
        assert!(!col.write_field_f64(eid(0), "missing", 1.0));
        assert!(!col.write_field_f64(eid(1), "x", 1.0));
    }
}
