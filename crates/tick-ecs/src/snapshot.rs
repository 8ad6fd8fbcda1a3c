//! World snapshot and restore support.
//!
//! A [`WorldSnapshot`] is a fully serializable value tree of the world state:
//! the alive entity set, the next-ID counter, and every component row keyed
//! by the component's stable name and the owning entity's decimal ID. Its
//! JSON projection is:
//!
//! ```json
//! {
//!   "entities": [0, 1, 4],
//!   "next_id": 5,
//!   "components": {
//!     "spatial.Pos2D": { "0": { "x": 1.0, "y": 2.0 } }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::{EntityAllocator, EntityId};
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// WorldSnapshot
// ---------------------------------------------------------------------------

/// A complete, serializable snapshot of the world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// All alive entity IDs, ascending.
    pub entities: Vec<u64>,
    /// The allocator counter, preserved so post-restore spawns do not
    /// collide with snapshotted IDs.
    pub next_id: u64,
    /// Component rows: stable type name -> decimal entity ID -> field map.
    /// Empty columns are omitted.
    pub components: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

// ---------------------------------------------------------------------------
// World snapshot/restore impl
// ---------------------------------------------------------------------------

impl World {
    /// Capture a snapshot of all alive entities and their components.
    ///
    /// # Errors
    ///
    /// Fails with [`EcsError::Snapshot`] if any component refuses to
    /// serialize; the world is left untouched.
    pub fn snapshot(&self) -> Result<WorldSnapshot, EcsError> {
        let alive: std::collections::HashSet<EntityId> =
            self.allocator.entities().into_iter().collect();

        let mut components = BTreeMap::new();
        for (type_id, column) in &self.columns {
            if column.is_empty() {
                continue;
            }
            let name = match self.type_names.get(type_id) {
                Some(name) => (*name).to_owned(),
                None => {
                    tracing::warn!("component column has no registered name; skipping in snapshot");
                    continue;
                }
            };
            let rows = column.serialize_rows(&alive)?;
            if !rows.is_empty() {
                components.insert(name, rows);
            }
        }

        Ok(WorldSnapshot {
            entities: self.allocator.entities().iter().map(|e| e.to_raw()).collect(),
            next_id: self.allocator.next_id(),
            components,
        })
    }

    /// Restore the world from a snapshot.
    ///
    /// All component types referenced by the snapshot must have been
    /// registered first (registration is not part of the snapshot). The
    /// world is cleared before anything is installed, so a failed restore
    /// leaves the world observably empty.
    ///
    /// # Errors
    ///
    /// [`EcsError::Snapshot`] for an unregistered type name or a malformed
    /// entity key; [`EcsError::Deserialize`] for a component value that does
    /// not match its type's schema.
    pub fn restore(&mut self, snapshot: &WorldSnapshot) -> Result<(), EcsError> {
        self.clear_state();

        match self.install(snapshot) {
            Ok(()) => Ok(()),
            Err(err) => {
                // Leave nothing half-installed behind the error.
                self.clear_state();
                Err(err)
            }
        }
    }

    fn clear_state(&mut self) {
        self.allocator = EntityAllocator::new();
        for column in self.columns.values_mut() {
            column.clear();
        }
    }

    fn install(&mut self, snapshot: &WorldSnapshot) -> Result<(), EcsError> {
        self.allocator = EntityAllocator::restore(
            snapshot.next_id,
            snapshot.entities.iter().map(|&raw| EntityId::from_raw(raw)),
        );

        for (type_name, rows) in &snapshot.components {
            let type_id = self.type_id_of(type_name).ok_or_else(|| {
                EcsError::Snapshot(format!("unregistered component type: '{type_name}'"))
            })?;
            // Rebuild rows in ascending entity-ID order so query iteration
            // is deterministic after restore. The decimal keys would sort
            // lexicographically ("10" < "2") otherwise.
            let mut parsed: Vec<(u64, &serde_json::Value)> = Vec::with_capacity(rows.len());
            for (entity_key, value) in rows {
                let raw: u64 = entity_key.parse().map_err(|_| {
                    EcsError::Snapshot(format!(
                        "malformed entity key '{entity_key}' in component '{type_name}'"
                    ))
                })?;
                parsed.push((raw, value));
            }
            parsed.sort_by_key(|(raw, _)| *raw);

            let factory = self.factories[&type_id];
            let column = self.columns.entry(type_id).or_insert_with(factory);
            for (raw, value) in parsed {
                column.insert_value(EntityId::from_raw(raw), value)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f64,
        y: f64,
    }

    impl Component for Pos {
        const NAME: &'static str = "test.Pos";
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health {
        hp: u32,
    }

    impl Component for Health {
        const NAME: &'static str = "test.Health";
    }

    fn build_world() -> (World, EntityId, EntityId) {
        let mut world = World::new();
        let a = world.spawn();
        let b = world.spawn();
        world.attach(a, Pos { x: 1.0, y: 2.0 }).unwrap();
        world.attach(a, Health { hp: 10 }).unwrap();
        world.attach(b, Pos { x: 3.0, y: 4.0 }).unwrap();
        (world, a, b)
    }

    #[test]
    fn snapshot_includes_only_alive_entities() {
        let (mut world, a, b) = build_world();
        world.despawn(b);
        let snap = world.snapshot().unwrap();
        assert_eq!(snap.entities, vec![a.to_raw()]);
        assert!(!snap.components["test.Pos"].contains_key(&b.to_raw().to_string()));
    }

    #[test]
    fn snapshot_preserves_next_id() {
        let (world, _, _) = build_world();
        let snap = world.snapshot().unwrap();
        assert_eq!(snap.next_id, 2);
    }

    #[test]
    fn roundtrip_restores_exact_state() {
        let (world, a, b) = build_world();
        let snap = world.snapshot().unwrap();

        let mut fresh = World::new();
        fresh.register_component::<Pos>();
        fresh.register_component::<Health>();
        fresh.restore(&snap).unwrap();

        assert_eq!(fresh.get::<Pos>(a).unwrap(), &Pos { x: 1.0, y: 2.0 });
        assert_eq!(fresh.get::<Health>(a).unwrap(), &Health { hp: 10 });
        assert_eq!(fresh.get::<Pos>(b).unwrap(), &Pos { x: 3.0, y: 4.0 });
        assert_eq!(fresh.snapshot().unwrap(), snap);
    }

    #[test]
    fn spawns_after_restore_do_not_collide() {
        let (world, a, b) = build_world();
        let snap = world.snapshot().unwrap();

        let mut fresh = World::new();
        fresh.register_component::<Pos>();
        fresh.register_component::<Health>();
        fresh.restore(&snap).unwrap();
        let c = fresh.spawn();
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert_eq!(c.to_raw(), 2);
    }

    #[test]
    fn restore_with_unregistered_type_fails_and_leaves_world_empty() {
        let (world, _, _) = build_world();
        let snap = world.snapshot().unwrap();

        let mut fresh = World::new();
        fresh.register_component::<Pos>(); // Health missing
        let err = fresh.restore(&snap).unwrap_err();
        match err {
            EcsError::Snapshot(msg) => assert!(msg.contains("test.Health")),
            other => panic!("expected Snapshot error, got {other:?}"),
        }
        assert_eq!(fresh.entity_count(), 0);
        assert!(fresh.entities().is_empty());
    }

    #[test]
    fn restore_replaces_prior_contents() {
        let (world, _, _) = build_world();
        let snap = world.snapshot().unwrap();

        let mut other = World::new();
        other.register_component::<Pos>();
        other.register_component::<Health>();
        let stale = other.spawn();
        other.attach(stale, Pos { x: 99.0, y: 99.0 }).unwrap();

        other.restore(&snap).unwrap();
        assert_eq!(other.snapshot().unwrap(), snap);
    }

    #[test]
    fn json_roundtrip_of_snapshot() {
        let (world, _, _) = build_world();
        let snap = world.snapshot().unwrap();
        let text = serde_json::to_string(&snap).unwrap();
        let back: WorldSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snap);
    }
}
