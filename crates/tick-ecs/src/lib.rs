//! Tick ECS -- entity/component storage for the tick engine.
//!
//! Entities are opaque, never-reused integer IDs. Components are plain serde
//! records stored in per-type, insertion-ordered sparse columns and looked up
//! either statically (generic `get`/`attach`) or by stable name (the path
//! used by snapshot restore, blueprints, and tween field writes).
//!
//! # Quick Start
//!
//! ```
//! use tick_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f64, y: f64 }
//!
//! impl Component for Position {
//!     const NAME: &'static str = "demo.Position";
//! }
//!
//! let mut world = World::new();
//! let entity = world.spawn();
//! world.attach(entity, Position { x: 0.0, y: 0.0 }).unwrap();
//!
//! assert_eq!(world.get::<Position>(entity).unwrap(), &Position { x: 0.0, y: 0.0 });
//! ```

pub mod component;
pub mod entity;
pub mod query;
pub mod snapshot;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity is not alive. Distinct from a live entity missing a
    /// component.
    #[error("entity {0} is not alive")]
    DeadEntity(entity::EntityId),

    /// The entity is alive but holds no component of the requested type.
    #[error("entity {entity} has no '{component}' component")]
    MissingComponent {
        entity: entity::EntityId,
        component: &'static str,
    },

    /// A component name was referenced that has not been registered.
    #[error("component type '{0}' not registered")]
    UnknownComponent(String),

    /// Deserialization of a component value failed.
    #[error("failed to deserialize component '{component}': {details}")]
    Deserialize { component: String, details: String },

    /// Snapshot capture or restore failed.
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::Component;
    pub use crate::entity::EntityId;
    pub use crate::query::{AnyOf, Not, QueryFilter, QueryIter, QuerySpec};
    pub use crate::snapshot::WorldSnapshot;
    pub use crate::world::World;
    pub use crate::EcsError;
}
