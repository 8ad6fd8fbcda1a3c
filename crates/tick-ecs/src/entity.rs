//! Entity identifiers and allocation.
//!
//! An [`EntityId`] is an opaque `u64` handle. IDs are handed out from a
//! monotonically increasing counter and are **never reused**: despawning an
//! entity retires its ID forever, so a stale handle can always be detected by
//! an aliveness check. The counter is part of the world snapshot so that
//! spawns after a restore do not collide with pre-snapshot IDs.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// An opaque entity identifier. Carries no intrinsic data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates [`EntityId`]s and tracks the alive set.
///
/// Unlike a generational allocator there is no free list: IDs increase
/// monotonically and a retired ID is never handed out again.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next_id: u64,
    alive: HashSet<EntityId>,
}

impl EntityAllocator {
    /// Create a new, empty allocator.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            alive: HashSet::new(),
        }
    }

    /// Allocate a fresh [`EntityId`] and mark it alive.
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.alive.insert(id);
        id
    }

    /// Retire an entity. Idempotent: returns `false` if it was already dead.
    pub fn deallocate(&mut self, id: EntityId) -> bool {
        self.alive.remove(&id)
    }

    /// Whether `id` refers to a currently alive entity.
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.alive.contains(&id)
    }

    /// Number of currently alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive.len()
    }

    /// All alive IDs in ascending order.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.alive.iter().copied().collect();
        ids.sort();
        ids
    }

    /// The next ID that will be handed out.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Restore the allocator from snapshot data.
    ///
    /// `next_id` must be at least one past every alive ID; snapshot
    /// validation happens at the world level.
    pub fn restore(next_id: u64, alive: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            next_id,
            alive: alive.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
