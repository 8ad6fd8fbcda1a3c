//! Tuple queries and query filters.
//!
//! A query is parameterized by a tuple of component types and yields
//! `(EntityId, (&C1, &C2, ...))` for every alive entity holding all of them:
//!
//! ```
//! # use tick_ecs::prelude::*;
//! # #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! # struct Pos { x: f64 }
//! # impl Component for Pos { const NAME: &'static str = "doc.Pos"; }
//! # #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! # struct Vel { dx: f64 }
//! # impl Component for Vel { const NAME: &'static str = "doc.Vel"; }
//! let mut world = World::new();
//! let e = world.spawn();
//! world.attach(e, Pos { x: 0.0 }).unwrap();
//! world.attach(e, Vel { dx: 1.0 }).unwrap();
//! for (entity, (pos, vel)) in world.query::<(Pos, Vel)>() {
//!     assert_eq!((pos.x, vel.dx), (0.0, 1.0));
//! }
//! ```
//!
//! Iteration order is the insertion order of the *first* listed component
//! type. Filters ([`Not`], [`AnyOf`]) constrain the result set without
//! binding a component reference; probe with `has`/`get` if the data is
//! needed.

use std::any::TypeId;
use std::marker::PhantomData;

use crate::component::Component;
use crate::entity::EntityId;
use crate::world::World;

// ---------------------------------------------------------------------------
// QuerySpec -- tuples of component types
// ---------------------------------------------------------------------------

/// A tuple of component types fetched together by a query.
pub trait QuerySpec {
    /// The borrowed item yielded per entity.
    type Item<'w>;

    /// The type whose column drives iteration order.
    fn primary() -> TypeId;

    /// Fetch every component for `entity`, or `None` if any is missing.
    fn fetch(world: &World, entity: EntityId) -> Option<Self::Item<'_>>;
}

macro_rules! impl_query_spec {
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: Component $(, $rest: Component)*> QuerySpec for ($first, $($rest,)*) {
            type Item<'w> = (&'w $first, $(&'w $rest,)*);

            fn primary() -> TypeId {
                TypeId::of::<$first>()
            }

            fn fetch(world: &World, entity: EntityId) -> Option<Self::Item<'_>> {
                Some((
                    world.peek::<$first>(entity)?,
                    $(world.peek::<$rest>(entity)?,)*
                ))
            }
        }
    };
}

impl_query_spec!(A);
impl_query_spec!(A, B);
impl_query_spec!(A, B, C);
impl_query_spec!(A, B, C, D);

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// A predicate over candidate entities, evaluated after the aliveness check.
pub trait QueryFilter {
    fn matches(world: &World, entity: EntityId) -> bool;
}

/// Exclude entities holding `T`.
pub struct Not<T: Component>(PhantomData<T>);

impl<T: Component> QueryFilter for Not<T> {
    fn matches(world: &World, entity: EntityId) -> bool {
        !world.peek_has::<T>(entity)
    }
}

/// Include entities holding at least one of the listed types. Binds no
/// component reference.
pub struct AnyOf<T>(PhantomData<T>);

macro_rules! impl_any_of {
    ($($t:ident),+) => {
        impl<$($t: Component),+> QueryFilter for AnyOf<($($t,)+)> {
            fn matches(world: &World, entity: EntityId) -> bool {
                $(world.peek_has::<$t>(entity))||+
            }
        }
    };
}

impl_any_of!(A, B);
impl_any_of!(A, B, C);
impl_any_of!(A, B, C, D);

impl QueryFilter for () {
    fn matches(_world: &World, _entity: EntityId) -> bool {
        true
    }
}

macro_rules! impl_filter_tuple {
    ($($f:ident),+) => {
        impl<$($f: QueryFilter),+> QueryFilter for ($($f,)+) {
            fn matches(world: &World, entity: EntityId) -> bool {
                $($f::matches(world, entity))&&+
            }
        }
    };
}

impl_filter_tuple!(F1);
impl_filter_tuple!(F1, F2);
impl_filter_tuple!(F1, F2, F3);

// ---------------------------------------------------------------------------
// QueryIter
// ---------------------------------------------------------------------------

/// Iterator over a query's matches.
///
/// The candidate list is snapshotted from the primary column up front, so the
/// iterator is insulated from purged rows; dead entities are still filtered
/// per item.
pub struct QueryIter<'w, Q: QuerySpec, F: QueryFilter = ()> {
    world: &'w World,
    candidates: std::vec::IntoIter<EntityId>,
    _marker: PhantomData<(Q, F)>,
}

impl<'w, Q: QuerySpec, F: QueryFilter> QueryIter<'w, Q, F> {
    pub(crate) fn new(world: &'w World, candidates: Vec<EntityId>) -> Self {
        Self {
            world,
            candidates: candidates.into_iter(),
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: QuerySpec, F: QueryFilter> Iterator for QueryIter<'w, Q, F> {
    type Item = (EntityId, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        for entity in self.candidates.by_ref() {
            if !self.world.alive(entity) {
                continue;
            }
            if !F::matches(self.world, entity) {
                continue;
            }
            if let Some(item) = Q::fetch(self.world, entity) {
                return Some((entity, item));
            }
        }
        None
    }
}
