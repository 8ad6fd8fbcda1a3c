//! Property tests for world invariants under random operation sequences.

use proptest::prelude::*;
use tick_ecs::prelude::*;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Marker {
    tag: u32,
}

impl Component for Marker {
    const NAME: &'static str = "prop.Marker";
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Extra {
    weight: f64,
}

impl Component for Extra {
    const NAME: &'static str = "prop.Extra";
}

/// A random world operation over a small entity pool.
#[derive(Debug, Clone)]
enum Op {
    Spawn,
    Despawn(usize),
    AttachMarker(usize, u32),
    AttachExtra(usize, f64),
    DetachMarker(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Spawn),
        (0usize..8).prop_map(Op::Despawn),
        ((0usize..8), any::<u32>()).prop_map(|(i, tag)| Op::AttachMarker(i, tag)),
        ((0usize..8), -100.0f64..100.0).prop_map(|(i, w)| Op::AttachExtra(i, w)),
        (0usize..8).prop_map(Op::DetachMarker),
    ]
}

fn apply(world: &mut World, pool: &mut Vec<EntityId>, op: &Op) {
    match op {
        Op::Spawn => pool.push(world.spawn()),
        Op::Despawn(i) => {
            if let Some(&e) = pool.get(*i) {
                world.despawn(e);
            }
        }
        Op::AttachMarker(i, tag) => {
            if let Some(&e) = pool.get(*i) {
                let _ = world.attach(e, Marker { tag: *tag });
            }
        }
        Op::AttachExtra(i, weight) => {
            if let Some(&e) = pool.get(*i) {
                let _ = world.attach(e, Extra { weight: *weight });
            }
        }
        Op::DetachMarker(i) => {
            if let Some(&e) = pool.get(*i) {
                let _ = world.detach::<Marker>(e);
            }
        }
    }
}

proptest! {
    /// has(e, T) and get(e, T) always agree, and queries only yield alive
    /// entities that get can also see.
    #[test]
    fn has_get_and_query_agree(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let mut world = World::new();
        world.register_component::<Marker>();
        world.register_component::<Extra>();
        let mut pool = Vec::new();

        for op in &ops {
            apply(&mut world, &mut pool, op);
        }

        for &e in &pool {
            let has = world.has::<Marker>(e);
            let get = world.get::<Marker>(e);
            prop_assert_eq!(has, get.is_ok());
            if !world.alive(e) {
                prop_assert!(matches!(world.get::<Marker>(e), Err(EcsError::DeadEntity(_))));
            }
        }

        for (e, (marker,)) in world.query::<(Marker,)>() {
            prop_assert!(world.alive(e));
            prop_assert_eq!(world.get::<Marker>(e).unwrap(), marker);
        }
    }

    /// Snapshots round-trip exactly for any reachable world state.
    #[test]
    fn snapshot_roundtrip_is_identity(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let mut world = World::new();
        world.register_component::<Marker>();
        world.register_component::<Extra>();
        let mut pool = Vec::new();
        for op in &ops {
            apply(&mut world, &mut pool, op);
        }

        let snapshot = world.snapshot().unwrap();
        let mut fresh = World::new();
        fresh.register_component::<Marker>();
        fresh.register_component::<Extra>();
        fresh.restore(&snapshot).unwrap();

        prop_assert_eq!(fresh.snapshot().unwrap(), snapshot);
        prop_assert_eq!(fresh.entities(), world.entities());
    }

    /// IDs never repeat, whatever the despawn pattern.
    #[test]
    fn entity_ids_are_never_reused(ops in proptest::collection::vec(op_strategy(), 0..60)) {
        let mut world = World::new();
        let mut pool = Vec::new();
        for op in &ops {
            apply(&mut world, &mut pool, op);
        }
        let mut raws: Vec<u64> = pool.iter().map(|e| e.to_raw()).collect();
        raws.sort_unstable();
        raws.dedup();
        prop_assert_eq!(raws.len(), pool.len());
    }
}
