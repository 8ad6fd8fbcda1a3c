//! Engine-level snapshot and restore.
//!
//! An [`EngineSnapshot`] packages the world snapshot with the clock, seed,
//! and serialized RNG state. Its JSON projection is the canonical value
//! tree:
//!
//! ```json
//! {
//!   "version": 1,
//!   "tick_number": 10,
//!   "tps": 20,
//!   "seed": 42,
//!   "rng_state": [12, 0, 255, ...],
//!   "world": { "entities": [...], "next_id": 3, "components": {...} }
//! }
//! ```
//!
//! The RNG state is the bincode encoding of the PCG-64 generator, stored as
//! an opaque byte list: replaying it requires a bit-compatible PCG-64.
//! Unknown sibling keys (e.g. the coordinator's `colony` block) are ignored
//! on restore.

use serde::{Deserialize, Serialize};
use tick_ecs::snapshot::WorldSnapshot;

use crate::engine::Engine;
use crate::EngineError;

/// Snapshot format version understood by this implementation.
pub const SNAPSHOT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// EngineSnapshot
// ---------------------------------------------------------------------------

/// A serializable snapshot of the full engine state, sufficient for exact
/// restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Format version; restore rejects anything but [`SNAPSHOT_VERSION`].
    pub version: u32,
    /// Tick counter at capture time.
    pub tick_number: u64,
    /// Ticks per second. Part of the simulation identity: restore rejects a
    /// mismatch.
    pub tps: u32,
    /// The seed the RNG was originally created from.
    pub seed: u64,
    /// Opaque serialized PCG-64 state.
    pub rng_state: Vec<u8>,
    /// Complete world state.
    pub world: WorldSnapshot,
}

// ---------------------------------------------------------------------------
// Engine snapshot/restore methods
// ---------------------------------------------------------------------------

impl Engine {
    /// Capture a snapshot of the engine state.
    ///
    /// Systems, hooks, and embedder-owned registries are not part of the
    /// snapshot; re-register them on the restoring side. Must be called
    /// between ticks.
    ///
    /// # Errors
    ///
    /// [`EngineError::Snapshot`] if any component or the RNG state refuses
    /// to serialize.
    pub fn snapshot(&self) -> Result<EngineSnapshot, EngineError> {
        let world = self
            .world
            .snapshot()
            .map_err(|e| EngineError::Snapshot(e.to_string()))?;
        let rng_state =
            bincode::serde::encode_to_vec(&*self.rng.borrow(), bincode::config::standard())
                .map_err(|e| EngineError::Snapshot(format!("rng state: {e}")))?;
        Ok(EngineSnapshot {
            version: SNAPSHOT_VERSION,
            tick_number: self.clock.tick_number(),
            tps: self.clock.tps(),
            seed: self.seed,
            rng_state,
            world,
        })
    }

    /// Restore the engine from a snapshot.
    ///
    /// Version, tps, and RNG state are validated before anything is touched.
    /// The world restore clears first, so a failure there (an unregistered
    /// component type) surfaces a [`EngineError::Snapshot`] and leaves the
    /// world observably empty. Must be called between ticks.
    pub fn restore(&mut self, snapshot: &EngineSnapshot) -> Result<(), EngineError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::Snapshot(format!(
                "unsupported snapshot version {}, expected {SNAPSHOT_VERSION}",
                snapshot.version
            )));
        }
        if snapshot.tps != self.clock.tps() {
            return Err(EngineError::Snapshot(format!(
                "tps mismatch: snapshot has {}, engine has {}",
                snapshot.tps,
                self.clock.tps()
            )));
        }
        let (rng, _): (rand_pcg::Pcg64, usize) =
            bincode::serde::decode_from_slice(&snapshot.rng_state, bincode::config::standard())
                .map_err(|e| EngineError::Snapshot(format!("rng state: {e}")))?;

        self.world
            .restore(&snapshot.world)
            .map_err(|e| EngineError::Snapshot(e.to_string()))?;

        self.clock.reset(snapshot.tick_number);
        self.seed = snapshot.seed;
        *self.rng.borrow_mut() = rng;
        tracing::debug!(tick = snapshot.tick_number, "engine restored from snapshot");
        Ok(())
    }

    /// BLAKE3 hex digest of the serialized snapshot. Cheap way for
    /// determinism tests to compare two engines for equal observable state.
    pub fn state_hash(&self) -> Result<String, EngineError> {
        let snapshot = self.snapshot()?;
        let bytes = serde_json::to_vec(&snapshot)
            .map_err(|e| EngineError::Snapshot(e.to_string()))?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tick_ecs::prelude::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Score {
        points: i64,
    }

    impl Component for Score {
        const NAME: &'static str = "test.Score";
    }

    fn seeded_engine() -> Engine {
        let mut engine = Engine::new(20, Some(42)).unwrap();
        let e = engine.world_mut().spawn();
        engine.world_mut().attach(e, Score { points: 5 }).unwrap();
        engine.add_system("grow", move |world, ctx| {
            world.get_mut::<Score>(e)?.points += ctx.random_range(1..=3);
            Ok(())
        });
        engine
    }

    #[test]
    fn snapshot_value_tree_shape() {
        let engine = seeded_engine();
        let value = serde_json::to_value(engine.snapshot().unwrap()).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["tps"], 20);
        assert_eq!(value["seed"], 42);
        assert!(value["rng_state"].is_array());
        assert!(value["world"]["components"]["test.Score"].is_object());
    }

    #[test]
    fn restore_roundtrip_reproduces_future() {
        let mut engine = seeded_engine();
        engine.run(10).unwrap();
        let snapshot = engine.snapshot().unwrap();

        engine.run(10).unwrap();
        let hash_a = engine.state_hash().unwrap();

        engine.restore(&snapshot).unwrap();
        assert_eq!(engine.clock().tick_number(), 10);
        engine.run(10).unwrap();
        let hash_b = engine.state_hash().unwrap();

        assert_eq!(hash_a, hash_b);
    }

    #[test]
    fn version_mismatch_rejected() {
        let mut engine = seeded_engine();
        let mut snapshot = engine.snapshot().unwrap();
        snapshot.version = 99;
        assert!(matches!(
            engine.restore(&snapshot),
            Err(EngineError::Snapshot(_))
        ));
    }

    #[test]
    fn tps_mismatch_rejected() {
        let engine = seeded_engine();
        let snapshot = engine.snapshot().unwrap();
        let mut other = Engine::new(30, Some(42)).unwrap();
        other.world_mut().register_component::<Score>();
        assert!(matches!(
            other.restore(&snapshot),
            Err(EngineError::Snapshot(_))
        ));
    }

    #[test]
    fn unregistered_component_leaves_world_empty() {
        let mut engine = seeded_engine();
        engine.run(3).unwrap();
        let snapshot = engine.snapshot().unwrap();

        let mut fresh = Engine::new(20, Some(42)).unwrap();
        let err = fresh.restore(&snapshot).unwrap_err();
        match err {
            EngineError::Snapshot(msg) => assert!(msg.contains("test.Score")),
            other => panic!("expected Snapshot error, got {other}"),
        }
        assert_eq!(fresh.world().entity_count(), 0);
    }

    #[test]
    fn snapshot_json_roundtrip() {
        let mut engine = seeded_engine();
        engine.run(4).unwrap();
        let snapshot = engine.snapshot().unwrap();
        let text = serde_json::to_string(&snapshot).unwrap();
        let back: EngineSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn unknown_sibling_keys_are_ignored() {
        let mut engine = seeded_engine();
        engine.run(2).unwrap();
        let mut value = serde_json::to_value(engine.snapshot().unwrap()).unwrap();
        value["colony"] = serde_json::json!({"grid": {"width": 4, "height": 4}});
        let parsed: EngineSnapshot = serde_json::from_value(value).unwrap();
        let mut fresh = Engine::new(20, Some(1)).unwrap();
        fresh.world_mut().register_component::<Score>();
        fresh.restore(&parsed).unwrap();
        assert_eq!(fresh.clock().tick_number(), 2);
    }
}
