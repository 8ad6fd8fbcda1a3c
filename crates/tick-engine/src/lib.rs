//! Tick Engine -- a deterministic, fixed-timestep simulation kernel and the
//! extension subsystems it composes.
//!
//! The [`Engine`](engine::Engine) drives a [`World`](tick_ecs::world::World)
//! forward in equal-duration ticks, running an ordered pipeline of systems
//! against the world with a per-tick [`TickContext`](clock::TickContext).
//! Two runs with identical inputs and seed produce byte-identical
//! observable state: system order is fixed, every random draw flows through
//! the one seeded PCG-64, and the whole engine round-trips through a JSON
//! value tree ([`snapshot`](engine::Engine::snapshot) /
//! [`restore`](engine::Engine::restore)).
//!
//! The extension subsystems -- signals, timers, tweens, FSMs, world events,
//! abilities, commands, resources, blueprints, AI, and the LLM layer -- are
//! embedder-owned registries shared into system factories; none of them
//! knows about the others, and all of them share the engine clock and RNG.
//!
//! # Quick Start
//!
//! ```
//! use tick_engine::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Counter { value: i64 }
//!
//! impl Component for Counter {
//!     const NAME: &'static str = "demo.Counter";
//! }
//!
//! let mut engine = Engine::new(20, Some(42)).unwrap();
//! let entity = engine.world_mut().spawn();
//! engine.world_mut().attach(entity, Counter { value: 0 }).unwrap();
//!
//! engine.add_system("count", move |world, ctx| {
//!     world.get_mut::<Counter>(entity)?.value += ctx.random_range(1..=10);
//!     Ok(())
//! });
//!
//! engine.run(10).unwrap();
//! assert!(engine.world().get::<Counter>(entity).unwrap().value >= 10);
//! ```
//!
//! # Determinism and snapshots
//!
//! Snapshots embed the serialized RNG state as an opaque byte list; they are
//! replayable only by an implementation whose PRNG is bit-compatible with
//! PCG-64 (`rand_pcg::Pcg64`). Snapshot and restore must happen between
//! ticks, never from inside a system.

pub mod ability;
pub mod ai;
pub mod atlas;
pub mod blueprint;
pub mod clock;
pub mod command;
pub mod coordinator;
pub mod engine;
pub mod event;
pub mod fsm;
pub mod llm;
pub mod resource;
pub mod schedule;
pub mod signal;
pub mod snapshot;
pub mod tween;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by the engine and its subsystems.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An ECS operation failed.
    #[error(transparent)]
    Ecs(#[from] tick_ecs::EcsError),

    /// Snapshot capture or restore failed: version mismatch, tps mismatch,
    /// unregistered component type, or malformed value tree.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// A registry lookup used a name that was never registered.
    #[error("unknown {kind} name: '{name}'")]
    UnknownName { kind: &'static str, name: String },

    /// A command was drained with no handler registered for its type.
    #[error("no handler registered for command type '{0}'")]
    NoHandler(String),

    /// A constructor argument was rejected.
    #[error("bad input: {0}")]
    BadInput(String),

    /// A failure inside the LLM layer that escaped its catch-and-cooldown
    /// handling (e.g. submitting without a client).
    #[error("llm error: {0}")]
    Llm(String),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use tick_ecs::prelude::*;

    pub use crate::ability::{
        ability_system, AbilityDef, AbilityGuards, AbilityHooks, AbilityManager, AbilityState,
    };
    pub use crate::ai::{
        bt_system, utility_system, AiManager, BehaviorTree, Blackboard, Node, ParallelPolicy,
        RepeatPolicy, Status, UtilityAgent,
    };
    pub use crate::atlas::{CellDef, CellMap, Grid2D, Pos2D, SpatialIndex};
    pub use crate::blueprint::{BlueprintRecipe, BlueprintRegistry};
    pub use crate::clock::{Clock, TickContext, TickDuration};
    pub use crate::command::{
        command_system, expand_footprint, resolve_footprint, CommandQueue, FootprintShape,
    };
    pub use crate::coordinator::{bridge_signals, EventLog, SnapshotCoordinator};
    pub use crate::engine::{Engine, System};
    pub use crate::event::{
        event_system, ActiveEvent, CycleDef, EventDef, EventGuards, EventHooks, EventScheduler,
    };
    pub use crate::fsm::{fsm_system, Fsm, FsmGuards};
    pub use crate::llm::{
        llm_system, pressure_system, LlmAgent, LlmClient, LlmConfig, LlmError, LlmHooks,
        LlmManager, MockClient, PressureThresholds,
    };
    pub use crate::resource::{
        can_craft, craft, decay_system, Inventory, Recipe, ResourceDef, ResourceRegistry,
    };
    pub use crate::schedule::{periodic_system, timer_system, Periodic, Timer};
    pub use crate::signal::{signal_system, SignalBus, SignalData};
    pub use crate::snapshot::{EngineSnapshot, SNAPSHOT_VERSION};
    pub use crate::tween::{tween_system, Tween};
    pub use crate::EngineError;
}
