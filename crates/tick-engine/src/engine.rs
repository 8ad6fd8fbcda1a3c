//! Engine -- core loop, pacing, and lifecycle hooks.
//!
//! The [`Engine`] owns the world, the clock, the seeded RNG, and an ordered
//! list of systems. Each tick it advances the clock, builds a
//! [`TickContext`], and invokes every system in insertion order with
//! exclusive access to the world. Because system ordering is fixed and all
//! randomness flows through the one seeded RNG, two runs with the same seed,
//! systems, and inputs produce byte-identical snapshots.
//!
//! # Example
//!
//! ```
//! use tick_engine::prelude::*;
//!
//! let mut engine = Engine::new(20, Some(42)).unwrap();
//! engine.add_system("noop", |_world, _ctx| Ok(()));
//! engine.run(10).unwrap();
//! assert_eq!(engine.clock().tick_number(), 10);
//! ```

use std::cell::{Cell, RefCell};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_pcg::Pcg64;
use tick_ecs::world::World;

use crate::clock::{Clock, TickContext};
use crate::EngineError;

// ---------------------------------------------------------------------------
// System and hook types
// ---------------------------------------------------------------------------

/// A system: invoked once per tick with exclusive world access. An error
/// aborts the tick and propagates out of `step`/`run`/`run_forever`.
pub type System = Box<dyn FnMut(&mut World, &TickContext<'_>) -> Result<(), EngineError>>;

/// A lifecycle hook, fired by `run`/`run_forever` before the first tick and
/// after the last.
pub type LifecycleHook = Box<dyn FnMut(&mut World, &TickContext<'_>)>;

struct NamedSystem {
    name: String,
    func: System,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The fixed-timestep simulation engine.
///
/// The RNG is a PCG-64 (`rand_pcg::Pcg64`) seeded at construction; its state
/// travels with snapshots, so a snapshot is only replayable by an
/// implementation with a bit-compatible PCG-64.
pub struct Engine {
    pub(crate) clock: Clock,
    pub(crate) world: World,
    systems: Vec<NamedSystem>,
    start_hooks: Vec<LifecycleHook>,
    stop_hooks: Vec<LifecycleHook>,
    stop: Cell<bool>,
    pub(crate) seed: u64,
    pub(crate) rng: RefCell<Pcg64>,
}

impl Engine {
    /// Create an engine at `tps` ticks per second. `None` seeds from
    /// entropy; pass a seed for reproducible runs.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] when `tps` is zero.
    pub fn new(tps: u32, seed: Option<u64>) -> Result<Self, EngineError> {
        let clock = Clock::new(tps)?;
        let seed = seed.unwrap_or_else(rand::random);
        Ok(Self {
            clock,
            world: World::new(),
            systems: Vec::new(),
            start_hooks: Vec::new(),
            stop_hooks: Vec::new(),
            stop: Cell::new(false),
            seed,
            rng: RefCell::new(Pcg64::seed_from_u64(seed)),
        })
    }

    // -- accessors ----------------------------------------------------------

    /// Read-only world access.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access, for setup and tests between ticks.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The clock.
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// The seed this engine's RNG was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Names of all registered systems, in execution order.
    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.name.as_str()).collect()
    }

    // -- registration -------------------------------------------------------

    /// Append a system to the pipeline. Insertion order is execution order.
    pub fn add_system(
        &mut self,
        name: &str,
        system: impl FnMut(&mut World, &TickContext<'_>) -> Result<(), EngineError> + 'static,
    ) {
        self.systems.push(NamedSystem {
            name: name.to_owned(),
            func: Box::new(system),
        });
    }

    /// Append a boxed system produced by a factory.
    pub fn add_boxed_system(&mut self, name: &str, system: System) {
        self.systems.push(NamedSystem {
            name: name.to_owned(),
            func: system,
        });
    }

    /// Append a start hook. Fired once per `run`/`run_forever`, with
    /// `tick_number == 0` on a fresh engine. `step` never fires hooks.
    pub fn on_start(&mut self, hook: impl FnMut(&mut World, &TickContext<'_>) + 'static) {
        self.start_hooks.push(Box::new(hook));
    }

    /// Append a stop hook. Fired after a normal or requested exit; skipped
    /// when a system error aborts the run.
    pub fn on_stop(&mut self, hook: impl FnMut(&mut World, &TickContext<'_>) + 'static) {
        self.stop_hooks.push(Box::new(hook));
    }

    // -- tick loop ----------------------------------------------------------

    fn tick(&mut self) -> Result<(), EngineError> {
        self.clock.advance();
        let ctx = self.clock.context(&self.stop, &self.rng);
        for system in &mut self.systems {
            if let Err(err) = (system.func)(&mut self.world, &ctx) {
                tracing::error!(system = %system.name, error = %err, "system failed; tick aborted");
                return Err(err);
            }
            if self.stop.get() {
                break;
            }
        }
        Ok(())
    }

    /// Advance exactly one tick. Does not fire lifecycle hooks.
    pub fn step(&mut self) -> Result<(), EngineError> {
        self.stop.set(false);
        self.tick()
    }

    /// Fire start hooks, run up to `n` ticks (stopping early on
    /// `request_stop`), then fire stop hooks.
    pub fn run(&mut self, n: u64) -> Result<(), EngineError> {
        self.stop.set(false);
        self.fire_hooks(HookKind::Start);

        for _ in 0..n {
            self.tick()?;
            if self.stop.get() {
                break;
            }
        }

        self.fire_hooks(HookKind::Stop);
        Ok(())
    }

    /// Run until `request_stop`, sleeping out the remainder of each tick's
    /// `dt` so simulated time tracks wall time. Catch-up for slow ticks is
    /// out of scope; a late tick simply starts the next one immediately.
    pub fn run_forever(&mut self) -> Result<(), EngineError> {
        self.stop.set(false);
        self.fire_hooks(HookKind::Start);

        let dt = Duration::from_secs_f64(self.clock.dt());
        loop {
            let started = Instant::now();
            self.tick()?;
            if self.stop.get() {
                break;
            }
            let spent = started.elapsed();
            if spent < dt {
                std::thread::sleep(dt - spent);
            }
        }

        self.fire_hooks(HookKind::Stop);
        Ok(())
    }

    fn fire_hooks(&mut self, kind: HookKind) {
        let ctx = self.clock.context(&self.stop, &self.rng);
        let hooks = match kind {
            HookKind::Start => &mut self.start_hooks,
            HookKind::Stop => &mut self.stop_hooks,
        };
        for hook in hooks {
            hook(&mut self.world, &ctx);
        }
    }
}

enum HookKind {
    Start,
    Stop,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
