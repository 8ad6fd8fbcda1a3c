//! Clock, per-tick context, and tick-duration specs.
//!
//! The [`Clock`] owns the tick counter and the derived fixed timestep
//! `dt = 1 / tps`. Each tick it builds a [`TickContext`]: an immutable view
//! of the current tick handed to every system and lifecycle hook, carrying
//! the stop-request flag and a handle to the single engine RNG.

use std::cell::{Cell, RefCell};
use std::ops::RangeInclusive;

use rand::Rng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::EngineError;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Fixed-timestep clock. `dt` is derived from `tps`, never set directly.
#[derive(Debug)]
pub struct Clock {
    tps: u32,
    dt: f64,
    tick_number: u64,
}

impl Clock {
    /// Create a clock running at `tps` ticks per simulated second.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] when `tps` is zero.
    pub fn new(tps: u32) -> Result<Self, EngineError> {
        if tps == 0 {
            return Err(EngineError::BadInput("tps must be positive".to_owned()));
        }
        Ok(Self {
            tps,
            dt: 1.0 / f64::from(tps),
            tick_number: 0,
        })
    }

    /// Ticks per second.
    pub fn tps(&self) -> u32 {
        self.tps
    }

    /// Seconds of simulated time per tick.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// The current tick number (0 before the first tick).
    pub fn tick_number(&self) -> u64 {
        self.tick_number
    }

    /// Advance by one tick and return the new tick number.
    pub fn advance(&mut self) -> u64 {
        self.tick_number += 1;
        self.tick_number
    }

    /// Build the per-tick context for the current tick number.
    pub fn context<'a>(&self, stop: &'a Cell<bool>, rng: &'a RefCell<Pcg64>) -> TickContext<'a> {
        TickContext {
            tick_number: self.tick_number,
            dt: self.dt,
            elapsed: self.tick_number as f64 * self.dt,
            stop,
            rng,
        }
    }

    /// Set the tick counter. Used by restore.
    pub fn reset(&mut self, tick_number: u64) {
        self.tick_number = tick_number;
    }
}

// ---------------------------------------------------------------------------
// TickContext
// ---------------------------------------------------------------------------

/// Immutable per-tick value passed to every system and hook.
///
/// `elapsed` is computed as `tick_number * dt` rather than accumulated, so
/// it never drifts. Randomness drawn through the context comes from the one
/// engine RNG; no subsystem seeds its own.
pub struct TickContext<'a> {
    /// Current tick number: 0 during start hooks, >= 1 during systems.
    pub tick_number: u64,
    /// Seconds of simulated time per tick.
    pub dt: f64,
    /// Simulated seconds since tick 0 (`tick_number * dt`).
    pub elapsed: f64,
    stop: &'a Cell<bool>,
    rng: &'a RefCell<Pcg64>,
}

impl TickContext<'_> {
    /// Ask the engine to stop. The current tick ends after the running
    /// system returns; `run`/`run_forever` exit before the next tick.
    pub fn request_stop(&self) {
        self.stop.set(true);
    }

    /// Uniform draw in `[0, 1)` from the engine RNG.
    pub fn random_f64(&self) -> f64 {
        self.rng.borrow_mut().gen::<f64>()
    }

    /// Uniform integer draw from an inclusive range.
    pub fn random_range(&self, range: RangeInclusive<i64>) -> i64 {
        self.rng.borrow_mut().gen_range(range)
    }

    /// Uniform `u32` draw from an inclusive range. Convenience for tick
    /// counts and durations.
    pub fn random_u32(&self, range: RangeInclusive<u32>) -> u32 {
        self.rng.borrow_mut().gen_range(range)
    }
}

// ---------------------------------------------------------------------------
// TickDuration
// ---------------------------------------------------------------------------

/// A duration in ticks: fixed, or sampled uniformly from an inclusive range
/// at resolution time. Shared by the event scheduler and ability manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickDuration {
    /// Exactly this many ticks.
    Fixed(u32),
    /// Uniform in `[min, max]`, drawn from the engine RNG when resolved.
    Range(u32, u32),
}

impl TickDuration {
    /// Resolve to a concrete tick count, drawing from the context RNG for
    /// ranges.
    pub fn resolve(&self, ctx: &TickContext<'_>) -> u32 {
        match *self {
            TickDuration::Fixed(ticks) => ticks,
            TickDuration::Range(lo, hi) => {
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                ctx.random_u32(lo..=hi)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
