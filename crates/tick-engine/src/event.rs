//! World-level event scheduler: timed events with guards, probability, and
//! cooldowns, plus repeating phase cycles (seasons, day/night).
//!
//! Evaluation order is definition order, and every random draw goes through
//! the shared engine RNG, so scheduling is fully deterministic for a given
//! seed and definition set.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tick_ecs::world::World;

use crate::clock::{TickContext, TickDuration};
use crate::engine::System;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Definitions and runtime state
// ---------------------------------------------------------------------------

/// Definition of a world-level event. Not serialized; re-register before
/// restore.
#[derive(Debug, Clone)]
pub struct EventDef {
    pub name: String,
    pub duration: TickDuration,
    /// Minimum ticks after the event ends before it may fire again.
    pub cooldown: u32,
    /// Per-evaluation activation chance in `[0, 1]`.
    pub probability: f64,
    /// Guard names; all must pass.
    pub conditions: Vec<String>,
}

impl EventDef {
    pub fn new(name: impl Into<String>, duration: TickDuration) -> Self {
        Self {
            name: name.into(),
            duration,
            cooldown: 0,
            probability: 1.0,
            conditions: Vec::new(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: u32) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn with_conditions(mut self, conditions: &[&str]) -> Self {
        self.conditions = conditions.iter().map(|s| (*s).to_owned()).collect();
        self
    }
}

/// Runtime state of a currently-running event. Serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveEvent {
    pub name: String,
    pub remaining: u32,
    pub started_at: u64,
}

/// Definition of a repeating phase cycle. Not serialized.
#[derive(Debug, Clone)]
pub struct CycleDef {
    pub name: String,
    /// Ordered `(phase_name, duration_ticks)` pairs.
    pub phases: Vec<(String, u32)>,
    /// Ticks before the first phase starts.
    pub delay: u32,
}

impl CycleDef {
    pub fn new(name: impl Into<String>, phases: &[(&str, u32)]) -> Self {
        Self {
            name: name.into(),
            phases: phases
                .iter()
                .map(|(phase, ticks)| ((*phase).to_owned(), *ticks))
                .collect(),
            delay: 0,
        }
    }

    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }
}

/// Runtime state of a cycle. `phase_index` is -1 while in the initial
/// delay; `remaining` counts down the delay or the current phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub name: String,
    pub phase_index: i32,
    pub remaining: u32,
}

// ---------------------------------------------------------------------------
// EventScheduler
// ---------------------------------------------------------------------------

/// Manages event definitions, active events, cycles, and cooldowns.
///
/// Owned by the embedder; shared into [`event_system`] via `Rc`.
#[derive(Default)]
pub struct EventScheduler {
    definitions: RefCell<IndexMap<String, EventDef>>,
    active: RefCell<IndexMap<String, ActiveEvent>>,
    cooldowns: RefCell<IndexMap<String, u32>>,
    cycle_defs: RefCell<IndexMap<String, CycleDef>>,
    cycle_states: RefCell<IndexMap<String, CycleState>>,
}

impl EventScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    // -- registration -------------------------------------------------------

    /// Register an event definition. Insertion order is evaluation order;
    /// redefining keeps the original position.
    pub fn define(&self, event: EventDef) {
        self.definitions.borrow_mut().insert(event.name.clone(), event);
    }

    /// Register a cycle definition and initialize its runtime state.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] for a cycle with no phases.
    pub fn define_cycle(&self, cycle: CycleDef) -> Result<(), EngineError> {
        if cycle.phases.is_empty() {
            return Err(EngineError::BadInput(format!(
                "cycle '{}' has no phases",
                cycle.name
            )));
        }
        let state = if cycle.delay > 0 {
            CycleState {
                name: cycle.name.clone(),
                phase_index: -1,
                remaining: cycle.delay,
            }
        } else {
            CycleState {
                name: cycle.name.clone(),
                phase_index: 0,
                remaining: cycle.phases[0].1,
            }
        };
        self.cycle_states.borrow_mut().insert(cycle.name.clone(), state);
        self.cycle_defs.borrow_mut().insert(cycle.name.clone(), cycle);
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Whether an event, or the currently indexed phase of any cycle, is
    /// active under this name.
    pub fn is_active(&self, name: &str) -> bool {
        if self.active.borrow().contains_key(name) {
            return true;
        }
        let defs = self.cycle_defs.borrow();
        self.cycle_states.borrow().values().any(|state| {
            state.phase_index >= 0
                && defs
                    .get(&state.name)
                    .and_then(|def| def.phases.get(state.phase_index as usize))
                    .map(|(phase, _)| phase == name)
                    .unwrap_or(false)
        })
    }

    /// Remaining ticks for an active event or cycle phase; 0 if inactive.
    pub fn time_remaining(&self, name: &str) -> u32 {
        if let Some(event) = self.active.borrow().get(name) {
            return event.remaining;
        }
        let defs = self.cycle_defs.borrow();
        for state in self.cycle_states.borrow().values() {
            if state.phase_index < 0 {
                continue;
            }
            let matches = defs
                .get(&state.name)
                .and_then(|def| def.phases.get(state.phase_index as usize))
                .map(|(phase, _)| phase == name)
                .unwrap_or(false);
            if matches {
                return state.remaining;
            }
        }
        0
    }

    /// All currently active non-cycle events, in definition order.
    pub fn active_events(&self) -> Vec<ActiveEvent> {
        self.active.borrow().values().cloned().collect()
    }

    /// Look up an event definition by name.
    pub fn definition(&self, name: &str) -> Option<EventDef> {
        self.definitions.borrow().get(name).cloned()
    }

    /// All defined event names in definition order.
    pub fn defined_events(&self) -> Vec<String> {
        self.definitions.borrow().keys().cloned().collect()
    }

    // -- internals used by the system ---------------------------------------

    fn activate(&self, name: &str, duration: u32, tick_number: u64) {
        self.active.borrow_mut().insert(
            name.to_owned(),
            ActiveEvent {
                name: name.to_owned(),
                remaining: duration,
                started_at: tick_number,
            },
        );
    }

    fn deactivate(&self, name: &str) {
        self.active.borrow_mut().shift_remove(name);
        let cooldown = self
            .definitions
            .borrow()
            .get(name)
            .map(|def| def.cooldown)
            .unwrap_or(0);
        if cooldown > 0 {
            self.cooldowns.borrow_mut().insert(name.to_owned(), cooldown);
        }
    }

    fn decrement_cooldowns(&self) {
        let mut cooldowns = self.cooldowns.borrow_mut();
        cooldowns.retain(|_, remaining| *remaining > 1);
        for remaining in cooldowns.values_mut() {
            *remaining -= 1;
        }
    }

    fn is_on_cooldown(&self, name: &str) -> bool {
        self.cooldowns.borrow().contains_key(name)
    }

    /// Advance one cycle by one tick. Returns `(ended_phase, started_phase)`.
    fn advance_cycle(&self, cycle_name: &str) -> (Option<String>, Option<String>) {
        let mut states = self.cycle_states.borrow_mut();
        let defs = self.cycle_defs.borrow();
        let (Some(state), Some(def)) = (states.get_mut(cycle_name), defs.get(cycle_name)) else {
            return (None, None);
        };

        if state.phase_index < 0 {
            // Initial delay.
            state.remaining = state.remaining.saturating_sub(1);
            if state.remaining == 0 {
                state.phase_index = 0;
                let (phase, duration) = &def.phases[0];
                state.remaining = *duration;
                return (None, Some(phase.clone()));
            }
            return (None, None);
        }

        state.remaining = state.remaining.saturating_sub(1);
        if state.remaining == 0 {
            let ended = def.phases[state.phase_index as usize].0.clone();
            state.phase_index = (state.phase_index + 1) % def.phases.len() as i32;
            let (started, duration) = &def.phases[state.phase_index as usize];
            state.remaining = *duration;
            return (Some(ended), Some(started.clone()));
        }

        (None, None)
    }

    // -- serialization ------------------------------------------------------

    /// Serialize runtime state (not definitions).
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "active_events": self.active.borrow().values().collect::<Vec<_>>(),
            "cooldowns": self.cooldowns.borrow().clone(),
            "cycles": self.cycle_states.borrow().values().collect::<Vec<_>>(),
        })
    }

    /// Restore runtime state. Definitions must be re-registered first;
    /// entries naming unknown cycles are dropped.
    ///
    /// # Errors
    ///
    /// [`EngineError::Snapshot`] for a malformed value tree.
    pub fn restore(&self, data: &serde_json::Value) -> Result<(), EngineError> {
        let malformed = |e: serde_json::Error| EngineError::Snapshot(format!("event scheduler: {e}"));

        let actives: Vec<ActiveEvent> = match data.get("active_events") {
            Some(value) => serde_json::from_value(value.clone()).map_err(malformed)?,
            None => Vec::new(),
        };
        let mut active = self.active.borrow_mut();
        active.clear();
        for event in actives {
            active.insert(event.name.clone(), event);
        }
        drop(active);

        let cooldowns: IndexMap<String, u32> = match data.get("cooldowns") {
            Some(value) => serde_json::from_value(value.clone()).map_err(malformed)?,
            None => IndexMap::new(),
        };
        *self.cooldowns.borrow_mut() = cooldowns;

        let cycles: Vec<CycleState> = match data.get("cycles") {
            Some(value) => serde_json::from_value(value.clone()).map_err(malformed)?,
            None => Vec::new(),
        };
        let mut states = self.cycle_states.borrow_mut();
        for state in cycles {
            if states.contains_key(&state.name) {
                states.insert(state.name.clone(), state);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Guard registry
// ---------------------------------------------------------------------------

type EventGuardFn = Box<dyn Fn(&World, &EventScheduler) -> bool>;

/// Named predicates `(world, scheduler) -> bool` gating event activation.
#[derive(Default)]
pub struct EventGuards {
    guards: RefCell<std::collections::HashMap<String, EventGuardFn>>,
}

impl EventGuards {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register a named guard. Overwrites if already registered.
    pub fn register(&self, name: &str, guard: impl Fn(&World, &EventScheduler) -> bool + 'static) {
        self.guards
            .borrow_mut()
            .insert(name.to_owned(), Box::new(guard));
    }

    /// Evaluate a guard.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] for a name that was never registered.
    pub fn check(
        &self,
        name: &str,
        world: &World,
        scheduler: &EventScheduler,
    ) -> Result<bool, EngineError> {
        let guards = self.guards.borrow();
        let guard = guards.get(name).ok_or_else(|| EngineError::UnknownName {
            kind: "guard",
            name: name.to_owned(),
        })?;
        Ok(guard(world, scheduler))
    }

    pub fn has(&self, name: &str) -> bool {
        self.guards.borrow().contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// System factory
// ---------------------------------------------------------------------------

/// Callbacks observed by the event system. All optional.
#[derive(Default)]
pub struct EventHooks {
    /// Fired when an event or cycle phase starts.
    pub on_start: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, &str)>>,
    /// Fired when an event or cycle phase ends.
    pub on_end: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, &str)>>,
    /// Fired each tick for every still-active event with its remaining ticks.
    pub on_tick: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, &str, u32)>>,
}

/// A system that processes world-level events each tick.
///
/// Tick execution order:
/// 1. Decrement active non-cycle events; expired ones deactivate, fire
///    `on_end`, and start their cooldown.
/// 2. Fire `on_tick` for every event still active.
/// 3. Advance every cycle (`on_end` for a finished phase, `on_start` for the
///    next; the phase index wraps).
/// 4. Decrement cooldown counters.
/// 5. Evaluate inactive events in definition order: skip ones that just
///    expired, are active, or are cooling down; require every guard to pass;
///    roll probability against the shared RNG; resolve duration and
///    activate (`on_start`).
pub fn event_system(
    scheduler: Rc<EventScheduler>,
    guards: Rc<EventGuards>,
    mut hooks: EventHooks,
) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        // 1. Decrement active events, collect expirations.
        let mut expired: Vec<String> = Vec::new();
        {
            let mut active = scheduler.active.borrow_mut();
            for (name, event) in active.iter_mut() {
                event.remaining = event.remaining.saturating_sub(1);
                if event.remaining == 0 {
                    expired.push(name.clone());
                }
            }
        }
        for name in &expired {
            scheduler.deactivate(name);
            if let Some(hook) = hooks.on_end.as_mut() {
                hook(world, ctx, name);
            }
        }

        // 2. Tick still-active events.
        if let Some(hook) = hooks.on_tick.as_mut() {
            let still_active: Vec<(String, u32)> = scheduler
                .active
                .borrow()
                .values()
                .map(|event| (event.name.clone(), event.remaining))
                .collect();
            for (name, remaining) in still_active {
                hook(world, ctx, &name, remaining);
            }
        }

        // 3. Advance cycles.
        let cycle_names: Vec<String> = scheduler.cycle_defs.borrow().keys().cloned().collect();
        for cycle_name in cycle_names {
            let (ended, started) = scheduler.advance_cycle(&cycle_name);
            if let (Some(phase), Some(hook)) = (ended, hooks.on_end.as_mut()) {
                hook(world, ctx, &phase);
            }
            if let (Some(phase), Some(hook)) = (started, hooks.on_start.as_mut()) {
                hook(world, ctx, &phase);
            }
        }

        // 4. Decrement cooldowns.
        scheduler.decrement_cooldowns();

        // 5. Evaluate inactive events in definition order. Events that just
        //    expired this tick sit out one evaluation.
        let candidates: Vec<EventDef> = scheduler.definitions.borrow().values().cloned().collect();
        for def in candidates {
            if expired.contains(&def.name) {
                continue;
            }
            if scheduler.is_active(&def.name) {
                continue;
            }
            if scheduler.is_on_cooldown(&def.name) {
                continue;
            }

            let mut all_pass = true;
            for guard_name in &def.conditions {
                if !guards.check(guard_name, world, &scheduler)? {
                    all_pass = false;
                    break;
                }
            }
            if !all_pass {
                continue;
            }

            if def.probability < 1.0 && ctx.random_f64() > def.probability {
                continue;
            }

            let duration = def.duration.resolve(ctx);
            scheduler.activate(&def.name, duration, ctx.tick_number);
            if let Some(hook) = hooks.on_start.as_mut() {
                hook(world, ctx, &def.name);
            }
        }

        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
