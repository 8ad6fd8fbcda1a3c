//! Player-triggered abilities with charges, cooldowns, and durations.
//!
//! The [`AbilityManager`] owns definitions and per-ability runtime state;
//! [`invoke`](AbilityManager::invoke) is the entry point for player input and
//! the [`ability_system`] advances effect timers, cooldowns, and charge
//! regeneration each tick. A monotonic restore-generation counter lets the
//! system notice a restore and rebuild its private started-set without any
//! signalling.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
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

/// Definition of an ability. Not serialized; re-register before restore.
#[derive(Debug, Clone)]
pub struct AbilityDef {
    pub name: String,
    pub duration: TickDuration,
    /// Ticks after the effect ends before re-use.
    pub cooldown: u32,
    /// Maximum charges; -1 disables charge tracking entirely.
    pub max_charges: i64,
    /// Ticks between charge regenerations (0 = no regen).
    pub charge_regen: u32,
    /// Guard names; all must pass at invoke time.
    pub conditions: Vec<String>,
}

impl AbilityDef {
    pub fn new(name: impl Into<String>, duration: TickDuration) -> Self {
        Self {
            name: name.into(),
            duration,
            cooldown: 0,
            max_charges: 1,
            charge_regen: 0,
            conditions: Vec::new(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: u32) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_max_charges(mut self, max_charges: i64) -> Self {
        self.max_charges = max_charges;
        self
    }

    pub fn with_charge_regen(mut self, charge_regen: u32) -> Self {
        self.charge_regen = charge_regen;
        self
    }

    pub fn with_conditions(mut self, conditions: &[&str]) -> Self {
        self.conditions = conditions.iter().map(|s| (*s).to_owned()).collect();
        self
    }
}

/// Runtime state of one ability. Mutable, serializable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityState {
    pub name: String,
    pub charges: i64,
    pub cooldown_remaining: u32,
    pub active_remaining: u32,
    /// Tick of the pending/running invocation, -1 when idle.
    pub active_started_at: i64,
    pub regen_remaining: u32,
}

impl AbilityState {
    fn idle(name: &str, charges: i64) -> Self {
        Self {
            name: name.to_owned(),
            charges,
            cooldown_remaining: 0,
            active_remaining: 0,
            active_started_at: -1,
            regen_remaining: 0,
        }
    }

    fn is_engaged(&self) -> bool {
        self.active_remaining > 0 || self.active_started_at != -1
    }
}

// ---------------------------------------------------------------------------
// Guard registry
// ---------------------------------------------------------------------------

type AbilityGuardFn = Box<dyn Fn(&World, &AbilityManager) -> bool>;

/// Named predicates `(world, manager) -> bool` gating invocation.
#[derive(Default)]
pub struct AbilityGuards {
    guards: RefCell<std::collections::HashMap<String, AbilityGuardFn>>,
}

impl AbilityGuards {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register a named guard. Overwrites if already registered.
    pub fn register(&self, name: &str, guard: impl Fn(&World, &AbilityManager) -> bool + 'static) {
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
        manager: &AbilityManager,
    ) -> Result<bool, EngineError> {
        let guards = self.guards.borrow();
        let guard = guards.get(name).ok_or_else(|| EngineError::UnknownName {
            kind: "guard",
            name: name.to_owned(),
        })?;
        Ok(guard(world, manager))
    }

    pub fn has(&self, name: &str) -> bool {
        self.guards.borrow().contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// AbilityManager
// ---------------------------------------------------------------------------

/// Manages ability definitions, runtime states, and invocation.
#[derive(Default)]
pub struct AbilityManager {
    definitions: RefCell<IndexMap<String, AbilityDef>>,
    states: RefCell<IndexMap<String, AbilityState>>,
    restore_gen: Cell<u64>,
}

impl AbilityManager {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    // -- registration -------------------------------------------------------

    /// Register an ability definition. Insertion order preserved.
    ///
    /// First registration initializes runtime state with full charges (or 0
    /// for uncharged abilities, which never track charges); re-defining
    /// updates the definition but keeps existing state.
    pub fn define(&self, ability: AbilityDef) {
        let name = ability.name.clone();
        if !self.states.borrow().contains_key(&name) {
            let initial = if ability.max_charges == -1 {
                0
            } else {
                ability.max_charges
            };
            self.states
                .borrow_mut()
                .insert(name.clone(), AbilityState::idle(&name, initial));
        }
        self.definitions.borrow_mut().insert(name, ability);
    }

    /// Look up an ability definition by name.
    pub fn definition(&self, name: &str) -> Option<AbilityDef> {
        self.definitions.borrow().get(name).cloned()
    }

    /// All defined ability names in definition order.
    pub fn defined_abilities(&self) -> Vec<String> {
        self.definitions.borrow().keys().cloned().collect()
    }

    // -- invocation ---------------------------------------------------------

    /// Attempt to invoke an ability. Returns `Ok(false)` when the ability is
    /// unknown, already active, on cooldown, out of charges, or a guard
    /// rejects it.
    ///
    /// On success a charge is consumed (if tracked), the duration is
    /// resolved through the shared RNG, and the ability is marked active as
    /// of `ctx.tick_number`; the ability system fires `on_start` when it
    /// next runs.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] for an unregistered guard name.
    pub fn invoke(
        &self,
        name: &str,
        world: &World,
        ctx: &TickContext<'_>,
        guards: Option<&AbilityGuards>,
    ) -> Result<bool, EngineError> {
        let Some(def) = self.definition(name) else {
            return Ok(false);
        };
        {
            let states = self.states.borrow();
            let Some(state) = states.get(name) else {
                return Ok(false);
            };
            if state.is_engaged() || state.cooldown_remaining > 0 {
                return Ok(false);
            }
            if def.max_charges != -1 && state.charges == 0 {
                return Ok(false);
            }
        }

        if let Some(guards) = guards {
            for guard_name in &def.conditions {
                if !guards.check(guard_name, world, self)? {
                    return Ok(false);
                }
            }
        }

        let duration = def.duration.resolve(ctx);
        let mut states = self.states.borrow_mut();
        let Some(state) = states.get_mut(name) else {
            return Ok(false);
        };
        if def.max_charges != -1 {
            state.charges -= 1;
        }
        state.active_remaining = duration;
        state.active_started_at = ctx.tick_number as i64;
        if def.max_charges != -1
            && def.charge_regen > 0
            && state.charges < def.max_charges
            && state.regen_remaining == 0
        {
            state.regen_remaining = def.charge_regen;
        }
        Ok(true)
    }

    /// Whether the ability could be invoked right now. Purely informational.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] for an unregistered guard name.
    pub fn is_available(
        &self,
        name: &str,
        world: &World,
        guards: Option<&AbilityGuards>,
    ) -> Result<bool, EngineError> {
        let Some(def) = self.definition(name) else {
            return Ok(false);
        };
        {
            let states = self.states.borrow();
            let Some(state) = states.get(name) else {
                return Ok(false);
            };
            if state.is_engaged() || state.cooldown_remaining > 0 {
                return Ok(false);
            }
            if def.max_charges != -1 && state.charges == 0 {
                return Ok(false);
            }
        }
        if let Some(guards) = guards {
            for guard_name in &def.conditions {
                if !guards.check(guard_name, world, self)? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    // -- queries ------------------------------------------------------------

    /// Whether the ability's effect is currently running.
    pub fn is_active(&self, name: &str) -> bool {
        self.states
            .borrow()
            .get(name)
            .map(|s| s.active_remaining > 0)
            .unwrap_or(false)
    }

    /// Current charge count; -1 for uncharged abilities.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] for an unknown ability.
    pub fn charges(&self, name: &str) -> Result<i64, EngineError> {
        let def = self.definition(name).ok_or_else(|| EngineError::UnknownName {
            kind: "ability",
            name: name.to_owned(),
        })?;
        if def.max_charges == -1 {
            return Ok(-1);
        }
        Ok(self
            .states
            .borrow()
            .get(name)
            .map(|s| s.charges)
            .unwrap_or(0))
    }

    /// Remaining ticks on the active effect; 0 if not active.
    pub fn time_remaining(&self, name: &str) -> u32 {
        self.states
            .borrow()
            .get(name)
            .map(|s| s.active_remaining)
            .unwrap_or(0)
    }

    /// Remaining cooldown ticks; 0 if not cooling down.
    pub fn cooldown_remaining(&self, name: &str) -> u32 {
        self.states
            .borrow()
            .get(name)
            .map(|s| s.cooldown_remaining)
            .unwrap_or(0)
    }

    /// A copy of the runtime state, if the ability is defined.
    pub fn state(&self, name: &str) -> Option<AbilityState> {
        self.states.borrow().get(name).cloned()
    }

    /// The restore-generation counter. Bumped on every restore.
    pub fn restore_generation(&self) -> u64 {
        self.restore_gen.get()
    }

    // -- serialization ------------------------------------------------------

    /// Serialize runtime state (not definitions).
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "abilities": self.states.borrow().values().collect::<Vec<_>>(),
        })
    }

    /// Restore runtime state and bump the restore generation. Definitions
    /// must be re-registered first; entries for unknown abilities are
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`EngineError::Snapshot`] for a malformed value tree.
    pub fn restore(&self, data: &serde_json::Value) -> Result<(), EngineError> {
        let entries: Vec<AbilityState> = match data.get("abilities") {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| EngineError::Snapshot(format!("ability manager: {e}")))?,
            None => Vec::new(),
        };
        let defined = self.definitions.borrow();
        let mut states = self.states.borrow_mut();
        states.clear();
        for state in entries {
            if defined.contains_key(&state.name) {
                states.insert(state.name.clone(), state);
            }
        }
        drop(states);
        drop(defined);
        self.restore_gen.set(self.restore_gen.get() + 1);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// System factory
// ---------------------------------------------------------------------------

/// Callbacks observed by the ability system. All optional.
#[derive(Default)]
pub struct AbilityHooks {
    pub on_start: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, &str)>>,
    pub on_end: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, &str)>>,
    pub on_tick: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, &str, u32)>>,
}

/// A system that processes ability state each tick.
///
/// Tick execution order:
/// 1. Newly-invoked abilities fire `on_start`; a resolved duration of 0 is
///    instantaneous -- `on_end` fires in the same tick and the cooldown
///    begins immediately.
/// 2. Active effects decrement; those reaching 0 fire `on_end` and start
///    their cooldown.
/// 3. `on_tick` fires for every still-active effect.
/// 4. Cooldown counters decrement.
/// 5. Charge-regen timers advance; a completed timer restores one charge
///    and restarts while below `max_charges`.
pub fn ability_system(manager: Rc<AbilityManager>, mut hooks: AbilityHooks) -> System {
    // Private system state: which abilities have had on_start fired. The
    // seen generation detects restores so the set can be rebuilt from
    // manager state.
    let mut started: HashSet<String> = HashSet::new();
    let mut seen_gen = manager.restore_gen.get();
    for (name, state) in manager.states.borrow().iter() {
        if state.is_engaged() {
            started.insert(name.clone());
        }
    }

    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        if manager.restore_gen.get() != seen_gen {
            seen_gen = manager.restore_gen.get();
            started.clear();
            for (name, state) in manager.states.borrow().iter() {
                if state.is_engaged() {
                    started.insert(name.clone());
                }
            }
        }

        let names = manager.defined_abilities();

        // 1. Newly-invoked abilities.
        for name in &names {
            let (engaged, instantaneous, cooldown) = {
                let states = manager.states.borrow();
                let Some(state) = states.get(name) else {
                    continue;
                };
                let def_cooldown = manager
                    .definitions
                    .borrow()
                    .get(name)
                    .map(|d| d.cooldown)
                    .unwrap_or(0);
                (
                    state.active_started_at != -1,
                    state.active_remaining == 0,
                    def_cooldown,
                )
            };
            if !engaged || started.contains(name) {
                continue;
            }
            if instantaneous {
                if let Some(hook) = hooks.on_start.as_mut() {
                    hook(world, ctx, name);
                }
                if let Some(hook) = hooks.on_end.as_mut() {
                    hook(world, ctx, name);
                }
                if let Some(state) = manager.states.borrow_mut().get_mut(name) {
                    state.active_started_at = -1;
                    state.cooldown_remaining = cooldown;
                }
            } else {
                if let Some(hook) = hooks.on_start.as_mut() {
                    hook(world, ctx, name);
                }
                started.insert(name.clone());
            }
        }

        // 2. Decrement active effects, end expired ones.
        for name in &names {
            let ended = {
                let mut states = manager.states.borrow_mut();
                let Some(state) = states.get_mut(name) else {
                    continue;
                };
                if state.active_remaining == 0 {
                    false
                } else {
                    state.active_remaining -= 1;
                    state.active_remaining == 0
                }
            };
            if ended {
                if let Some(hook) = hooks.on_end.as_mut() {
                    hook(world, ctx, name);
                }
                let cooldown = manager
                    .definitions
                    .borrow()
                    .get(name)
                    .map(|d| d.cooldown)
                    .unwrap_or(0);
                if let Some(state) = manager.states.borrow_mut().get_mut(name) {
                    state.active_started_at = -1;
                    state.cooldown_remaining = cooldown;
                }
                started.remove(name);
            }
        }

        // 3. Tick still-active effects.
        if let Some(hook) = hooks.on_tick.as_mut() {
            for name in &names {
                let remaining = manager.time_remaining(name);
                if remaining > 0 {
                    hook(world, ctx, name, remaining);
                }
            }
        }

        // 4. Decrement cooldowns.
        for name in &names {
            if let Some(state) = manager.states.borrow_mut().get_mut(name) {
                state.cooldown_remaining = state.cooldown_remaining.saturating_sub(1);
            }
        }

        // 5. Regenerate charges.
        for name in &names {
            let Some(def) = manager.definition(name) else {
                continue;
            };
            let mut states = manager.states.borrow_mut();
            let Some(state) = states.get_mut(name) else {
                continue;
            };
            if state.regen_remaining > 0 {
                state.regen_remaining -= 1;
                if state.regen_remaining == 0 && state.charges < def.max_charges {
                    state.charges += 1;
                    if state.charges < def.max_charges {
                        state.regen_remaining = def.charge_regen;
                    }
                }
            }
        }

        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
