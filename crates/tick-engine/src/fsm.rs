//! Finite-state-machine component and guarded-transition evaluator.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tick_ecs::prelude::*;

use crate::clock::TickContext;
use crate::engine::System;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Finite state machine. The transition table maps each state to an ordered
/// list of `(guard_name, target_state)` edges; the first edge whose guard
/// passes wins.
///
/// `initial` and `history` carry hierarchical-state data (parent state ->
/// default child, parent state -> last active child) accepted by the data
/// model for future use; the evaluator walks the flat transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fsm {
    pub state: String,
    pub transitions: BTreeMap<String, Vec<(String, String)>>,
    #[serde(default)]
    pub initial: BTreeMap<String, String>,
    #[serde(default)]
    pub history: BTreeMap<String, String>,
}

impl Fsm {
    pub fn new(state: impl Into<String>, transitions: BTreeMap<String, Vec<(String, String)>>) -> Self {
        Self {
            state: state.into(),
            transitions,
            initial: BTreeMap::new(),
            history: BTreeMap::new(),
        }
    }
}

impl Component for Fsm {
    const NAME: &'static str = "fsm.Fsm";
}

// ---------------------------------------------------------------------------
// Guard registry
// ---------------------------------------------------------------------------

type GuardFn = Box<dyn Fn(&World, EntityId) -> bool>;

/// Named predicates `(world, entity) -> bool` consulted by the evaluator.
#[derive(Default)]
pub struct FsmGuards {
    guards: RefCell<std::collections::HashMap<String, GuardFn>>,
}

impl FsmGuards {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named guard. Overwrites if already registered.
    pub fn register(&self, name: &str, guard: impl Fn(&World, EntityId) -> bool + 'static) {
        self.guards
            .borrow_mut()
            .insert(name.to_owned(), Box::new(guard));
    }

    /// Evaluate a guard.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownName`] for a name that was never registered.
    pub fn check(&self, name: &str, world: &World, entity: EntityId) -> Result<bool, EngineError> {
        let guards = self.guards.borrow();
        let guard = guards.get(name).ok_or_else(|| EngineError::UnknownName {
            kind: "guard",
            name: name.to_owned(),
        })?;
        Ok(guard(world, entity))
    }

    pub fn has(&self, name: &str) -> bool {
        self.guards.borrow().contains_key(name)
    }

    /// All registered guard names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.guards.borrow().keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

// ---------------------------------------------------------------------------
// System factory
// ---------------------------------------------------------------------------

/// Callback fired on a transition with the old and new state names.
pub type TransitionHook = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &str, &str)>;

/// A system that evaluates every entity's FSM once per tick, taking the
/// first satisfied outgoing edge of the current state.
pub fn fsm_system(guards: Rc<FsmGuards>, mut on_transition: Option<TransitionHook>) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let targets: Vec<(EntityId, Vec<(String, String)>)> = world
            .query::<(Fsm,)>()
            .map(|(entity, (fsm,))| {
                let edges = fsm.transitions.get(&fsm.state).cloned().unwrap_or_default();
                (entity, edges)
            })
            .collect();

        for (entity, edges) in targets {
            for (guard_name, target) in &edges {
                if guards.check(guard_name, world, entity)? {
                    let old = match world.get_mut::<Fsm>(entity) {
                        Ok(fsm) => std::mem::replace(&mut fsm.state, target.clone()),
                        Err(_) => break,
                    };
                    if let Some(hook) = on_transition.as_mut() {
                        hook(world, ctx, entity, &old, target);
                    }
                    break;
                }
            }
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
