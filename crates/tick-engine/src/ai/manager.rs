//! Central AI registry: behavior trees, actions, conditions,
//! considerations, and utility selectors.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tick_ecs::prelude::*;

use crate::ai::nodes::{Node, Status};
use crate::clock::TickContext;
use crate::EngineError;

/// Action callback: may mutate the world; returns the node status.
pub type ActionFn = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId) -> Status>;

/// Condition callback: read-only predicate.
pub type ConditionFn = Box<dyn Fn(&World, EntityId) -> bool>;

/// Consideration callback: utility score, clamped to `[0, 1]` by the
/// scorer.
pub type ConsiderationFn = Box<dyn Fn(&World, EntityId) -> f64>;

/// A validated behavior-tree definition.
#[derive(Debug, Clone)]
pub struct TreeDef {
    pub root: String,
    pub nodes: IndexMap<String, Node>,
}

// ---------------------------------------------------------------------------
// AiManager
// ---------------------------------------------------------------------------

/// Owns tree definitions plus the action/condition/consideration and
/// utility registries. Shared into the AI systems via `Rc`.
#[derive(Default)]
pub struct AiManager {
    pub(crate) trees: RefCell<HashMap<String, TreeDef>>,
    pub(crate) actions: RefCell<HashMap<String, ActionFn>>,
    pub(crate) conditions: RefCell<HashMap<String, ConditionFn>>,
    considerations: RefCell<HashMap<String, ConsiderationFn>>,
    utility_actions: RefCell<IndexMap<String, Vec<String>>>,
    utility_selectors: RefCell<IndexMap<String, Vec<String>>>,
}

impl AiManager {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    // -- tree definitions ---------------------------------------------------

    /// Register a behavior tree after validating the node graph: the root
    /// must exist, every map key must equal its node's stored ID, and every
    /// child reference must resolve.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] describing the first violation found.
    pub fn define_tree(
        &self,
        name: &str,
        root: &str,
        nodes: impl IntoIterator<Item = Node>,
    ) -> Result<(), EngineError> {
        let nodes: IndexMap<String, Node> = nodes
            .into_iter()
            .map(|node| (node.id().to_owned(), node))
            .collect();

        if !nodes.contains_key(root) {
            return Err(EngineError::BadInput(format!(
                "missing root: node '{root}' not found in tree '{name}'"
            )));
        }
        for (key, node) in &nodes {
            if key != node.id() {
                return Err(EngineError::BadInput(format!(
                    "id mismatch: key '{key}' does not match node id '{}'",
                    node.id()
                )));
            }
            for child in node.children() {
                if !nodes.contains_key(child) {
                    return Err(EngineError::BadInput(format!(
                        "unknown child: node '{key}' references '{child}'"
                    )));
                }
            }
        }

        self.trees.borrow_mut().insert(
            name.to_owned(),
            TreeDef {
                root: root.to_owned(),
                nodes,
            },
        );
        Ok(())
    }

    /// A copy of a tree definition, if registered.
    pub fn tree(&self, name: &str) -> Option<TreeDef> {
        self.trees.borrow().get(name).cloned()
    }

    // -- callback registries ------------------------------------------------

    /// Register an action callback. Overwrites if already registered.
    pub fn register_action(
        &self,
        name: &str,
        action: impl FnMut(&mut World, &TickContext<'_>, EntityId) -> Status + 'static,
    ) {
        self.actions
            .borrow_mut()
            .insert(name.to_owned(), Box::new(action));
    }

    /// Register a condition predicate. Overwrites if already registered.
    pub fn register_condition(
        &self,
        name: &str,
        condition: impl Fn(&World, EntityId) -> bool + 'static,
    ) {
        self.conditions
            .borrow_mut()
            .insert(name.to_owned(), Box::new(condition));
    }

    /// Register a consideration scorer. Overwrites if already registered.
    pub fn register_consideration(
        &self,
        name: &str,
        consideration: impl Fn(&World, EntityId) -> f64 + 'static,
    ) {
        self.considerations
            .borrow_mut()
            .insert(name.to_owned(), Box::new(consideration));
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.borrow().contains_key(name)
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.borrow().contains_key(name)
    }

    // -- utility AI ---------------------------------------------------------

    /// Define a utility action as a list of consideration names.
    pub fn define_utility_action(&self, name: &str, considerations: &[&str]) {
        self.utility_actions.borrow_mut().insert(
            name.to_owned(),
            considerations.iter().map(|s| (*s).to_owned()).collect(),
        );
    }

    /// Define a utility selector as a list of utility action names.
    pub fn define_utility_selector(&self, name: &str, actions: &[&str]) {
        self.utility_selectors.borrow_mut().insert(
            name.to_owned(),
            actions.iter().map(|s| (*s).to_owned()).collect(),
        );
    }

    /// A copy of a selector's action list.
    pub fn utility_selector(&self, name: &str) -> Option<Vec<String>> {
        self.utility_selectors.borrow().get(name).cloned()
    }

    /// Score a utility action: the product of its considerations' scores,
    /// each clamped to `[0, 1]`. Unknown actions, empty consideration
    /// lists, and unknown consideration names all score 0.
    pub fn score_action(&self, action_name: &str, world: &World, entity: EntityId) -> f64 {
        let considerations = match self.utility_actions.borrow().get(action_name) {
            Some(names) if !names.is_empty() => names.clone(),
            _ => return 0.0,
        };
        let registry = self.considerations.borrow();
        let mut score = 1.0;
        for name in &considerations {
            let Some(consideration) = registry.get(name) else {
                return 0.0;
            };
            score *= consideration(world, entity).clamp(0.0, 1.0);
            if score == 0.0 {
                break;
            }
        }
        score
    }

    /// Pick the highest-scoring action of a selector; ties resolve to the
    /// first in definition order. An unknown or empty selector yields
    /// `("", 0.0)`.
    pub fn select_action(&self, selector_name: &str, world: &World, entity: EntityId) -> (String, f64) {
        let actions = match self.utility_selectors.borrow().get(selector_name) {
            Some(names) if !names.is_empty() => names.clone(),
            _ => return (String::new(), 0.0),
        };
        let mut best_name = String::new();
        let mut best_score = -1.0;
        for name in &actions {
            let score = self.score_action(name, world, entity);
            if score > best_score {
                best_score = score;
                best_name = name.clone();
            }
        }
        (best_name, best_score.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str) -> Node {
        Node::Action {
            id: id.to_owned(),
            action: "noop".to_owned(),
        }
    }

    #[test]
    fn define_tree_validates_root() {
        let manager = AiManager::new();
        let err = manager.define_tree("t", "ghost", [action("a")]).unwrap_err();
        assert!(err.to_string().contains("missing root"));
    }

    #[test]
    fn define_tree_validates_children() {
        let manager = AiManager::new();
        let seq = Node::Sequence {
            id: "root".to_owned(),
            children: vec!["ghost".to_owned()],
        };
        let err = manager.define_tree("t", "root", [seq]).unwrap_err();
        assert!(err.to_string().contains("unknown child"));
    }

    #[test]
    fn define_valid_tree() {
        let manager = AiManager::new();
        let seq = Node::Sequence {
            id: "root".to_owned(),
            children: vec!["a".to_owned()],
        };
        manager.define_tree("t", "root", [seq, action("a")]).unwrap();
        assert!(manager.tree("t").is_some());
        assert!(manager.tree("other").is_none());
    }

    #[test]
    fn score_multiplies_and_clamps() {
        let manager = AiManager::new();
        manager.register_consideration("half", |_, _| 0.5);
        manager.register_consideration("big", |_, _| 7.0); // clamped to 1
        manager.define_utility_action("act", &["half", "big"]);

        let world = World::new();
        let e = EntityId::from_raw(0);
        assert!((manager.score_action("act", &world, e) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unknown_pieces_score_zero() {
        let manager = AiManager::new();
        manager.define_utility_action("empty", &[]);
        manager.define_utility_action("broken", &["ghost"]);

        let world = World::new();
        let e = EntityId::from_raw(0);
        assert_eq!(manager.score_action("missing", &world, e), 0.0);
        assert_eq!(manager.score_action("empty", &world, e), 0.0);
        assert_eq!(manager.score_action("broken", &world, e), 0.0);
    }

    #[test]
    fn select_picks_highest_with_first_tie_win() {
        let manager = AiManager::new();
        manager.register_consideration("low", |_, _| 0.3);
        manager.register_consideration("high", |_, _| 0.8);
        manager.define_utility_action("a_low", &["low"]);
        manager.define_utility_action("b_high", &["high"]);
        manager.define_utility_action("c_high", &["high"]);
        manager.define_utility_selector("sel", &["a_low", "b_high", "c_high"]);

        let world = World::new();
        let e = EntityId::from_raw(0);
        let (name, score) = manager.select_action("sel", &world, e);
        assert_eq!(name, "b_high");
        assert!((score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn empty_selector_yields_empty_pair() {
        let manager = AiManager::new();
        manager.define_utility_selector("empty", &[]);
        let world = World::new();
        let e = EntityId::from_raw(0);
        assert_eq!(manager.select_action("empty", &world, e), (String::new(), 0.0));
        assert_eq!(manager.select_action("missing", &world, e), (String::new(), 0.0));
    }
}
