//! ECS components for AI entities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tick_ecs::component::Component;

/// Assigns a behavior-tree definition to an entity and carries its
/// evaluation cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorTree {
    pub tree_name: String,
    /// ID of the node that returned running last tick; empty when resolved.
    pub running_node: String,
    /// Last resolved status string ("success", "failure", "running", or
    /// empty before the first evaluation).
    pub status: String,
    /// Per-repeater completed-iteration counters.
    pub repeat_counts: BTreeMap<String, u32>,
}

impl BehaviorTree {
    pub fn new(tree_name: impl Into<String>) -> Self {
        Self {
            tree_name: tree_name.into(),
            running_node: String::new(),
            status: String::new(),
            repeat_counts: BTreeMap::new(),
        }
    }
}

impl Component for BehaviorTree {
    const NAME: &'static str = "ai.BehaviorTree";
}

/// Per-entity key-value knowledge store, opaque to the kernel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Blackboard {
    pub data: BTreeMap<String, serde_json::Value>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for Blackboard {
    const NAME: &'static str = "ai.Blackboard";
}

/// Assigns a utility selector to an entity and records the last selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilityAgent {
    pub selector_name: String,
    pub selected_action: String,
    pub score: f64,
}

impl UtilityAgent {
    pub fn new(selector_name: impl Into<String>) -> Self {
        Self {
            selector_name: selector_name.into(),
            selected_action: String::new(),
            score: 0.0,
        }
    }
}

impl Component for UtilityAgent {
    const NAME: &'static str = "ai.UtilityAgent";
}
