//! Behavior-tree node types and evaluation status.

use serde::{Deserialize, Serialize};

/// Result of evaluating a BT node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
    Running,
}

impl Status {
    /// The stable string stored in the `BehaviorTree` component.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Running => "running",
        }
    }
}

/// Completion policy for [`Node::Parallel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelPolicy {
    /// Succeeds only when every child succeeds; fails on any failure.
    RequireAll,
    /// Succeeds on any success; fails only when every child fails.
    RequireOne,
}

/// Failure policy for [`Node::Repeater`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// A child failure propagates as the repeater's failure.
    Fail,
    /// A child failure keeps the repeater running.
    Restart,
}

/// A behavior-tree node. Every node carries a stable ID; composites carry
/// an ordered child-ID list and decorators a single child ID (empty string
/// for none).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Leaf: calls a registered action callback, yielding any [`Status`].
    Action { id: String, action: String },
    /// Leaf: calls a registered predicate, yielding success or failure.
    Condition { id: String, condition: String },
    /// Runs children in order until one returns non-success.
    Sequence { id: String, children: Vec<String> },
    /// Runs children in order until one returns non-failure.
    Selector { id: String, children: Vec<String> },
    /// Runs every child every tick under a completion policy.
    Parallel {
        id: String,
        children: Vec<String>,
        policy: ParallelPolicy,
    },
    /// Scores children through the utility registry and runs the highest.
    UtilitySelector { id: String, children: Vec<String> },
    /// Flips success and failure; running passes through.
    Inverter { id: String, child: String },
    /// Repeats the child up to `max_count` successes.
    Repeater {
        id: String,
        child: String,
        max_count: u32,
        fail_policy: RepeatPolicy,
    },
    /// Always succeeds unless the child is running.
    Succeeder { id: String, child: String },
    /// Always fails unless the child is running.
    AlwaysFail { id: String, child: String },
}

impl Node {
    /// The node's stable ID.
    pub fn id(&self) -> &str {
        match self {
            Node::Action { id, .. }
            | Node::Condition { id, .. }
            | Node::Sequence { id, .. }
            | Node::Selector { id, .. }
            | Node::Parallel { id, .. }
            | Node::UtilitySelector { id, .. }
            | Node::Inverter { id, .. }
            | Node::Repeater { id, .. }
            | Node::Succeeder { id, .. }
            | Node::AlwaysFail { id, .. } => id,
        }
    }

    /// Child IDs in declared order; empty decorator children are omitted.
    pub fn children(&self) -> Vec<&str> {
        match self {
            Node::Action { .. } | Node::Condition { .. } => Vec::new(),
            Node::Sequence { children, .. }
            | Node::Selector { children, .. }
            | Node::Parallel { children, .. }
            | Node::UtilitySelector { children, .. } => {
                children.iter().map(String::as_str).collect()
            }
            Node::Inverter { child, .. }
            | Node::Repeater { child, .. }
            | Node::Succeeder { child, .. }
            | Node::AlwaysFail { child, .. } => {
                if child.is_empty() {
                    Vec::new()
                } else {
                    vec![child.as_str()]
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_and_children_accessors() {
        let seq = Node::Sequence {
            id: "seq".to_owned(),
            children: vec!["a".to_owned(), "b".to_owned()],
        };
        assert_eq!(seq.id(), "seq");
        assert_eq!(seq.children(), vec!["a", "b"]);

        let inv = Node::Inverter {
            id: "inv".to_owned(),
            child: String::new(),
        };
        assert!(inv.children().is_empty());

        let leaf = Node::Action {
            id: "act".to_owned(),
            action: "do_it".to_owned(),
        };
        assert!(leaf.children().is_empty());
    }

    #[test]
    fn status_strings_are_stable() {
        assert_eq!(Status::Success.as_str(), "success");
        assert_eq!(Status::Failure.as_str(), "failure");
        assert_eq!(Status::Running.as_str(), "running");
    }
}
