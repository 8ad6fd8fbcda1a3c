//! Behavior-tree evaluation.
//!
//! Evaluation walks from the root each tick. When a previous tick left a
//! running leaf, the path from the root to that leaf is recomputed and
//! memory composites (sequence, selector) resume at the child on the path
//! instead of their first child; parallel always re-runs every child.

use std::collections::BTreeMap;

use tick_ecs::prelude::*;

use crate::ai::manager::{AiManager, TreeDef};
use crate::ai::nodes::{Node, ParallelPolicy, RepeatPolicy, Status};
use crate::clock::TickContext;
use crate::EngineError;

/// Result of evaluating one entity's tree for one tick.
pub(crate) struct EvalOutcome {
    pub status: Status,
    /// The running leaf to resume at next tick; empty when resolved.
    pub running_node: String,
    /// Updated repeater counters; cleared when the tree resolves.
    pub repeat_counts: BTreeMap<String, u32>,
}

/// Evaluate `tree` for `entity`, resuming at `resume_node` if non-empty.
pub(crate) fn evaluate(
    manager: &AiManager,
    tree: &TreeDef,
    resume_node: &str,
    repeat_counts: &BTreeMap<String, u32>,
    world: &mut World,
    ctx: &TickContext<'_>,
    entity: EntityId,
) -> Result<EvalOutcome, EngineError> {
    let mut path = Vec::new();
    if !resume_node.is_empty() && !find_path(tree, &tree.root, resume_node, &mut path) {
        // Stale cursor (tree redefined); fall back to a fresh walk.
        path.clear();
    }

    let mut evaluator = Evaluator {
        manager,
        tree,
        path,
        counts: repeat_counts.clone(),
        running: None,
    };
    let status = evaluator.eval(&tree.root, world, ctx, entity)?;

    let running_node = if status == Status::Running {
        evaluator
            .running
            .unwrap_or_else(|| tree.root.clone())
    } else {
        evaluator.counts.clear();
        String::new()
    };

    Ok(EvalOutcome {
        status,
        running_node,
        repeat_counts: evaluator.counts,
    })
}

fn find_path(tree: &TreeDef, from: &str, target: &str, path: &mut Vec<String>) -> bool {
    path.push(from.to_owned());
    if from == target {
        return true;
    }
    if let Some(node) = tree.nodes.get(from) {
        for child in node.children() {
            if find_path(tree, child, target, path) {
                return true;
            }
        }
    }
    path.pop();
    false
}

struct Evaluator<'a> {
    manager: &'a AiManager,
    tree: &'a TreeDef,
    /// Root-to-running-leaf chain from last tick; empty when starting fresh.
    path: Vec<String>,
    counts: BTreeMap<String, u32>,
    running: Option<String>,
}

impl Evaluator<'_> {
    /// Index of the child a memory composite should start from: the path
    /// successor of `id` when resuming through it, else 0.
    fn resume_index(&self, id: &str, children: &[String]) -> usize {
        let Some(pos) = self.path.iter().position(|p| p == id) else {
            return 0;
        };
        let Some(next) = self.path.get(pos + 1) else {
            return 0;
        };
        children.iter().position(|c| c == next).unwrap_or(0)
    }

    fn eval(
        &mut self,
        id: &str,
        world: &mut World,
        ctx: &TickContext<'_>,
        entity: EntityId,
    ) -> Result<Status, EngineError> {
        let node = self
            .tree
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownName {
                kind: "node",
                name: id.to_owned(),
            })?;

        let status = match &node {
            Node::Action { id, action } => {
                let status = {
                    let mut actions = self.manager.actions.borrow_mut();
                    let callback =
                        actions
                            .get_mut(action)
                            .ok_or_else(|| EngineError::UnknownName {
                                kind: "action",
                                name: action.clone(),
                            })?;
                    callback(world, ctx, entity)
                };
                if status == Status::Running && self.running.is_none() {
                    self.running = Some(id.clone());
                }
                status
            }

            Node::Condition { condition, .. } => {
                let conditions = self.manager.conditions.borrow();
                let predicate =
                    conditions
                        .get(condition)
                        .ok_or_else(|| EngineError::UnknownName {
                            kind: "condition",
                            name: condition.clone(),
                        })?;
                if predicate(world, entity) {
                    Status::Success
                } else {
                    Status::Failure
                }
            }

            Node::Sequence { id, children } => {
                let start = self.resume_index(id, children);
                let mut result = Status::Success;
                for child in &children[start..] {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Success => {}
                        other => {
                            result = other;
                            break;
                        }
                    }
                }
                result
            }

            Node::Selector { id, children } => {
                let start = self.resume_index(id, children);
                let mut result = Status::Failure;
                for child in &children[start..] {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Failure => {}
                        other => {
                            result = other;
                            break;
                        }
                    }
                }
                result
            }

            Node::Parallel {
                children, policy, ..
            } => {
                let mut any_running = false;
                let mut any_success = false;
                let mut any_failure = false;
                for child in children {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Running => any_running = true,
                        Status::Success => any_success = true,
                        Status::Failure => any_failure = true,
                    }
                }
                match policy {
                    ParallelPolicy::RequireAll => {
                        if any_failure {
                            Status::Failure
                        } else if any_running {
                            Status::Running
                        } else {
                            Status::Success
                        }
                    }
                    ParallelPolicy::RequireOne => {
                        if any_success {
                            Status::Success
                        } else if any_running {
                            Status::Running
                        } else {
                            Status::Failure
                        }
                    }
                }
            }

            Node::UtilitySelector { children, .. } => {
                if children.is_empty() {
                    Status::Failure
                } else {
                    // Child node IDs double as utility-action names.
                    let mut best = 0;
                    let mut best_score = -1.0;
                    for (index, child) in children.iter().enumerate() {
                        let score = self.manager.score_action(child, world, entity);
                        if score > best_score {
                            best_score = score;
                            best = index;
                        }
                    }
                    let chosen = children[best].clone();
                    self.eval(&chosen, world, ctx, entity)?
                }
            }

            Node::Inverter { child, .. } => {
                if child.is_empty() {
                    Status::Failure
                } else {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Success => Status::Failure,
                        Status::Failure => Status::Success,
                        Status::Running => Status::Running,
                    }
                }
            }

            Node::Repeater {
                id,
                child,
                max_count,
                fail_policy,
            } => {
                if child.is_empty() {
                    Status::Failure
                } else {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Running => Status::Running,
                        Status::Success => {
                            let count = self.counts.get(id).copied().unwrap_or(0) + 1;
                            if count >= *max_count {
                                self.counts.remove(id);
                                Status::Success
                            } else {
                                self.counts.insert(id.clone(), count);
                                Status::Running
                            }
                        }
                        Status::Failure => match fail_policy {
                            RepeatPolicy::Fail => {
                                self.counts.remove(id);
                                Status::Failure
                            }
                            RepeatPolicy::Restart => Status::Running,
                        },
                    }
                }
            }

            Node::Succeeder { child, .. } => {
                if child.is_empty() {
                    Status::Success
                } else {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Running => Status::Running,
                        _ => Status::Success,
                    }
                }
            }

            Node::AlwaysFail { child, .. } => {
                if child.is_empty() {
                    Status::Failure
                } else {
                    match self.eval(child, world, ctx, entity)? {
                        Status::Running => Status::Running,
                        _ => Status::Failure,
                    }
                }
            }
        };

        Ok(status)
    }
}
