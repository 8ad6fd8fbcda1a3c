//! AI layer: behavior trees, utility AI, and blackboards.
//!
//! The [`AiManager`](manager::AiManager) is the embedder-owned registry of
//! tree definitions and named callbacks; the systems in [`systems`] drive
//! every entity holding a [`BehaviorTree`](components::BehaviorTree) or
//! [`UtilityAgent`](components::UtilityAgent) component once per tick.

pub mod components;
pub mod curves;
mod evaluator;
pub mod manager;
pub mod nodes;
pub mod systems;

pub use components::{BehaviorTree, Blackboard, UtilityAgent};
pub use manager::{AiManager, TreeDef};
pub use nodes::{Node, ParallelPolicy, RepeatPolicy, Status};
pub use systems::{bt_system, utility_system};
