//! System factories for behavior trees and utility AI.

use std::rc::Rc;

use tick_ecs::prelude::*;

use crate::ai::components::{BehaviorTree, UtilityAgent};
use crate::ai::evaluator::evaluate;
use crate::ai::manager::AiManager;
use crate::ai::nodes::Status;
use crate::clock::TickContext;
use crate::engine::System;

/// Callback fired when an entity's tree resolves (success or failure; never
/// for running).
pub type StatusHook = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &str)>;

/// A system that evaluates every entity's behavior tree each tick.
///
/// Entities referencing an undefined tree are skipped.
pub fn bt_system(manager: Rc<AiManager>, mut on_status: Option<StatusHook>) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let targets: Vec<(EntityId, BehaviorTree)> = world
            .query::<(BehaviorTree,)>()
            .map(|(entity, (bt,))| (entity, bt.clone()))
            .collect();

        for (entity, bt) in targets {
            let Some(tree) = manager.tree(&bt.tree_name) else {
                continue;
            };
            let outcome = evaluate(
                &manager,
                &tree,
                &bt.running_node,
                &bt.repeat_counts,
                world,
                ctx,
                entity,
            )?;

            let resolved = matches!(outcome.status, Status::Success | Status::Failure);
            let status_str = outcome.status.as_str();
            if let Ok(bt) = world.get_mut::<BehaviorTree>(entity) {
                bt.running_node = outcome.running_node;
                bt.status = status_str.to_owned();
                bt.repeat_counts = outcome.repeat_counts;
            }
            if resolved {
                if let Some(hook) = on_status.as_mut() {
                    hook(world, ctx, entity, status_str);
                }
            }
        }
        Ok(())
    })
}

/// Callback fired after a utility selection with the chosen action and
/// score; not fired for empty selections.
pub type SelectHook = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &str, f64)>;

/// A system that runs every entity's utility selector each tick, writing
/// the chosen `(action, score)` into its [`UtilityAgent`].
pub fn utility_system(manager: Rc<AiManager>, mut on_select: Option<SelectHook>) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let targets: Vec<(EntityId, String)> = world
            .query::<(UtilityAgent,)>()
            .map(|(entity, (agent,))| (entity, agent.selector_name.clone()))
            .collect();

        for (entity, selector) in targets {
            let (name, score) = manager.select_action(&selector, world, entity);
            if let Ok(agent) = world.get_mut::<UtilityAgent>(entity) {
                agent.selected_action = name.clone();
                agent.score = score;
            }
            if !name.is_empty() {
                if let Some(hook) = on_select.as_mut() {
                    hook(world, ctx, entity, &name, score);
                }
            }
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::nodes::{Node, ParallelPolicy, RepeatPolicy};
    use crate::engine::Engine;
    use crate::EngineError;
    use std::cell::{Cell, RefCell};

    fn action(id: &str, name: &str) -> Node {
        Node::Action {
            id: id.to_owned(),
            action: name.to_owned(),
        }
    }

    fn setup(manager: &Rc<AiManager>) -> (Engine, EntityId) {
        let mut engine = Engine::new(10, Some(42)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(e, BehaviorTree::new("test"))
            .unwrap();
        engine.add_boxed_system("bt", bt_system(Rc::clone(manager), None));
        (engine, e)
    }

    #[test]
    fn single_action_tree_resolves() {
        let manager = AiManager::new();
        manager.register_action("succeed", |_w, _c, _e| Status::Success);
        manager
            .define_tree("test", "root", [action("root", "succeed")])
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        let bt = engine.world().get::<BehaviorTree>(e).unwrap();
        assert_eq!(bt.status, "success");
        assert_eq!(bt.running_node, "");
    }

    #[test]
    fn running_action_records_cursor_and_resumes() {
        let manager = AiManager::new();
        let calls = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&calls);
        manager.register_action("run_twice", move |_w, _c, _e| {
            sink.set(sink.get() + 1);
            if sink.get() < 3 {
                Status::Running
            } else {
                Status::Success
            }
        });
        manager
            .define_tree("test", "root", [action("root", "run_twice")])
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "running");
        assert_eq!(
            engine.world().get::<BehaviorTree>(e).unwrap().running_node,
            "root"
        );
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "running");
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "success");
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().running_node, "");
    }

    #[test]
    fn sequence_resumes_at_running_child_without_rerunning_earlier() {
        let manager = AiManager::new();
        let first_calls = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&first_calls);
        manager.register_action("first", move |_w, _c, _e| {
            sink.set(sink.get() + 1);
            Status::Success
        });
        let slow_calls = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&slow_calls);
        manager.register_action("slow", move |_w, _c, _e| {
            sink.set(sink.get() + 1);
            if sink.get() < 2 {
                Status::Running
            } else {
                Status::Success
            }
        });
        manager
            .define_tree(
                "test",
                "root",
                [
                    Node::Sequence {
                        id: "root".to_owned(),
                        children: vec!["a".to_owned(), "b".to_owned()],
                    },
                    action("a", "first"),
                    action("b", "slow"),
                ],
            )
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().running_node, "b");
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "success");
        // "a" ran only on the first tick; the resume skipped it.
        assert_eq!(first_calls.get(), 1);
        assert_eq!(slow_calls.get(), 2);
    }

    #[test]
    fn selector_falls_through_failures() {
        let manager = AiManager::new();
        manager.register_action("f", |_w, _c, _e| Status::Failure);
        manager.register_action("s", |_w, _c, _e| Status::Success);
        manager
            .define_tree(
                "test",
                "root",
                [
                    Node::Selector {
                        id: "root".to_owned(),
                        children: vec!["seq1".to_owned(), "seq2".to_owned()],
                    },
                    Node::Sequence {
                        id: "seq1".to_owned(),
                        children: vec!["a".to_owned(), "b".to_owned()],
                    },
                    Node::Sequence {
                        id: "seq2".to_owned(),
                        children: vec!["c".to_owned(), "d".to_owned()],
                    },
                    action("a", "f"),
                    action("b", "s"),
                    action("c", "s"),
                    action("d", "s"),
                ],
            )
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "success");
    }

    #[test]
    fn inverter_flips_results() {
        let manager = AiManager::new();
        manager.register_action("s", |_w, _c, _e| Status::Success);
        manager
            .define_tree(
                "test",
                "root",
                [
                    Node::Inverter {
                        id: "root".to_owned(),
                        child: "a".to_owned(),
                    },
                    action("a", "s"),
                ],
            )
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "failure");
    }

    #[test]
    fn repeater_counts_one_iteration_per_tick() {
        let manager = AiManager::new();
        manager.register_action("s", |_w, _c, _e| Status::Success);
        manager
            .define_tree(
                "test",
                "root",
                [
                    Node::Repeater {
                        id: "root".to_owned(),
                        child: "a".to_owned(),
                        max_count: 3,
                        fail_policy: RepeatPolicy::Fail,
                    },
                    action("a", "s"),
                ],
            )
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        let bt = engine.world().get::<BehaviorTree>(e).unwrap();
        assert_eq!(bt.status, "running");
        assert_eq!(bt.repeat_counts.get("root"), Some(&1));

        engine.step().unwrap();
        assert_eq!(
            engine
                .world()
                .get::<BehaviorTree>(e)
                .unwrap()
                .repeat_counts
                .get("root"),
            Some(&2)
        );

        engine.step().unwrap();
        let bt = engine.world().get::<BehaviorTree>(e).unwrap();
        assert_eq!(bt.status, "success");
        assert!(bt.repeat_counts.is_empty());
    }

    #[test]
    fn repeater_fail_policy_propagates_failure() {
        let manager = AiManager::new();
        manager.register_action("f", |_w, _c, _e| Status::Failure);
        manager
            .define_tree(
                "test",
                "root",
                [
                    Node::Repeater {
                        id: "root".to_owned(),
                        child: "a".to_owned(),
                        max_count: 3,
                        fail_policy: RepeatPolicy::Fail,
                    },
                    action("a", "f"),
                ],
            )
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "failure");
    }

    #[test]
    fn parallel_policies() {
        let manager = AiManager::new();
        manager.register_action("s", |_w, _c, _e| Status::Success);
        manager.register_action("f", |_w, _c, _e| Status::Failure);

        for (policy, expected) in [
            (ParallelPolicy::RequireAll, "failure"),
            (ParallelPolicy::RequireOne, "success"),
        ] {
            manager
                .define_tree(
                    "test",
                    "root",
                    [
                        Node::Parallel {
                            id: "root".to_owned(),
                            children: vec!["a".to_owned(), "b".to_owned()],
                            policy,
                        },
                        action("a", "s"),
                        action("b", "f"),
                    ],
                )
                .unwrap();

            let (mut engine, e) = setup(&manager);
            engine.step().unwrap();
            assert_eq!(
                engine.world().get::<BehaviorTree>(e).unwrap().status,
                expected,
                "policy {policy:?}"
            );
        }
    }

    #[test]
    fn succeeder_and_always_fail() {
        let manager = AiManager::new();
        manager.register_action("f", |_w, _c, _e| Status::Failure);
        manager
            .define_tree(
                "test",
                "root",
                [
                    Node::Sequence {
                        id: "root".to_owned(),
                        children: vec!["ok".to_owned(), "bad".to_owned()],
                    },
                    Node::Succeeder {
                        id: "ok".to_owned(),
                        child: "a".to_owned(),
                    },
                    Node::AlwaysFail {
                        id: "bad".to_owned(),
                        child: String::new(),
                    },
                    action("a", "f"),
                ],
            )
            .unwrap();

        let (mut engine, e) = setup(&manager);
        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "failure");
    }

    #[test]
    fn undefined_tree_is_skipped() {
        let manager = AiManager::new();
        let mut engine = Engine::new(10, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(e, BehaviorTree::new("missing"))
            .unwrap();
        engine.add_boxed_system("bt", bt_system(Rc::clone(&manager), None));

        engine.step().unwrap();
        assert_eq!(engine.world().get::<BehaviorTree>(e).unwrap().status, "");
    }

    #[test]
    fn unknown_action_name_errors() {
        let manager = AiManager::new();
        manager
            .define_tree("test", "root", [action("root", "ghost")])
            .unwrap();
        let (mut engine, _e) = setup(&manager);
        assert!(matches!(
            engine.step(),
            Err(EngineError::UnknownName { kind: "action", .. })
        ));
    }

    #[test]
    fn on_status_fires_on_resolution_only() {
        let manager = AiManager::new();
        let flip = Rc::new(Cell::new(false));
        let sink = Rc::clone(&flip);
        manager.register_action("alternate", move |_w, _c, _e| {
            sink.set(!sink.get());
            if sink.get() {
                Status::Running
            } else {
                Status::Failure
            }
        });
        manager
            .define_tree("test", "root", [action("root", "alternate")])
            .unwrap();

        let mut engine = Engine::new(10, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(e, BehaviorTree::new("test"))
            .unwrap();
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&statuses);
        engine.add_boxed_system(
            "bt",
            bt_system(
                Rc::clone(&manager),
                Some(Box::new(move |_w, _c, entity, status| {
                    sink.borrow_mut().push((entity, status.to_owned()));
                })),
            ),
        );

        engine.run(4).unwrap();
        // Running on ticks 1 and 3, failure on ticks 2 and 4.
        assert_eq!(
            *statuses.borrow(),
            vec![(e, "failure".to_owned()), (e, "failure".to_owned())]
        );
    }

    #[test]
    fn utility_system_writes_selection() {
        let manager = AiManager::new();
        manager.register_consideration("low", |_, _| 0.3);
        manager.register_consideration("high", |_, _| 0.8);
        manager.define_utility_action("rest", &["low"]);
        manager.define_utility_action("hunt", &["high"]);
        manager.define_utility_selector("brain", &["rest", "hunt"]);

        let mut engine = Engine::new(10, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(e, UtilityAgent::new("brain"))
            .unwrap();

        let selections = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&selections);
        engine.add_boxed_system(
            "utility",
            utility_system(
                Rc::clone(&manager),
                Some(Box::new(move |_w, _c, _e, name, score| {
                    sink.borrow_mut().push((name.to_owned(), score));
                })),
            ),
        );

        engine.step().unwrap();
        let agent = engine.world().get::<UtilityAgent>(e).unwrap();
        assert_eq!(agent.selected_action, "hunt");
        assert!((agent.score - 0.8).abs() < 1e-12);
        assert_eq!(selections.borrow().len(), 1);
    }

    #[test]
    fn empty_selector_writes_empty_and_skips_hook() {
        let manager = AiManager::new();
        manager.define_utility_selector("empty", &[]);

        let mut engine = Engine::new(10, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(e, UtilityAgent::new("empty"))
            .unwrap();

        let called = Rc::new(Cell::new(false));
        let sink = Rc::clone(&called);
        engine.add_boxed_system(
            "utility",
            utility_system(
                Rc::clone(&manager),
                Some(Box::new(move |_w, _c, _e, _n, _s| sink.set(true))),
            ),
        );

        engine.step().unwrap();
        let agent = engine.world().get::<UtilityAgent>(e).unwrap();
        assert_eq!(agent.selected_action, "");
        assert_eq!(agent.score, 0.0);
        assert!(!called.get());
    }
}
