//! One-shot timers and recurring periodic countdowns as components.

use serde::{Deserialize, Serialize};
use tick_ecs::prelude::*;

use crate::clock::TickContext;
use crate::engine::System;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// One-shot countdown. Fires when `remaining` reaches 0, then auto-detaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
    pub name: String,
    pub remaining: u32,
}

impl Component for Timer {
    const NAME: &'static str = "schedule.Timer";
}

/// Recurring timer. Fires every `interval` ticks, never auto-detaches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Periodic {
    pub name: String,
    pub interval: u32,
    pub elapsed: u32,
}

impl Periodic {
    pub fn new(name: impl Into<String>, interval: u32) -> Self {
        Self {
            name: name.into(),
            interval,
            elapsed: 0,
        }
    }
}

impl Component for Periodic {
    const NAME: &'static str = "schedule.Periodic";
}

// ---------------------------------------------------------------------------
// System factories
// ---------------------------------------------------------------------------

/// Callback fired when a [`Timer`] expires or a [`Periodic`] rolls over.
pub type TimerHook<T> = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &T)>;

/// A system that decrements every [`Timer`] and fires `on_fire` exactly once
/// at zero, detaching the component first.
pub fn timer_system(
    mut on_fire: impl FnMut(&mut World, &TickContext<'_>, EntityId, &Timer) + 'static,
) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let targets: Vec<EntityId> = world.query::<(Timer,)>().map(|(e, _)| e).collect();
        for entity in targets {
            let fired = match world.get_mut::<Timer>(entity) {
                Ok(timer) => {
                    timer.remaining = timer.remaining.saturating_sub(1);
                    timer.remaining == 0
                }
                // Detached or despawned by an earlier callback this tick.
                Err(_) => continue,
            };
            if fired {
                if let Some(timer) = world.detach::<Timer>(entity)? {
                    on_fire(world, ctx, entity, &timer);
                }
            }
        }
        Ok(())
    })
}

/// A system that advances every [`Periodic`] and fires `on_fire` each time
/// `elapsed` reaches `interval`, then resets `elapsed` to 0.
pub fn periodic_system(
    mut on_fire: impl FnMut(&mut World, &TickContext<'_>, EntityId, &Periodic) + 'static,
) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let targets: Vec<EntityId> = world.query::<(Periodic,)>().map(|(e, _)| e).collect();
        for entity in targets {
            let fired = match world.get_mut::<Periodic>(entity) {
                Ok(periodic) => {
                    periodic.elapsed += 1;
                    if periodic.elapsed >= periodic.interval {
                        let snapshot = periodic.clone();
                        periodic.elapsed = 0;
                        Some(snapshot)
                    } else {
                        None
                    }
                }
                Err(_) => continue,
            };
            if let Some(periodic) = fired {
                on_fire(world, ctx, entity, &periodic);
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
    use crate::engine::Engine;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn timer_fires_once_and_detaches() {
        let mut engine = Engine::new(20, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(
                e,
                Timer {
                    name: "t".to_owned(),
                    remaining: 3,
                },
            )
            .unwrap();

        let fired = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&fired);
        engine.add_boxed_system(
            "timers",
            timer_system(move |_w, ctx, entity, timer| {
                sink.borrow_mut()
                    .push((entity, timer.name.clone(), ctx.tick_number));
            }),
        );

        engine.run(5).unwrap();
        assert_eq!(*fired.borrow(), vec![(e, "t".to_owned(), 3)]);
        assert!(!engine.world().has::<Timer>(e));
    }

    #[test]
    fn timer_remaining_strictly_decreases() {
        let mut engine = Engine::new(20, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(
                e,
                Timer {
                    name: "t".to_owned(),
                    remaining: 4,
                },
            )
            .unwrap();
        engine.add_boxed_system("timers", timer_system(|_w, _c, _e, _t| {}));

        let mut last = 4;
        for _ in 0..3 {
            engine.step().unwrap();
            let remaining = engine.world().get::<Timer>(e).unwrap().remaining;
            assert!(remaining < last);
            last = remaining;
        }
    }

    #[test]
    fn periodic_fires_every_interval_and_persists() {
        let mut engine = Engine::new(20, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(e, Periodic::new("pulse", 3))
            .unwrap();

        let ticks = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&ticks);
        engine.add_boxed_system(
            "periodics",
            periodic_system(move |_w, ctx, _e, _p| sink.borrow_mut().push(ctx.tick_number)),
        );

        engine.run(10).unwrap();
        assert_eq!(*ticks.borrow(), vec![3, 6, 9]);
        assert!(engine.world().has::<Periodic>(e));
        assert_eq!(engine.world().get::<Periodic>(e).unwrap().elapsed, 1);
    }

    #[test]
    fn callback_may_respawn_a_timer() {
        let mut engine = Engine::new(20, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine
            .world_mut()
            .attach(
                e,
                Timer {
                    name: "again".to_owned(),
                    remaining: 2,
                },
            )
            .unwrap();

        let count = Rc::new(std::cell::Cell::new(0u32));
        let sink = Rc::clone(&count);
        engine.add_boxed_system(
            "timers",
            timer_system(move |world, _ctx, entity, timer| {
                sink.set(sink.get() + 1);
                if sink.get() < 3 {
                    let _ = world.attach(entity, timer.clone_reset(2));
                }
            }),
        );

        engine.run(10).unwrap();
        assert_eq!(count.get(), 3);
    }

    impl Timer {
        fn clone_reset(&self, remaining: u32) -> Timer {
            Timer {
                name: self.name.clone(),
                remaining,
            }
        }
    }
}
