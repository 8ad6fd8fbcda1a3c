//! Time-interpolation of a numeric field of another component.
//!
//! A [`Tween`] names a target component type (by its stable registered name)
//! and a field on it. Each tick the tween system maps progress through an
//! easing curve and writes the interpolated value into the target via the
//! world's name-indexed field writer. Unknown target types or fields
//! silently no-op that entity.

use serde::{Deserialize, Serialize};
use tick_ecs::prelude::*;

use crate::clock::TickContext;
use crate::engine::System;

// ---------------------------------------------------------------------------
// Easing functions
// ---------------------------------------------------------------------------
//
// All easings satisfy f(0) = 0 and f(1) = 1 over t in [0, 1].

pub fn linear(t: f64) -> f64 {
    t
}

pub fn ease_in(t: f64) -> f64 {
    t * t
}

pub fn ease_out(t: f64) -> f64 {
    t * (2.0 - t)
}

pub fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

/// Look up an easing function by name.
pub fn easing(name: &str) -> Option<fn(f64) -> f64> {
    match name {
        "linear" => Some(linear),
        "ease_in" => Some(ease_in),
        "ease_out" => Some(ease_out),
        "ease_in_out" => Some(ease_in_out),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Interpolates `field` of the component registered under `target` from
/// `start` to `end` over `duration` ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tween {
    /// Registered name of the target component type.
    pub target: String,
    /// Field on the target component. Must be numeric.
    pub field: String,
    pub start: f64,
    pub end: f64,
    pub duration: u32,
    pub elapsed: u32,
    /// Easing name; unknown names skip the entity.
    pub easing: String,
}

impl Tween {
    pub fn new(
        target: impl Into<String>,
        field: impl Into<String>,
        start: f64,
        end: f64,
        duration: u32,
    ) -> Self {
        Self {
            target: target.into(),
            field: field.into(),
            start,
            end,
            duration,
            elapsed: 0,
            easing: "linear".to_owned(),
        }
    }

    pub fn with_easing(mut self, easing: impl Into<String>) -> Self {
        self.easing = easing.into();
        self
    }
}

impl Component for Tween {
    const NAME: &'static str = "tween.Tween";
}

// ---------------------------------------------------------------------------
// System factory
// ---------------------------------------------------------------------------

/// Callback fired after a tween writes its final value and detaches.
pub type TweenHook = Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &Tween)>;

/// A system that advances every [`Tween`] one tick.
///
/// On the completing tick the end value is written exactly, the tween is
/// detached, and `on_complete` (if any) fires. A tween whose target write
/// fails stays attached and keeps counting, matching the lookup-by-name
/// contract: missing pieces no-op rather than error.
pub fn tween_system(mut on_complete: Option<TweenHook>) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let targets: Vec<EntityId> = world.query::<(Tween,)>().map(|(e, _)| e).collect();
        for entity in targets {
            let tween = match world.get_mut::<Tween>(entity) {
                Ok(tween) => {
                    tween.elapsed += 1;
                    tween.clone()
                }
                Err(_) => continue,
            };

            let Some(ease) = easing(&tween.easing) else {
                continue;
            };
            let t = if tween.duration == 0 {
                1.0
            } else {
                (f64::from(tween.elapsed) / f64::from(tween.duration)).min(1.0)
            };
            let value = tween.start + (tween.end - tween.start) * ease(t);

            if !world.set_field_by_name(entity, &tween.target, &tween.field, value) {
                continue;
            }

            if tween.elapsed >= tween.duration {
                world.set_field_by_name(entity, &tween.target, &tween.field, tween.end);
                world.detach::<Tween>(entity)?;
                if let Some(hook) = on_complete.as_mut() {
                    hook(world, ctx, entity, &tween);
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
    use crate::engine::Engine;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Alpha {
        value: f64,
    }

    impl Component for Alpha {
        const NAME: &'static str = "test.Alpha";
    }

    fn tween_engine(tween: Tween) -> (Engine, EntityId) {
        let mut engine = Engine::new(20, Some(1)).unwrap();
        let e = engine.world_mut().spawn();
        engine.world_mut().attach(e, Alpha { value: 0.0 }).unwrap();
        engine.world_mut().attach(e, tween).unwrap();
        (engine, e)
    }

    #[test]
    fn easings_hit_endpoints() {
        for name in ["linear", "ease_in", "ease_out", "ease_in_out"] {
            let f = easing(name).unwrap();
            assert_eq!(f(0.0), 0.0, "{name}(0)");
            assert!((f(1.0) - 1.0).abs() < 1e-12, "{name}(1)");
        }
        assert!(easing("bounce").is_none());
    }

    #[test]
    fn linear_tween_interpolates_and_detaches() {
        let (mut engine, e) = tween_engine(Tween::new("test.Alpha", "value", 0.0, 10.0, 4));
        engine.add_boxed_system("tweens", tween_system(None));

        engine.step().unwrap();
        assert!((engine.world().get::<Alpha>(e).unwrap().value - 2.5).abs() < 1e-9);
        engine.step().unwrap();
        assert!((engine.world().get::<Alpha>(e).unwrap().value - 5.0).abs() < 1e-9);

        engine.run(2).unwrap();
        assert_eq!(engine.world().get::<Alpha>(e).unwrap().value, 10.0);
        assert!(!engine.world().has::<Tween>(e));
    }

    #[test]
    fn end_value_is_exact_and_on_complete_fires_once() {
        let (mut engine, e) =
            tween_engine(Tween::new("test.Alpha", "value", 0.0, 1.0, 3).with_easing("ease_in_out"));
        let completions = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&completions);
        engine.add_boxed_system(
            "tweens",
            tween_system(Some(Box::new(move |_w, _c, _e, _t| {
                sink.set(sink.get() + 1);
            }))),
        );

        engine.run(10).unwrap();
        assert_eq!(engine.world().get::<Alpha>(e).unwrap().value, 1.0);
        assert_eq!(completions.get(), 1);
    }

    #[test]
    fn unknown_target_type_noops() {
        let (mut engine, e) = tween_engine(Tween::new("test.Ghost", "value", 0.0, 1.0, 2));
        engine.add_boxed_system("tweens", tween_system(None));
        engine.run(5).unwrap();
        // Tween stays attached; nothing was written.
        assert!(engine.world().has::<Tween>(e));
        assert_eq!(engine.world().get::<Alpha>(e).unwrap().value, 0.0);
    }

    #[test]
    fn unknown_field_noops() {
        let (mut engine, e) = tween_engine(Tween::new("test.Alpha", "ghost", 0.0, 1.0, 2));
        engine.add_boxed_system("tweens", tween_system(None));
        engine.run(5).unwrap();
        assert!(engine.world().has::<Tween>(e));
    }

    #[test]
    fn unknown_easing_skips_entity() {
        let (mut engine, e) =
            tween_engine(Tween::new("test.Alpha", "value", 0.0, 1.0, 2).with_easing("bounce"));
        engine.add_boxed_system("tweens", tween_system(None));
        engine.run(5).unwrap();
        assert!(engine.world().has::<Tween>(e));
        assert_eq!(engine.world().get::<Alpha>(e).unwrap().value, 0.0);
    }
}
