//! Pressure monitor: re-queries the strategic layer when colony state
//! shifts abruptly.
//!
//! Every `check_interval` ticks the monitor compares total inventory
//! resources, population, recent event-log bursts, and any custom metrics
//! against thresholds. On a significant change it zeroes `cooldown_until`
//! and `last_query_tick` on every [`LlmAgent`] at or above `min_priority`,
//! which makes those agents due for dispatch on the next LLM-system run.

use std::rc::Rc;

use tick_ecs::prelude::*;

use crate::clock::TickContext;
use crate::coordinator::EventLog;
use crate::engine::System;
use crate::llm::components::LlmAgent;
use crate::resource::Inventory;

/// Thresholds for pressure detection.
pub struct PressureThresholds {
    /// Relative change in summed inventory totals.
    pub resource_change: f64,
    /// Relative change in alive-entity count.
    pub population_change: f64,
    /// Event kinds counted toward a burst.
    pub event_types: Vec<String>,
    /// Number of matching events since the last check that counts as a
    /// burst.
    pub event_burst: usize,
    /// Custom metrics: fire when the metric reaches 1.0.
    pub custom: Vec<(String, Box<dyn Fn(&World) -> f64>)>,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            resource_change: 0.2,
            population_change: 0.15,
            event_types: Vec::new(),
            event_burst: 5,
            custom: Vec::new(),
        }
    }
}

/// Callback fired when pressure triggers, with the kind of change and its
/// magnitude.
pub type PressureHook = Box<dyn FnMut(&mut World, u64, &str, f64)>;

/// A system monitoring colony pressure. Place it **before** the LLM system
/// so resets take effect in the same tick.
pub fn pressure_system(
    thresholds: PressureThresholds,
    event_log: Option<Rc<EventLog>>,
    check_interval: u64,
    min_priority: i32,
    mut on_pressure: Option<PressureHook>,
) -> System {
    let mut prev_resources: u64 = 0;
    let mut prev_population: usize = 0;
    let mut last_check_tick: u64 = 0;

    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        if ctx.tick_number - last_check_tick < check_interval.max(1) {
            return Ok(());
        }
        let tick = ctx.tick_number;
        let prev_tick = last_check_tick;
        last_check_tick = tick;

        // The checks form a first-match chain: once one fires, the checks
        // after it do not run this tick, so their baselines stay stale
        // until their next actual evaluation.
        let mut trigger: Option<(String, f64)> = None;

        // Resources: relative change in summed inventory totals.
        {
            let resources: u64 = world
                .query::<(Inventory,)>()
                .map(|(_, (inv,))| inv.total())
                .sum();
            let delta = relative_change(prev_resources, resources);
            let fired = prev_resources > 0 && delta >= thresholds.resource_change;
            prev_resources = resources;
            if fired {
                trigger = Some(("resource_change".to_owned(), delta));
            }
        }

        // Population: relative change in alive entities.
        if trigger.is_none() {
            let population = world.entity_count();
            let delta = relative_change(prev_population as u64, population as u64);
            let fired = prev_population > 0 && delta >= thresholds.population_change;
            prev_population = population;
            if fired {
                trigger = Some(("population_change".to_owned(), delta));
            }
        }

        // Event burst since the previous check.
        if trigger.is_none() {
            if let (Some(log), false) = (&event_log, thresholds.event_types.is_empty()) {
                let burst_count = log
                    .query(None, Some(prev_tick))
                    .iter()
                    .filter(|entry| thresholds.event_types.iter().any(|k| *k == entry.kind))
                    .count();
                if burst_count >= thresholds.event_burst {
                    trigger = Some(("event_burst".to_owned(), burst_count as f64));
                }
            }
        }

        // Custom metrics, in registration order.
        if trigger.is_none() {
            for (name, metric) in &thresholds.custom {
                let value = metric(world);
                if value >= 1.0 {
                    trigger = Some((name.clone(), value));
                    break;
                }
            }
        }

        let Some((kind, magnitude)) = trigger else {
            return Ok(());
        };

        let agents: Vec<EntityId> = world
            .query::<(LlmAgent,)>()
            .filter(|(_, (agent,))| agent.priority >= min_priority)
            .map(|(entity, _)| entity)
            .collect();
        for entity in agents {
            if let Ok(agent) = world.get_mut::<LlmAgent>(entity) {
                agent.cooldown_until = 0;
                agent.last_query_tick = 0;
            }
        }
        if let Some(hook) = on_pressure.as_mut() {
            hook(world, tick, &kind, magnitude);
        }
        Ok(())
    })
}

fn relative_change(previous: u64, current: u64) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    (current as f64 - previous as f64).abs() / previous as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
