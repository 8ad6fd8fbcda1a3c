//! The per-tick LLM system: completion handling, timeouts, and
//! rate-limited dispatch.

use std::rc::Rc;

use tick_ecs::prelude::*;

use crate::ai::components::Blackboard;
use crate::clock::TickContext;
use crate::engine::System;
use crate::llm::client::LlmError;
use crate::llm::components::LlmAgent;
use crate::llm::manager::LlmManager;
use crate::llm::parsers::default_json_parser;

/// Callbacks observed by the LLM system. All optional.
#[derive(Default)]
pub struct LlmHooks {
    /// Fired on query dispatch.
    pub on_query: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId)>>,
    /// Fired after a response parsed successfully, with the latency in
    /// seconds.
    pub on_response: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, f64)>>,
    /// Fired on a client error, timeout, or parse failure.
    pub on_error: Option<Box<dyn FnMut(&mut World, &TickContext<'_>, EntityId, &LlmError)>>,
}

/// A system driving all [`LlmAgent`] entities:
///
/// 1. Drain completed queries; run the named (or default) parser into the
///    entity's [`Blackboard`] and fire `on_response`, or count the error.
/// 2. Expire timed-out queries through the same error path.
/// 3. Dispatch due agents in descending priority order, under both the
///    per-tick and sliding-window rate limits. Agents whose role,
///    personality, or context is unregistered are skipped.
///
/// Errors increment `consecutive_errors`; hitting `max_retries` starts a
/// cooldown of `cooldown_ticks` and resets the counter. This system is the
/// one place client failures are caught instead of aborting the tick.
pub fn llm_system(manager: Rc<LlmManager>, mut hooks: LlmHooks) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        let tick = ctx.tick_number;

        // 1. Completions.
        for outcome in manager.poll() {
            let entity = outcome.entity;
            let Ok(agent) = world.get::<LlmAgent>(entity) else {
                tracing::warn!(%entity, "llm result for a missing agent; dropped");
                continue;
            };
            if !agent.pending {
                tracing::warn!(%entity, "late llm result for a non-pending agent; dropped");
                continue;
            }
            let parser_name = agent.parser.clone();

            let result = outcome.outcome.and_then(|text| {
                let mut blackboard = world
                    .detach::<Blackboard>(entity)
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                let parsed = if parser_name.is_empty() {
                    default_json_parser(&text, &mut blackboard)
                } else {
                    match manager.parser(&parser_name) {
                        Some(parser) => parser(&text, &mut blackboard),
                        None => Err(LlmError::Parse(format!("unknown parser '{parser_name}'"))),
                    }
                };
                let _ = world.attach(entity, blackboard);
                parsed
            });

            match result {
                Ok(()) => {
                    if let Ok(agent) = world.get_mut::<LlmAgent>(entity) {
                        agent.pending = false;
                        agent.consecutive_errors = 0;
                    }
                    if let Some(hook) = hooks.on_response.as_mut() {
                        hook(world, ctx, entity, outcome.latency);
                    }
                }
                Err(error) => {
                    record_error(world, entity, tick, &error, &mut hooks, ctx);
                }
            }
        }

        // 2. Timeouts.
        for entity in manager.take_timed_out() {
            let pending = world
                .get::<LlmAgent>(entity)
                .map(|agent| agent.pending)
                .unwrap_or(false);
            if pending {
                let error = LlmError::Timeout(manager.config().query_timeout);
                record_error(world, entity, tick, &error, &mut hooks, ctx);
            }
        }

        // 3. Dispatch.
        let mut candidates: Vec<(i32, EntityId)> = world
            .query::<(LlmAgent,)>()
            .filter(|(_, (agent,))| {
                !agent.pending
                    && tick >= agent.cooldown_until
                    && tick >= agent.last_query_tick + agent.query_interval
            })
            .map(|(entity, (agent,))| (agent.priority, entity))
            .collect();
        // Descending priority, entity order breaking ties.
        candidates.sort_by_key(|&(priority, entity)| (-priority, entity));

        let window_ticks = (1.0 / ctx.dt).round().max(1.0) as u64;
        let mut dispatched = 0usize;
        for (_, entity) in candidates {
            if dispatched >= manager.config().max_queries_per_tick {
                break;
            }
            {
                let mut window = manager.dispatch_ticks.borrow_mut();
                while window
                    .front()
                    .map(|&t| t + window_ticks <= tick)
                    .unwrap_or(false)
                {
                    window.pop_front();
                }
                if window.len() >= manager.config().max_queries_per_second {
                    break;
                }
            }

            let Ok(agent) = world.get::<LlmAgent>(entity) else {
                continue;
            };
            let (role, personality, context) = (
                agent.role.clone(),
                agent.personality.clone(),
                agent.context.clone(),
            );
            let Some((system_prompt, user_message)) =
                manager.assemble_prompt(world, entity, &role, &personality, &context)
            else {
                continue;
            };

            manager.submit(entity, system_prompt, user_message)?;
            if let Ok(agent) = world.get_mut::<LlmAgent>(entity) {
                agent.pending = true;
                agent.last_query_tick = tick;
            }
            manager.dispatch_ticks.borrow_mut().push_back(tick);
            dispatched += 1;
            if let Some(hook) = hooks.on_query.as_mut() {
                hook(world, ctx, entity);
            }
        }

        Ok(())
    })
}

fn record_error(
    world: &mut World,
    entity: EntityId,
    tick: u64,
    error: &LlmError,
    hooks: &mut LlmHooks,
    ctx: &TickContext<'_>,
) {
    if let Ok(agent) = world.get_mut::<LlmAgent>(entity) {
        agent.pending = false;
        agent.consecutive_errors += 1;
        if agent.consecutive_errors >= agent.max_retries {
            agent.cooldown_until = tick + agent.cooldown_ticks;
            agent.consecutive_errors = 0;
        }
    }
    if let Some(hook) = hooks.on_error.as_mut() {
        hook(world, ctx, entity, error);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
