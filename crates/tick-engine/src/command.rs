//! Typed command queue and footprint utilities.
//!
//! External input enters the simulation as plain command values enqueued
//! between ticks. Each command type gets exactly one handler, dispatched by
//! `TypeId` -- exact type, no inheritance. The command system drains the
//! queue once per tick in FIFO order; a command without a handler fails the
//! tick.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tick_ecs::world::World;

use crate::clock::TickContext;
use crate::engine::System;
use crate::EngineError;

// ---------------------------------------------------------------------------
// CommandQueue
// ---------------------------------------------------------------------------

type HandlerFn = Box<dyn FnMut(&dyn Any, &mut World, &TickContext<'_>) -> bool>;

/// Routes external commands to typed handlers during the tick loop.
///
/// Commands are arbitrary `'static` values; the queue imposes no base trait.
#[derive(Default)]
pub struct CommandQueue {
    handlers: RefCell<HashMap<TypeId, HandlerFn>>,
    pending: RefCell<VecDeque<(TypeId, &'static str, Box<dyn Any>)>>,
}

impl CommandQueue {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register the handler for command type `C`. Later calls overwrite.
    ///
    /// The handler returns `true` to accept the command, `false` to reject.
    pub fn handle<C: 'static>(
        &self,
        mut handler: impl FnMut(&C, &mut World, &TickContext<'_>) -> bool + 'static,
    ) {
        self.handlers.borrow_mut().insert(
            TypeId::of::<C>(),
            Box::new(move |cmd, world, ctx| match cmd.downcast_ref::<C>() {
                Some(cmd) => handler(cmd, world, ctx),
                None => false,
            }),
        );
    }

    /// Append a command to the FIFO. Safe to call between ticks.
    pub fn enqueue<C: 'static>(&self, cmd: C) {
        self.pending.borrow_mut().push_back((
            TypeId::of::<C>(),
            std::any::type_name::<C>(),
            Box::new(cmd),
        ));
    }

    /// Number of commands waiting to be processed.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Process all pending commands in FIFO order, including commands
    /// enqueued by handlers during the drain.
    ///
    /// # Errors
    ///
    /// [`EngineError::NoHandler`] naming the command type when no handler is
    /// registered for it.
    pub fn drain(
        &self,
        world: &mut World,
        ctx: &TickContext<'_>,
    ) -> Result<Vec<(Box<dyn Any>, bool)>, EngineError> {
        let mut results = Vec::new();
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some((type_id, type_name, cmd)) = next else {
                break;
            };
            let accepted = {
                let mut handlers = self.handlers.borrow_mut();
                let handler = handlers
                    .get_mut(&type_id)
                    .ok_or_else(|| EngineError::NoHandler(type_name.to_owned()))?;
                handler(cmd.as_ref(), world, ctx)
            };
            results.push((cmd, accepted));
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// System factory
// ---------------------------------------------------------------------------

/// Hook receiving the processed command after its handler ran.
pub type CommandHook = Box<dyn FnMut(&dyn Any)>;

/// A system that drains the queue each tick, routing accepted commands to
/// `on_accept` and rejected ones to `on_reject`.
pub fn command_system(
    queue: Rc<CommandQueue>,
    mut on_accept: Option<CommandHook>,
    mut on_reject: Option<CommandHook>,
) -> System {
    Box::new(move |world: &mut World, ctx: &TickContext<'_>| {
        for (cmd, accepted) in queue.drain(world, ctx)? {
            let hook = if accepted {
                on_accept.as_mut()
            } else {
                on_reject.as_mut()
            };
            if let Some(hook) = hook {
                hook(cmd.as_ref());
            }
        }
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Footprint utilities
// ---------------------------------------------------------------------------

/// An absolute or relative integer coordinate of any dimensionality.
pub type Coord = Vec<i64>;

/// Either a rectangular extent or an explicit list of relative offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FootprintShape {
    /// Rectangular `(w, h, ...)` extents, one per axis.
    Dimensions(Vec<u32>),
    /// Relative offsets translated by the origin.
    Offsets(Vec<Coord>),
}

/// Expand a rectangular footprint from `origin` with per-axis `dimensions`.
///
/// Covers `[origin, origin + dimensions)` in axis-major order:
/// `expand_footprint(&[5, 3], &[2, 2])` yields
/// `[[5, 3], [5, 4], [6, 3], [6, 4]]`.
///
/// # Errors
///
/// [`EngineError::BadInput`] when arities differ or any dimension is zero.
pub fn expand_footprint(origin: &[i64], dimensions: &[u32]) -> Result<Vec<Coord>, EngineError> {
    if origin.len() != dimensions.len() {
        return Err(EngineError::BadInput(format!(
            "origin has {} dimensions but dimensions has {}",
            origin.len(),
            dimensions.len()
        )));
    }
    if let Some(zero) = dimensions.iter().find(|&&d| d == 0) {
        return Err(EngineError::BadInput(format!(
            "all dimensions must be >= 1, got {zero}"
        )));
    }
    Ok(expand_axis(origin.to_vec(), dimensions, 0))
}

fn expand_axis(origin: Coord, dimensions: &[u32], axis: usize) -> Vec<Coord> {
    if axis == dimensions.len() {
        return vec![origin];
    }
    let mut results = Vec::new();
    for step in 0..i64::from(dimensions[axis]) {
        let mut shifted = origin.clone();
        shifted[axis] += step;
        results.extend(expand_axis(shifted, dimensions, axis + 1));
    }
    results
}

/// Normalize either shape form to absolute coordinates.
///
/// # Errors
///
/// [`EngineError::BadInput`] for zero dimensions or arity mismatches,
/// including any offset whose arity differs from the origin's.
pub fn resolve_footprint(origin: &[i64], shape: &FootprintShape) -> Result<Vec<Coord>, EngineError> {
    match shape {
        FootprintShape::Dimensions(dims) => expand_footprint(origin, dims),
        FootprintShape::Offsets(offsets) => {
            let mut result = Vec::with_capacity(offsets.len());
            for offset in offsets {
                if offset.len() != origin.len() {
                    return Err(EngineError::BadInput(format!(
                        "offset has {} dimensions but origin has {}",
                        offset.len(),
                        origin.len()
                    )));
                }
                result.push(
                    origin
                        .iter()
                        .zip(offset)
                        .map(|(o, d)| o + d)
                        .collect::<Coord>(),
                );
            }
            Ok(result)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq)]
    struct Build {
        what: &'static str,
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Demolish {
        target: u64,
    }

    #[test]
    fn commands_dispatch_by_exact_type_in_fifo_order() {
        let queue = CommandQueue::new();
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&log);
        queue.handle::<Build>(move |cmd, _w, _c| {
            sink.borrow_mut().push(format!("build:{}", cmd.what));
            true
        });
        let sink = Rc::clone(&log);
        queue.handle::<Demolish>(move |cmd, _w, _c| {
            sink.borrow_mut().push(format!("demolish:{}", cmd.target));
            true
        });

        queue.enqueue(Build { what: "farm" });
        queue.enqueue(Demolish { target: 3 });
        queue.enqueue(Build { what: "well" });
        assert_eq!(queue.pending(), 3);

        let mut engine = Engine::new(20, Some(1)).unwrap();
        engine.add_boxed_system("commands", command_system(Rc::clone(&queue), None, None));
        engine.step().unwrap();

        assert_eq!(
            *log.borrow(),
            vec!["build:farm", "demolish:3", "build:well"]
        );
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn missing_handler_fails_the_tick() {
        let queue = CommandQueue::new();
        queue.enqueue(Build { what: "farm" });

        let mut engine = Engine::new(20, Some(1)).unwrap();
        engine.add_boxed_system("commands", command_system(Rc::clone(&queue), None, None));
        let err = engine.step().unwrap_err();
        assert!(matches!(err, EngineError::NoHandler(_)));
    }

    #[test]
    fn accept_and_reject_hooks_fire_appropriately() {
        let queue = CommandQueue::new();
        queue.handle::<Build>(|cmd, _w, _c| cmd.what == "farm");
        queue.enqueue(Build { what: "farm" });
        queue.enqueue(Build { what: "volcano" });

        let accepted = Rc::new(Cell::new(0u32));
        let rejected = Rc::new(Cell::new(0u32));
        let a = Rc::clone(&accepted);
        let r = Rc::clone(&rejected);

        let mut engine = Engine::new(20, Some(1)).unwrap();
        engine.add_boxed_system(
            "commands",
            command_system(
                Rc::clone(&queue),
                Some(Box::new(move |_| a.set(a.get() + 1))),
                Some(Box::new(move |_| r.set(r.get() + 1))),
            ),
        );
        engine.step().unwrap();
        assert_eq!((accepted.get(), rejected.get()), (1, 1));
    }

    #[test]
    fn handlers_can_enqueue_followups_within_the_same_drain() {
        let queue = CommandQueue::new();
        let inner = Rc::clone(&queue);
        let handled = Rc::new(Cell::new(0u32));
        let sink = Rc::clone(&handled);
        queue.handle::<Build>(move |cmd, _w, _c| {
            sink.set(sink.get() + 1);
            if cmd.what == "farm" {
                inner.enqueue(Build { what: "fence" });
            }
            true
        });
        queue.enqueue(Build { what: "farm" });

        let mut engine = Engine::new(20, Some(1)).unwrap();
        engine.add_boxed_system("commands", command_system(Rc::clone(&queue), None, None));
        engine.step().unwrap();
        assert_eq!(handled.get(), 2);
    }

    // -- footprints ---------------------------------------------------------

    #[test]
    fn expand_rectangular_footprint() {
        let coords = expand_footprint(&[5, 3], &[2, 2]).unwrap();
        assert_eq!(
            coords,
            vec![vec![5, 3], vec![5, 4], vec![6, 3], vec![6, 4]]
        );
    }

    #[test]
    fn expand_single_cell_and_3d() {
        assert_eq!(expand_footprint(&[1, 1], &[1, 1]).unwrap(), vec![vec![1, 1]]);
        let coords = expand_footprint(&[0, 0, 0], &[2, 1, 2]).unwrap();
        assert_eq!(coords.len(), 4);
    }

    #[test]
    fn zero_dimension_rejected() {
        assert!(matches!(
            expand_footprint(&[0, 0], &[2, 0]),
            Err(EngineError::BadInput(_))
        ));
    }

    #[test]
    fn arity_mismatch_rejected() {
        assert!(matches!(
            expand_footprint(&[0, 0], &[2]),
            Err(EngineError::BadInput(_))
        ));
        let shape = FootprintShape::Offsets(vec![vec![0]]);
        assert!(matches!(
            resolve_footprint(&[0, 0], &shape),
            Err(EngineError::BadInput(_))
        ));
    }

    #[test]
    fn resolve_offsets_translates() {
        let shape = FootprintShape::Offsets(vec![vec![0, 0], vec![1, 0], vec![0, -1]]);
        let coords = resolve_footprint(&[10, 10], &shape).unwrap();
        assert_eq!(coords, vec![vec![10, 10], vec![11, 10], vec![10, 9]]);
    }
}
