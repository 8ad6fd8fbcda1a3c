//! Deferred pub/sub signal bus.
//!
//! Publishing appends to a FIFO queue and never calls handlers inline;
//! delivery happens when [`SignalBus::flush`] runs -- ordinarily from the
//! [`signal_system`] placed wherever in the pipeline the embedder wants
//! signals delivered. Signals published *during* a flush are deferred to the
//! next flush.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tick_ecs::world::World;

use crate::clock::TickContext;
use crate::engine::System;

/// Payload of a signal: a JSON object of named values.
pub type SignalData = serde_json::Map<String, serde_json::Value>;

type HandlerCell = RefCell<Box<dyn FnMut(&str, &SignalData)>>;

/// Token returned by [`SignalBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

// ---------------------------------------------------------------------------
// SignalBus
// ---------------------------------------------------------------------------

/// Name-addressed, deferred pub/sub bus.
///
/// Owned by the embedder and shared into system factories via `Rc`; the
/// interior-mutability API keeps handler invocation reentrancy-safe, so a
/// handler may publish or subscribe while a flush is in progress.
#[derive(Default)]
pub struct SignalBus {
    subscribers: RefCell<HashMap<String, Vec<(HandlerId, Rc<HandlerCell>)>>>,
    queue: RefCell<VecDeque<(String, SignalData)>>,
    next_id: Cell<u64>,
}

impl SignalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a handler to a signal name. Handlers for one name run in
    /// subscription order.
    pub fn subscribe(
        &self,
        signal_name: &str,
        handler: impl FnMut(&str, &SignalData) + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.subscribers
            .borrow_mut()
            .entry(signal_name.to_owned())
            .or_default()
            .push((id, Rc::new(RefCell::new(Box::new(handler)))));
        id
    }

    /// Remove a handler. Unknown ids and names are a no-op.
    pub fn unsubscribe(&self, signal_name: &str, id: HandlerId) {
        if let Some(handlers) = self.subscribers.borrow_mut().get_mut(signal_name) {
            handlers.retain(|(hid, _)| *hid != id);
        }
    }

    /// Queue a signal for the next flush. Handlers are not called here.
    pub fn publish(&self, signal_name: &str, data: SignalData) {
        self.queue
            .borrow_mut()
            .push_back((signal_name.to_owned(), data));
    }

    /// Number of queued, un-flushed signals.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Deliver every queued signal in FIFO order.
    ///
    /// The queue is snapshotted and cleared first, so anything published by
    /// a handler lands in the next flush.
    pub fn flush(&self) {
        let batch: Vec<(String, SignalData)> = self.queue.borrow_mut().drain(..).collect();
        for (name, data) in batch {
            let handlers: Vec<Rc<HandlerCell>> = self
                .subscribers
                .borrow()
                .get(&name)
                .map(|list| list.iter().map(|(_, h)| Rc::clone(h)).collect())
                .unwrap_or_default();
            for handler in handlers {
                (handler.borrow_mut())(&name, &data);
            }
        }
    }

    /// Discard all queued, un-flushed signals.
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }
}

// ---------------------------------------------------------------------------
// System factory
// ---------------------------------------------------------------------------

/// A system that flushes the bus once per tick. Its position in the system
/// list is the delivery point within the tick -- an ordering contract the
/// embedder owns.
pub fn signal_system(bus: Rc<SignalBus>) -> System {
    Box::new(move |_world: &mut World, _ctx: &TickContext<'_>| {
        bus.flush();
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn data(key: &str, value: i64) -> SignalData {
        let mut map = SignalData::new();
        map.insert(key.to_owned(), serde_json::json!(value));
        map
    }

    #[test]
    fn publish_defers_until_flush() {
        let bus = SignalBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe("ping", move |name, data| {
            sink.borrow_mut().push((name.to_owned(), data["n"].clone()));
        });

        bus.publish("ping", data("n", 1));
        assert!(seen.borrow().is_empty());
        assert_eq!(bus.pending(), 1);

        bus.flush();
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn flush_delivers_in_fifo_order() {
        let bus = SignalBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for signal in ["a", "b"] {
            let sink = Rc::clone(&seen);
            bus.subscribe(signal, move |name, _| sink.borrow_mut().push(name.to_owned()));
        }
        bus.publish("b", SignalData::new());
        bus.publish("a", SignalData::new());
        bus.publish("b", SignalData::new());
        bus.flush();
        assert_eq!(*seen.borrow(), vec!["b", "a", "b"]);
    }

    #[test]
    fn handlers_for_one_name_run_in_subscription_order() {
        let bus = SignalBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in [1, 2, 3] {
            let sink = Rc::clone(&seen);
            bus.subscribe("ping", move |_, _| sink.borrow_mut().push(tag));
        }
        bus.publish("ping", SignalData::new());
        bus.flush();
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn publish_during_flush_defers_to_next_flush() {
        let bus = Rc::new(SignalBus::new());
        let count = Rc::new(Cell::new(0));

        let bus_inner = Rc::clone(&bus);
        let count_inner = Rc::clone(&count);
        bus.subscribe("ping", move |_, _| {
            count_inner.set(count_inner.get() + 1);
            if count_inner.get() == 1 {
                bus_inner.publish("ping", SignalData::new());
            }
        });

        bus.publish("ping", SignalData::new());
        bus.flush();
        assert_eq!(count.get(), 1, "re-published signal must wait");
        assert_eq!(bus.pending(), 1);
        bus.flush();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery_and_unknown_is_noop() {
        let bus = SignalBus::new();
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        let id = bus.subscribe("ping", move |_, _| sink.set(sink.get() + 1));

        bus.unsubscribe("ping", id);
        bus.unsubscribe("ping", id); // already gone
        bus.unsubscribe("other", id); // unknown name

        bus.publish("ping", SignalData::new());
        bus.flush();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn clear_discards_queued_signals() {
        let bus = SignalBus::new();
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        bus.subscribe("ping", move |_, _| sink.set(sink.get() + 1));
        bus.publish("ping", SignalData::new());
        bus.clear();
        bus.flush();
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn signal_system_flushes_each_tick() {
        use crate::engine::Engine;

        let bus = Rc::new(SignalBus::new());
        let count = Rc::new(Cell::new(0));
        let sink = Rc::clone(&count);
        bus.subscribe("tick", move |_, _| sink.set(sink.get() + 1));

        let mut engine = Engine::new(20, Some(1)).unwrap();
        let publisher = Rc::clone(&bus);
        engine.add_system("emit", move |_w, _c| {
            publisher.publish("tick", SignalData::new());
            Ok(())
        });
        engine.add_boxed_system("signals", signal_system(Rc::clone(&bus)));

        engine.run(3).unwrap();
        assert_eq!(count.get(), 3);
    }
}
