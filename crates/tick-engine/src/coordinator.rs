//! Event log and the composite snapshot coordinator.
//!
//! The coordinator packages an engine snapshot together with the
//! serializable state of whichever auxiliary registries the embedder hands
//! it, under a single `colony` sibling in the value tree. Restore runs the
//! engine restore first, then each registry, then asks the spatial index to
//! rebuild itself from the restored positions.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ability::AbilityManager;
use crate::atlas::{CellMap, SpatialIndex};
use crate::engine::Engine;
use crate::event::EventScheduler;
use crate::resource::ResourceRegistry;
use crate::signal::{SignalBus, SignalData};
use crate::snapshot::EngineSnapshot;
use crate::EngineError;

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// One recorded world event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub tick: u64,
    pub kind: String,
    pub data: serde_json::Value,
}

/// Append-only, optionally bounded log of world events.
///
/// The log itself knows nothing about signals; [`bridge_signals`] wires a
/// bus subscription that records selected signals as entries.
#[derive(Default)]
pub struct EventLog {
    entries: RefCell<VecDeque<LogEntry>>,
    max_entries: usize,
    current_tick: std::cell::Cell<u64>,
}

impl EventLog {
    /// An unbounded log.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// A log keeping at most `max_entries` recent entries.
    pub fn bounded(max_entries: usize) -> Rc<Self> {
        Rc::new(Self {
            max_entries,
            ..Self::default()
        })
    }

    /// Append an entry.
    pub fn emit(&self, tick: u64, kind: &str, data: serde_json::Value) {
        let mut entries = self.entries.borrow_mut();
        entries.push_back(LogEntry {
            tick,
            kind: kind.to_owned(),
            data,
        });
        if self.max_entries > 0 {
            while entries.len() > self.max_entries {
                entries.pop_front();
            }
        }
    }

    /// Entries, optionally filtered by kind and strictly-after tick.
    pub fn query(&self, kind: Option<&str>, after: Option<u64>) -> Vec<LogEntry> {
        self.entries
            .borrow()
            .iter()
            .filter(|e| kind.map(|k| e.kind == k).unwrap_or(true))
            .filter(|e| after.map(|t| e.tick > t).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// The most recent entry of a kind.
    pub fn last(&self, kind: &str) -> Option<LogEntry> {
        self.entries
            .borrow()
            .iter()
            .rev()
            .find(|e| e.kind == kind)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// The tick stamped onto bridged signal entries. Advanced by the
    /// embedder (typically from an early system) so bus handlers, which see
    /// no tick context, can record accurate tick numbers.
    pub fn set_current_tick(&self, tick: u64) {
        self.current_tick.set(tick);
    }

    /// Serialize all entries.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!(self.entries.borrow().iter().collect::<Vec<_>>())
    }

    /// Restore entries from snapshot data.
    ///
    /// # Errors
    ///
    /// [`EngineError::Snapshot`] for a malformed value tree.
    pub fn restore(&self, data: &serde_json::Value) -> Result<(), EngineError> {
        let entries: Vec<LogEntry> = serde_json::from_value(data.clone())
            .map_err(|e| EngineError::Snapshot(format!("event log: {e}")))?;
        *self.entries.borrow_mut() = entries.into();
        Ok(())
    }
}

/// Subscribe the log to a set of signal names: each delivery is recorded as
/// an entry of the same kind, stamped with the log's current tick.
pub fn bridge_signals(log: &Rc<EventLog>, bus: &SignalBus, signals: &[&str]) {
    for signal in signals {
        let log = Rc::clone(log);
        bus.subscribe(signal, move |name: &str, data: &SignalData| {
            log.emit(
                log.current_tick.get(),
                name,
                serde_json::Value::Object(data.clone()),
            );
        });
    }
}

// ---------------------------------------------------------------------------
// SnapshotCoordinator
// ---------------------------------------------------------------------------

/// Aggregates an engine snapshot with auxiliary registry snapshots under a
/// `colony` sibling. Every part is optional; unknown sibling keys in
/// restored data are ignored.
#[derive(Default)]
pub struct SnapshotCoordinator {
    grid: Option<Rc<dyn SpatialIndex>>,
    event_log: Option<Rc<EventLog>>,
    scheduler: Option<Rc<EventScheduler>>,
    cellmap: Option<Rc<CellMap>>,
    abilities: Option<Rc<AbilityManager>>,
    resources: Option<Rc<ResourceRegistry>>,
}

impl SnapshotCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grid(mut self, grid: Rc<dyn SpatialIndex>) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn with_event_log(mut self, log: Rc<EventLog>) -> Self {
        self.event_log = Some(log);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Rc<EventScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_cellmap(mut self, cellmap: Rc<CellMap>) -> Self {
        self.cellmap = Some(cellmap);
        self
    }

    pub fn with_abilities(mut self, abilities: Rc<AbilityManager>) -> Self {
        self.abilities = Some(abilities);
        self
    }

    pub fn with_resources(mut self, resources: Rc<ResourceRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Capture the engine snapshot plus every registered auxiliary, as one
    /// value tree.
    ///
    /// # Errors
    ///
    /// Propagates engine snapshot failures.
    pub fn snapshot(&self, engine: &Engine) -> Result<serde_json::Value, EngineError> {
        let mut tree = serde_json::to_value(engine.snapshot()?)
            .map_err(|e| EngineError::Snapshot(e.to_string()))?;

        let mut colony = serde_json::Map::new();
        if let Some(grid) = &self.grid {
            let (width, height) = grid.dimensions();
            colony.insert(
                "grid".to_owned(),
                serde_json::json!({"width": width, "height": height}),
            );
        }
        if let Some(log) = &self.event_log {
            colony.insert("events".to_owned(), log.snapshot());
        }
        if let Some(scheduler) = &self.scheduler {
            colony.insert("scheduler".to_owned(), scheduler.snapshot());
        }
        if let Some(cellmap) = &self.cellmap {
            colony.insert("cellmap".to_owned(), cellmap.snapshot());
        }
        if let Some(abilities) = &self.abilities {
            colony.insert("ability_manager".to_owned(), abilities.snapshot());
        }
        if let Some(resources) = &self.resources {
            colony.insert("resource_registry".to_owned(), resources.snapshot());
        }
        tree["colony"] = serde_json::Value::Object(colony);
        Ok(tree)
    }

    /// Restore the engine, then each registered auxiliary, then rebuild the
    /// spatial index from restored positions.
    ///
    /// All component types and registry definitions must be re-registered
    /// before calling this.
    ///
    /// # Errors
    ///
    /// Engine restore errors propagate first (leaving the world empty on
    /// component-type mismatches); auxiliary restore errors follow.
    pub fn restore(&self, engine: &mut Engine, data: &serde_json::Value) -> Result<(), EngineError> {
        let snapshot: EngineSnapshot = serde_json::from_value(data.clone())
            .map_err(|e| EngineError::Snapshot(format!("malformed snapshot tree: {e}")))?;
        engine.restore(&snapshot)?;

        let colony = data.get("colony");
        let part = |key: &str| colony.and_then(|c| c.get(key));

        if let (Some(log), Some(value)) = (&self.event_log, part("events")) {
            log.restore(value)?;
        }
        if let (Some(scheduler), Some(value)) = (&self.scheduler, part("scheduler")) {
            scheduler.restore(value)?;
        }
        if let (Some(cellmap), Some(value)) = (&self.cellmap, part("cellmap")) {
            cellmap.restore(value)?;
        }
        if let (Some(abilities), Some(value)) = (&self.abilities, part("ability_manager")) {
            abilities.restore(value)?;
        }
        if let (Some(resources), Some(value)) = (&self.resources, part("resource_registry")) {
            resources.restore(value)?;
        }
        if let Some(grid) = &self.grid {
            grid.rebuild(engine.world());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_emit_query_last() {
        let log = EventLog::new();
        log.emit(1, "birth", serde_json::json!({"who": 1}));
        log.emit(2, "death", serde_json::json!({"who": 2}));
        log.emit(5, "birth", serde_json::json!({"who": 3}));

        assert_eq!(log.len(), 3);
        assert_eq!(log.query(Some("birth"), None).len(), 2);
        assert_eq!(log.query(None, Some(1)).len(), 2);
        assert_eq!(log.query(Some("birth"), Some(1)).len(), 1);
        assert_eq!(log.last("birth").unwrap().tick, 5);
        assert!(log.last("storm").is_none());
    }

    #[test]
    fn bounded_log_drops_oldest() {
        let log = EventLog::bounded(2);
        for tick in 1..=4 {
            log.emit(tick, "t", serde_json::json!({}));
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.query(None, None)[0].tick, 3);
    }

    #[test]
    fn log_snapshot_roundtrip() {
        let log = EventLog::new();
        log.emit(3, "storm", serde_json::json!({"strength": 7}));
        let snap = log.snapshot();

        let restored = EventLog::new();
        restored.restore(&snap).unwrap();
        assert_eq!(restored.query(None, None), log.query(None, None));
    }

    #[test]
    fn bridged_signals_are_recorded_with_current_tick() {
        let log = EventLog::new();
        let bus = SignalBus::new();
        bridge_signals(&log, &bus, &["born", "died"]);

        log.set_current_tick(9);
        let mut data = SignalData::new();
        data.insert("who".to_owned(), serde_json::json!(4));
        bus.publish("born", data);
        bus.publish("ignored", SignalData::new());
        bus.flush();

        let entries = log.query(None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tick, 9);
        assert_eq!(entries[0].kind, "born");
        assert_eq!(entries[0].data["who"], serde_json::json!(4));
    }
}
