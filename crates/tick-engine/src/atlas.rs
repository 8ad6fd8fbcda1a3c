//! Cell maps and the spatial-index interface.
//!
//! The kernel does not own spatial algorithms; it specifies only the
//! interface the snapshot coordinator needs ([`SpatialIndex`]) plus a
//! sparse, dimension-agnostic [`CellMap`] for terrain-style cell properties.
//! [`Grid2D`] is the bundled 2D implementation used by the demos and tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tick_ecs::prelude::*;

use crate::EngineError;

/// An integer coordinate of any dimensionality.
pub type CellCoord = Vec<i64>;

// ---------------------------------------------------------------------------
// Pos2D
// ---------------------------------------------------------------------------

/// 2D position component; the source of truth a spatial index rebuilds from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pos2D {
    pub x: f64,
    pub y: f64,
}

impl Component for Pos2D {
    const NAME: &'static str = "spatial.Pos2D";
}

// ---------------------------------------------------------------------------
// CellDef / CellMap
// ---------------------------------------------------------------------------

/// Immutable cell type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDef {
    pub name: String,
    pub passable: bool,
    /// Pathfinding edge weight; must be >= 0.
    pub move_cost: f64,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl CellDef {
    /// # Errors
    ///
    /// [`EngineError::BadInput`] for an empty name or negative move cost.
    pub fn new(name: impl Into<String>) -> Result<Self, EngineError> {
        let name = name.into();
        if name.is_empty() {
            return Err(EngineError::BadInput("cell name must be non-empty".to_owned()));
        }
        Ok(Self {
            name,
            passable: true,
            move_cost: 1.0,
            properties: serde_json::Map::new(),
        })
    }

    pub fn impassable(mut self) -> Self {
        self.passable = false;
        self
    }

    /// # Errors
    ///
    /// [`EngineError::BadInput`] for a negative cost.
    pub fn with_move_cost(mut self, move_cost: f64) -> Result<Self, EngineError> {
        if move_cost < 0.0 {
            return Err(EngineError::BadInput(format!(
                "move_cost must be >= 0, got {move_cost}"
            )));
        }
        self.move_cost = move_cost;
        Ok(self)
    }
}

/// Sparse coordinate -> [`CellDef`] storage. Only non-default cells are
/// stored; unset coordinates read as the default. Cell defs are registered
/// by name so a snapshot can reference them compactly.
pub struct CellMap {
    default: RefCell<CellDef>,
    cells: RefCell<BTreeMap<CellCoord, CellDef>>,
    registry: RefCell<HashMap<String, CellDef>>,
}

impl CellMap {
    pub fn new(default: CellDef) -> Rc<Self> {
        let map = Self {
            registry: RefCell::new(HashMap::from([(default.name.clone(), default.clone())])),
            default: RefCell::new(default),
            cells: RefCell::new(BTreeMap::new()),
        };
        Rc::new(map)
    }

    /// The default cell type for unset coordinates.
    pub fn default_cell(&self) -> CellDef {
        self.default.borrow().clone()
    }

    /// Register a cell def by name for snapshot/restore.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] if a different def already uses the name.
    pub fn register(&self, def: &CellDef) -> Result<(), EngineError> {
        let mut registry = self.registry.borrow_mut();
        if let Some(existing) = registry.get(&def.name) {
            if existing != def {
                return Err(EngineError::BadInput(format!(
                    "cell name collision: '{}' already registered with a different definition",
                    def.name
                )));
            }
            return Ok(());
        }
        registry.insert(def.name.clone(), def.clone());
        Ok(())
    }

    /// Set the cell type at a coordinate, auto-registering the def. Setting
    /// the default removes the stored cell.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] on a name collision.
    pub fn set(&self, coord: &[i64], def: &CellDef) -> Result<(), EngineError> {
        self.register(def)?;
        if *def == *self.default.borrow() {
            self.cells.borrow_mut().remove(coord);
        } else {
            self.cells.borrow_mut().insert(coord.to_vec(), def.clone());
        }
        Ok(())
    }

    /// Reset a coordinate to the default cell type.
    pub fn clear(&self, coord: &[i64]) {
        self.cells.borrow_mut().remove(coord);
    }

    /// Reset all coordinates to the default cell type.
    pub fn clear_all(&self) {
        self.cells.borrow_mut().clear();
    }

    /// The cell def at a coordinate; the default for unset coordinates.
    pub fn at(&self, coord: &[i64]) -> CellDef {
        self.cells
            .borrow()
            .get(coord)
            .cloned()
            .unwrap_or_else(|| self.default.borrow().clone())
    }

    /// Whether a coordinate is passable.
    pub fn passable(&self, coord: &[i64]) -> bool {
        self.at(coord).passable
    }

    /// Movement cost of entering a coordinate.
    pub fn move_cost(&self, coord: &[i64]) -> f64 {
        self.at(coord).move_cost
    }

    /// All non-default coordinates with the given cell type name.
    pub fn of_type(&self, name: &str) -> Vec<CellCoord> {
        self.cells
            .borrow()
            .iter()
            .filter(|(_, def)| def.name == name)
            .map(|(coord, _)| coord.clone())
            .collect()
    }

    /// All non-default coordinates.
    pub fn coords(&self) -> Vec<CellCoord> {
        self.cells.borrow().keys().cloned().collect()
    }

    /// Set a list of coordinates to the same cell type.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] on a name collision.
    pub fn fill(&self, coords: &[CellCoord], def: &CellDef) -> Result<(), EngineError> {
        for coord in coords {
            self.set(coord, def)?;
        }
        Ok(())
    }

    /// Fill a 2D rectangle (inclusive corners) with a cell type.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] on a name collision.
    pub fn fill_rect(
        &self,
        corner1: (i64, i64),
        corner2: (i64, i64),
        def: &CellDef,
    ) -> Result<(), EngineError> {
        let (x1, x2) = (corner1.0.min(corner2.0), corner1.0.max(corner2.0));
        let (y1, y2) = (corner1.1.min(corner2.1), corner1.1.max(corner2.1));
        for x in x1..=x2 {
            for y in y1..=y2 {
                self.set(&[x, y], def)?;
            }
        }
        Ok(())
    }

    /// Serialize the map: the default's name plus `"x,y" -> name` entries
    /// for non-default cells.
    pub fn snapshot(&self) -> serde_json::Value {
        let cells: BTreeMap<String, String> = self
            .cells
            .borrow()
            .iter()
            .map(|(coord, def)| {
                let key = coord
                    .iter()
                    .map(i64::to_string)
                    .collect::<Vec<_>>()
                    .join(",");
                (key, def.name.clone())
            })
            .collect();
        serde_json::json!({
            "default": self.default.borrow().name,
            "cells": cells,
        })
    }

    /// Restore from snapshot data. All referenced cell defs must already be
    /// registered.
    ///
    /// # Errors
    ///
    /// [`EngineError::Snapshot`] for malformed data or
    /// [`EngineError::UnknownName`] for an unregistered cell name.
    pub fn restore(&self, data: &serde_json::Value) -> Result<(), EngineError> {
        let default_name = data
            .get("default")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Snapshot("cell map: missing default".to_owned()))?;
        let lookup = |name: &str| -> Result<CellDef, EngineError> {
            self.registry
                .borrow()
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::UnknownName {
                    kind: "cell",
                    name: name.to_owned(),
                })
        };

        let default = lookup(default_name)?;
        let mut restored: BTreeMap<CellCoord, CellDef> = BTreeMap::new();
        if let Some(cells) = data.get("cells").and_then(|v| v.as_object()) {
            for (key, value) in cells {
                let name = value.as_str().ok_or_else(|| {
                    EngineError::Snapshot(format!("cell map: non-string cell at '{key}'"))
                })?;
                let coord: CellCoord = key
                    .split(',')
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| {
                        EngineError::Snapshot(format!("cell map: malformed coordinate '{key}'"))
                    })?;
                restored.insert(coord, lookup(name)?);
            }
        }

        *self.default.borrow_mut() = default;
        *self.cells.borrow_mut() = restored;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SpatialIndex trait
// ---------------------------------------------------------------------------

/// The interface the kernel requires of a spatial index: placement
/// bookkeeping plus the ability to rebuild itself from world positions
/// after a restore. Pathfinding and richer queries live with the embedder.
pub trait SpatialIndex {
    /// Grid extents as `(width, height)`.
    fn dimensions(&self) -> (i64, i64);

    /// Place (or re-place) an entity at a coordinate.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] for an out-of-bounds coordinate.
    fn place(&self, entity: EntityId, x: i64, y: i64) -> Result<(), EngineError>;

    /// Move a tracked entity.
    ///
    /// # Errors
    ///
    /// [`EngineError::BadInput`] if the entity is untracked or the target
    /// is out of bounds.
    fn move_to(&self, entity: EntityId, x: i64, y: i64) -> Result<(), EngineError>;

    /// Remove an entity. Unknown entities are a no-op.
    fn remove(&self, entity: EntityId);

    /// Entities at a coordinate.
    fn at(&self, x: i64, y: i64) -> Vec<EntityId>;

    /// Tracked position of an entity.
    fn position_of(&self, entity: EntityId) -> Option<(i64, i64)>;

    /// Drop all placements and re-derive them from [`Pos2D`] components.
    /// Out-of-bounds positions are skipped.
    fn rebuild(&self, world: &World);
}

// ---------------------------------------------------------------------------
// Grid2D
// ---------------------------------------------------------------------------

/// Bounded 2D grid with Chebyshev distance semantics.
pub struct Grid2D {
    width: i64,
    height: i64,
    cells: RefCell<HashMap<(i64, i64), BTreeSet<EntityId>>>,
    entities: RefCell<BTreeMap<EntityId, (i64, i64)>>,
}

impl Grid2D {
    /// # Errors
    ///
    /// [`EngineError::BadInput`] for non-positive extents.
    pub fn new(width: i64, height: i64) -> Result<Rc<Self>, EngineError> {
        if width <= 0 || height <= 0 {
            return Err(EngineError::BadInput(format!(
                "grid extents must be positive, got {width}x{height}"
            )));
        }
        Ok(Rc::new(Self {
            width,
            height,
            cells: RefCell::new(HashMap::new()),
            entities: RefCell::new(BTreeMap::new()),
        }))
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    pub fn height(&self) -> i64 {
        self.height
    }

    fn check_bounds(&self, x: i64, y: i64) -> Result<(), EngineError> {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return Err(EngineError::BadInput(format!(
                "({x}, {y}) out of bounds for {}x{} grid",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Entities within Chebyshev radius `r` of `(x, y)`, with their
    /// positions.
    pub fn in_radius(&self, x: i64, y: i64, r: i64) -> Vec<(EntityId, i64, i64)> {
        let mut result = Vec::new();
        let cells = self.cells.borrow();
        for cx in (x - r).max(0)..=(x + r).min(self.width - 1) {
            for cy in (y - r).max(0)..=(y + r).min(self.height - 1) {
                if let Some(ids) = cells.get(&(cx, cy)) {
                    for &entity in ids {
                        result.push((entity, cx, cy));
                    }
                }
            }
        }
        result
    }

    /// In-bounds neighbor coordinates (8-connected).
    pub fn neighbors(&self, x: i64, y: i64) -> Vec<(i64, i64)> {
        let mut result = Vec::new();
        for dx in -1..=1 {
            for dy in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                if nx >= 0 && nx < self.width && ny >= 0 && ny < self.height {
                    result.push((nx, ny));
                }
            }
        }
        result
    }

    /// Chebyshev distance heuristic.
    pub fn heuristic(a: (i64, i64), b: (i64, i64)) -> f64 {
        (a.0 - b.0).abs().max((a.1 - b.1).abs()) as f64
    }

    /// All tracked entity IDs.
    pub fn tracked_entities(&self) -> Vec<EntityId> {
        self.entities.borrow().keys().copied().collect()
    }
}

impl SpatialIndex for Grid2D {
    fn dimensions(&self) -> (i64, i64) {
        (self.width, self.height)
    }

    fn place(&self, entity: EntityId, x: i64, y: i64) -> Result<(), EngineError> {
        self.check_bounds(x, y)?;
        self.remove(entity);
        self.entities.borrow_mut().insert(entity, (x, y));
        self.cells
            .borrow_mut()
            .entry((x, y))
            .or_default()
            .insert(entity);
        Ok(())
    }

    fn move_to(&self, entity: EntityId, x: i64, y: i64) -> Result<(), EngineError> {
        self.check_bounds(x, y)?;
        if !self.entities.borrow().contains_key(&entity) {
            return Err(EngineError::BadInput(format!(
                "entity {entity} is not on the grid"
            )));
        }
        self.place(entity, x, y)
    }

    fn remove(&self, entity: EntityId) {
        let Some(pos) = self.entities.borrow_mut().remove(&entity) else {
            return;
        };
        let mut cells = self.cells.borrow_mut();
        if let Some(ids) = cells.get_mut(&pos) {
            ids.remove(&entity);
            if ids.is_empty() {
                cells.remove(&pos);
            }
        }
    }

    fn at(&self, x: i64, y: i64) -> Vec<EntityId> {
        self.cells
            .borrow()
            .get(&(x, y))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn position_of(&self, entity: EntityId) -> Option<(i64, i64)> {
        self.entities.borrow().get(&entity).copied()
    }

    fn rebuild(&self, world: &World) {
        self.cells.borrow_mut().clear();
        self.entities.borrow_mut().clear();
        for (entity, (pos,)) in world.query::<(Pos2D,)>() {
            let (x, y) = (pos.x as i64, pos.y as i64);
            if self.check_bounds(x, y).is_ok() {
                // In bounds by the check above.
                let _ = self.place(entity, x, y);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
