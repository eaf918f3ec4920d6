//! World grid and pathfinding.
//!
//! `GridMap` holds the sparse world cells built from the map table and
//! provides 4-directional BFS pathfinding with a small bounded path cache.
//! Only roads, the shelter and exploration points are walkable.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::constants::cell_types;
use crate::inventory::DeathDrop;
use crate::tables::MapCellRow;

/// Integer world coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbours in search order: +x, -x, +y, -y.
    fn neighbors(self) -> [GridPos; 4] {
        [
            GridPos::new(self.x + 1, self.y),
            GridPos::new(self.x - 1, self.y),
            GridPos::new(self.x, self.y + 1),
            GridPos::new(self.x, self.y - 1),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    Shelter,
    Road,
    ExplorationPoint,
    Obstacle,
    Built,
}

impl CellType {
    /// Map a table string to a cell type. Unknown strings are obstacles.
    pub fn from_table(raw: &str) -> Self {
        match raw.trim() {
            cell_types::SHELTER => Self::Shelter,
            cell_types::ROAD => Self::Road,
            cell_types::EXPLORATION_POINT => Self::ExplorationPoint,
            cell_types::BUILT => Self::Built,
            _ => Self::Obstacle,
        }
    }

    pub fn is_walkable(self) -> bool {
        matches!(self, Self::Shelter | Self::Road | Self::ExplorationPoint)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub pos: GridPos,
    pub cell_type: CellType,
    pub exploration_point_id: Option<String>,
    /// Exploration progress, 0..=100.
    pub progress: Option<u8>,
    pub death_drop: Option<DeathDrop>,
}

impl GridCell {
    pub fn from_row(row: &MapCellRow) -> Self {
        Self {
            pos: GridPos::new(row.x, row.y),
            cell_type: CellType::from_table(&row.cell_type),
            exploration_point_id: row.exploration_point_id.clone(),
            progress: None,
            death_drop: None,
        }
    }
}

const PATH_CACHE_CAPACITY: usize = 128;

fn default_cache_capacity() -> usize {
    PATH_CACHE_CAPACITY
}

/// The world map: cells keyed by coordinate, plus a bounded path cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridMap {
    cells: HashMap<GridPos, GridCell>,
    #[serde(skip)]
    cache: HashMap<(GridPos, GridPos), Vec<GridPos>>,
    #[serde(skip, default = "default_cache_capacity")]
    cache_capacity: usize,
}

impl Default for GridMap {
    fn default() -> Self {
        Self::from_cells(Vec::new())
    }
}

impl GridMap {
    /// Build the map from table rows. Later rows win on duplicate coordinates.
    pub fn from_rows(rows: &[MapCellRow]) -> Self {
        Self::from_cells(rows.iter().map(GridCell::from_row))
    }

    pub fn from_cells(cells: impl IntoIterator<Item = GridCell>) -> Self {
        Self {
            cells: cells.into_iter().map(|c| (c.pos, c)).collect(),
            cache: HashMap::new(),
            cache_capacity: PATH_CACHE_CAPACITY,
        }
    }

    pub fn cell(&self, pos: GridPos) -> Option<&GridCell> {
        self.cells.get(&pos)
    }

    /// Mutable cell access. The caller may change walkability, so cached
    /// paths are dropped.
    pub fn cell_mut(&mut self, pos: GridPos) -> Option<&mut GridCell> {
        self.cache.clear();
        self.cells.get_mut(&pos)
    }

    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.values()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// First shelter cell, ordered by coordinate.
    pub fn shelter(&self) -> Option<GridPos> {
        self.cells
            .values()
            .filter(|c| c.cell_type == CellType::Shelter)
            .map(|c| c.pos)
            .min()
    }

    /// Coordinate of the cell hosting `point_id`.
    pub fn point_position(&self, point_id: &str) -> Option<GridPos> {
        self.cells
            .values()
            .filter(|c| c.exploration_point_id.as_deref() == Some(point_id))
            .map(|c| c.pos)
            .min()
    }

    /// Walkable iff the cell exists and is a road, shelter or exploration point.
    pub fn is_walkable(&self, pos: GridPos) -> bool {
        self.cells
            .get(&pos)
            .is_some_and(|c| c.cell_type.is_walkable())
    }

    /// Change a cell's type (e.g. a facility was built on it).
    /// Invalidates cached paths.
    pub fn set_cell_type(&mut self, pos: GridPos, cell_type: CellType) -> bool {
        let Some(cell) = self.cells.get_mut(&pos) else {
            return false;
        };
        cell.cell_type = cell_type;
        self.cache.clear();
        true
    }

    /// Shortest 4-directional path from `start` to `target`.
    ///
    /// The returned cells exclude `start` and include `target`. Returns an
    /// empty path when already there and `None` when no walkable route exists.
    pub fn find_path(&mut self, start: GridPos, target: GridPos) -> Option<Vec<GridPos>> {
        if start == target {
            return Some(vec![]);
        }

        let key = (start, target);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached.clone());
        }

        let result = self.bfs(start, target);

        if let Some(ref path) = result {
            if self.cache_capacity > 0 {
                if self.cache.len() >= self.cache_capacity {
                    // Evict an arbitrary entry
                    if let Some(&evict_key) = self.cache.keys().next() {
                        self.cache.remove(&evict_key);
                    }
                }
                self.cache.insert(key, path.clone());
            }
        }

        result
    }

    /// Number of cached paths.
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    fn bfs(&self, start: GridPos, target: GridPos) -> Option<Vec<GridPos>> {
        if !self.is_walkable(target) {
            return None;
        }

        let mut came_from: HashMap<GridPos, GridPos> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        came_from.insert(start, start);

        while let Some(current) = queue.pop_front() {
            if current == target {
                let mut path = Vec::new();
                let mut step = current;
                while step != start {
                    path.push(step);
                    step = came_from[&step];
                }
                path.reverse();
                return Some(path);
            }
            for next in current.neighbors() {
                if came_from.contains_key(&next) || !self.is_walkable(next) {
                    continue;
                }
                came_from.insert(next, current);
                queue.push_back(next);
            }
        }

        None
    }

    /// Leave a death drop on a cell. Returns `false` if the cell does not exist.
    pub fn place_death_drop(&mut self, pos: GridPos, drop: DeathDrop) -> bool {
        match self.cells.get_mut(&pos) {
            Some(cell) => {
                cell.death_drop = Some(drop);
                true
            }
            None => false,
        }
    }

    /// Pick up the drop on a cell, if any.
    pub fn take_death_drop(&mut self, pos: GridPos) -> Option<DeathDrop> {
        self.cells.get_mut(&pos).and_then(|c| c.death_drop.take())
    }

    /// Clear drops that have been on the map for `retention` rounds or more.
    /// Returns how many were removed.
    pub fn expire_death_drops(&mut self, round: u32, retention: u32) -> usize {
        let mut removed = 0;
        for cell in self.cells.values_mut() {
            let expired = cell
                .death_drop
                .as_ref()
                .is_some_and(|d| round.saturating_sub(d.death_round) >= retention);
            if expired {
                cell.death_drop = None;
                removed += 1;
            }
        }
        removed
    }

    /// Set exploration progress (clamped to 100). `false` if the cell is missing.
    pub fn set_progress(&mut self, pos: GridPos, percent: u8) -> bool {
        match self.cells.get_mut(&pos) {
            Some(cell) => {
                cell.progress = Some(percent.min(100));
                true
            }
            None => false,
        }
    }
}

/// One step per round: the next cell on the path, or stay put.
pub fn step_along_path(current: GridPos, path: &[GridPos]) -> GridPos {
    path.first().copied().unwrap_or(current)
}
