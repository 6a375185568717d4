use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use fastrand::Rng;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::coordinates::GridCoord;
use crate::grid::{GridError, GridMap};

pub const DEFAULT_OBSTACLE_PERCENT: u32 = 20;

/// Rectangle of goal cells, top-left corner at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalPatch {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl GoalPatch {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        coord.x >= self.x
            && coord.y >= self.y
            && i64::from(coord.x) < i64::from(self.x) + i64::from(self.width)
            && i64::from(coord.y) < i64::from(self.y) + i64::from(self.height)
    }

    fn coords(&self) -> impl Iterator<Item = GridCoord> + '_ {
        (0..self.height as i32)
            .flat_map(move |dy| (0..self.width as i32).map(move |dx| GridCoord::new(self.x + dx, self.y + dy)))
    }
}

/// Seeded obstacle field: every coordinate gets its own RNG stream, so a cell
/// does not depend on the map size or on generation order.
#[derive(Debug, Clone)]
pub struct DeterministicMap {
    seed: u64,
    obstacle_percent: u32,
}

impl DeterministicMap {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            obstacle_percent: DEFAULT_OBSTACLE_PERCENT,
        }
    }

    pub fn with_obstacle_percent(mut self, percent: u32) -> Self {
        self.obstacle_percent = percent.min(100);
        self
    }

    pub fn cell_at(&self, coord: GridCoord) -> Cell {
        let mut rng = self.rng_for_coord(coord);
        if rng.u32(0..100) < self.obstacle_percent {
            Cell::Obstacle
        } else {
            Cell::Free
        }
    }

    /// Builds a `width × height` map. The goal patch must lie inside the map;
    /// `keep_clear` cells (typically spawn points) are never obstacles.
    pub fn build(
        &self,
        width: usize,
        height: usize,
        goal: GoalPatch,
        keep_clear: &[GridCoord],
    ) -> Result<GridMap, GridError> {
        GridMap::cell_count(width, height)?;
        let mut map = GridMap::new(width, height);

        for y in 0..height {
            for x in 0..width {
                let coord = GridCoord::new(x as i32, y as i32);
                if keep_clear.contains(&coord) || goal.contains(coord) {
                    continue;
                }
                map.set(coord, self.cell_at(coord))?;
            }
        }

        for coord in goal.coords() {
            map.set(coord, Cell::Goal)?;
        }

        Ok(map)
    }

    fn rng_for_coord(&self, coord: GridCoord) -> Rng {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        coord.hash(&mut hasher);
        Rng::with_seed(hasher.finish())
    }
}
