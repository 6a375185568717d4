//! The drone's local view: raw 3×3 sensor window plus the same window merged
//! with the drone's private memory.

use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::coordinates::{Direction, GridCoord};
use crate::grid::GridMap;

pub const RADAR_CELLS: usize = 9;
pub const CENTER: usize = 4;

/// Sensor index of the corner shared by the cells reached with `d1` and `d2`,
/// rows and columns ordered East, South, West, North. Opposite pairs have no
/// shared corner and map to the center.
pub const CORNER_TABLE: [[usize; 4]; 4] = [
    [2, 8, CENTER, 2],
    [8, 8, 6, CENTER],
    [CENTER, 6, 6, 0],
    [2, CENTER, 0, 0],
];

pub fn corner_index(d1: Direction, d2: Direction) -> usize {
    CORNER_TABLE[d1.index()][d2.index()]
}

/// Row-major 3×3 window centered on the drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Surroundings([Cell; RADAR_CELLS]);

impl Surroundings {
    pub fn new(cells: [Cell; RADAR_CELLS]) -> Self {
        Self(cells)
    }

    pub fn uniform(cell: Cell) -> Self {
        Self([cell; RADAR_CELLS])
    }

    pub fn with(mut self, index: usize, cell: Cell) -> Self {
        self.0[index] = cell;
        self
    }

    pub fn cells(&self) -> &[Cell; RADAR_CELLS] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Cell {
        self.0[index]
    }

    pub fn toward(&self, direction: Direction) -> Cell {
        self.0[direction.radar_index()]
    }

    pub fn corner(&self, d1: Direction, d2: Direction) -> Cell {
        self.0[corner_index(d1, d2)]
    }
}

impl Default for Surroundings {
    fn default() -> Self {
        Self::uniform(Cell::Free)
    }
}

/// Everything one evaluation of the behavior chain is allowed to look at.
#[derive(Debug, Clone, PartialEq)]
pub struct Perception {
    pub position: GridCoord,
    pub heading: f64,
    pub distance: f64,
    pub surroundings: Surroundings,
    merged: [Cell; RADAR_CELLS],
}

impl Perception {
    pub fn new(
        position: GridCoord,
        heading: f64,
        distance: f64,
        surroundings: Surroundings,
        memory: &GridMap,
    ) -> Self {
        let mut merged = [Cell::Obstacle; RADAR_CELLS];
        for row in 0..3 {
            for col in 0..3 {
                let index = col + row * 3;
                let sensed = surroundings.get(index);
                merged[index] = if sensed.is_open() {
                    memory.get(position.offset(col as i32 - 1, row as i32 - 1))
                } else {
                    sensed
                };
            }
        }

        Self {
            position,
            heading,
            distance,
            surroundings,
            merged,
        }
    }

    /// Sensor value where it is informative, memory value where the sensor
    /// only says "passable".
    pub fn merged(&self) -> &[Cell; RADAR_CELLS] {
        &self.merged
    }

    pub fn merged_toward(&self, direction: Direction) -> Cell {
        self.merged[direction.radar_index()]
    }

    /// Merged value of the four adjacent cells, indexed by direction.
    pub fn valid_movements(&self) -> [Cell; 4] {
        Direction::ALL.map(|direction| self.merged_toward(direction))
    }

    /// Absolute target position estimated from the bearing and distance.
    pub fn target_estimate(&self) -> (f64, f64) {
        (
            f64::from(self.position.x) + self.heading.cos() * self.distance,
            f64::from(self.position.y) + self.heading.sin() * self.distance,
        )
    }
}
