use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::Cell;
use crate::coordinates::GridCoord;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("coordinate ({x}, {y}) is outside the grid")]
    OutOfBounds { x: i32, y: i32 },
    #[error("expected {expected} cells, got {actual}")]
    InvalidCellCount { expected: usize, actual: usize },
    #[error("a {width}×{height} grid is too large")]
    TooLarge { width: usize, height: usize },
}

/// Largest number of cells a grid may hold.
pub const MAX_CELLS: usize = 1 << 24;

/// Row-major `width × height` grid. Anything outside it reads as an obstacle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GridData")]
pub struct GridMap {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct GridData {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl TryFrom<GridData> for GridMap {
    type Error = GridError;

    fn try_from(data: GridData) -> Result<Self, Self::Error> {
        GridMap::from_cells(data.width, data.height, data.cells)
    }
}

impl GridMap {
    /// Number of cells in a `width × height` grid, bounded by [`MAX_CELLS`].
    pub fn cell_count(width: usize, height: usize) -> Result<usize, GridError> {
        width
            .checked_mul(height)
            .filter(|count| *count <= MAX_CELLS)
            .ok_or(GridError::TooLarge { width, height })
    }

    /// # Panics
    ///
    /// Panics if `width * height` overflows. Sizes from outside the process
    /// go through [`GridMap::cell_count`] or [`GridMap::from_cells`] first.
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, Cell::Free)
    }

    pub fn filled(width: usize, height: usize, cell: Cell) -> Self {
        Self {
            width,
            height,
            cells: vec![cell; width * height],
        }
    }

    pub fn from_cells(width: usize, height: usize, cells: Vec<Cell>) -> Result<Self, GridError> {
        let expected = Self::cell_count(width, height)?;
        if cells.len() != expected {
            return Err(GridError::InvalidCellCount {
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        self.index(coord).is_ok()
    }

    pub fn index(&self, coord: GridCoord) -> Result<usize, GridError> {
        let (Ok(x), Ok(y)) = (usize::try_from(coord.x), usize::try_from(coord.y)) else {
            return Err(GridError::OutOfBounds {
                x: coord.x,
                y: coord.y,
            });
        };
        if x >= self.width || y >= self.height {
            return Err(GridError::OutOfBounds {
                x: coord.x,
                y: coord.y,
            });
        }
        Ok(x + y * self.width)
    }

    pub fn get(&self, coord: GridCoord) -> Cell {
        self.index(coord)
            .map(|index| self.cells[index])
            .unwrap_or(Cell::Obstacle)
    }

    pub fn set(&mut self, coord: GridCoord, cell: Cell) -> Result<(), GridError> {
        let index = self.index(coord)?;
        self.cells[index] = cell;
        Ok(())
    }

    pub fn coords_of(&self, cell: Cell) -> impl Iterator<Item = GridCoord> + '_ {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, current)| **current == cell)
            .map(move |(index, _)| GridCoord::new((index % width) as i32, (index / width) as i32))
    }

    /// Mean position of every cell holding `cell`, or `None` when there is none.
    pub fn centroid_of(&self, cell: Cell) -> Option<(f64, f64)> {
        let (mut sum_x, mut sum_y, mut count) = (0.0, 0.0, 0usize);
        for coord in self.coords_of(cell) {
            sum_x += f64::from(coord.x);
            sum_y += f64::from(coord.y);
            count += 1;
        }
        (count > 0).then(|| (sum_x / count as f64, sum_y / count as f64))
    }

    /// 3×3 neighbourhood around `center`, row-major, center at index 4.
    pub fn window(&self, center: GridCoord) -> [Cell; 9] {
        let mut window = [Cell::Obstacle; 9];
        for row in 0..3 {
            for col in 0..3 {
                window[col + row * 3] = self.get(center.offset(col as i32 - 1, row as i32 - 1));
            }
        }
        window
    }
}

impl fmt::Display for GridMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.width.max(1)) {
            let line: String = row.iter().map(|cell| cell.glyph()).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
