use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State of a single grid cell. Serialized as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Cell {
    #[default]
    Free,
    Obstacle,
    Visited,
    Goal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown cell code {0}")]
pub struct UnknownCellCode(pub i32);

impl Cell {
    pub const fn code(self) -> i32 {
        match self {
            Cell::Free => 0,
            Cell::Obstacle => 1,
            Cell::Visited => 2,
            Cell::Goal => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Cell::Free),
            1 => Some(Cell::Obstacle),
            2 => Some(Cell::Visited),
            3 => Some(Cell::Goal),
            _ => None,
        }
    }

    /// Sensor readings that carry no information beyond "passable", so the
    /// drone's own memory is consulted instead.
    pub fn is_open(self) -> bool {
        matches!(self, Cell::Free | Cell::Goal)
    }

    pub fn glyph(self) -> char {
        match self {
            Cell::Free => '.',
            Cell::Obstacle => '#',
            Cell::Visited => 'o',
            Cell::Goal => 'G',
        }
    }
}

impl From<Cell> for i32 {
    fn from(cell: Cell) -> Self {
        cell.code()
    }
}

impl TryFrom<i32> for Cell {
    type Error = UnknownCellCode;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Cell::from_code(code).ok_or(UnknownCellCode(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        assert_eq!(Cell::Free.code(), 0);
        assert_eq!(Cell::Obstacle.code(), 1);
        assert_eq!(Cell::Visited.code(), 2);
        assert_eq!(Cell::Goal.code(), 3);
        assert_eq!(Cell::from_code(4), None);
    }

    #[test]
    fn serializes_as_integer() {
        let json = serde_json::to_string(&[Cell::Free, Cell::Goal]).unwrap();
        assert_eq!(json, "[0,3]");
        let back: Vec<Cell> = serde_json::from_str("[1,2]").unwrap();
        assert_eq!(back, vec![Cell::Obstacle, Cell::Visited]);
        assert!(serde_json::from_str::<Cell>("7").is_err());
    }
}
