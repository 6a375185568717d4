use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }

    pub fn distance_to(self, x: f64, y: f64) -> f64 {
        let dx = x - f64::from(self.x);
        let dy = y - f64::from(self.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// The four moves a drone can make. Discriminants are the wire decision codes;
/// rows grow southwards, so NORTH decreases `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    East = 0,
    South = 1,
    West = 2,
    North = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::North,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Self {
        Self::ALL[index % 4]
    }

    pub const fn opposite(self) -> Self {
        Self::from_index(self.index() + 2)
    }

    /// `(d + 1) mod 4`.
    pub const fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    /// `(d + 3) mod 4`.
    pub const fn previous(self) -> Self {
        Self::from_index(self.index() + 3)
    }

    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::South => (0, 1),
            Direction::West => (-1, 0),
            Direction::North => (0, -1),
        }
    }

    /// Index of the adjacent cell in a row-major 3×3 window.
    pub const fn radar_index(self) -> usize {
        match self {
            Direction::East => 5,
            Direction::South => 7,
            Direction::West => 3,
            Direction::North => 1,
        }
    }
}
