use crate::cell::Cell;
use crate::coordinates::{Direction, GridCoord};
use crate::sensing::Perception;

/// Merged-window indices of the two diagonal cells flanking each move,
/// ordered East, South, West, North.
const FLANKS: [[usize; 2]; 4] = [[2, 8], [6, 8], [0, 6], [0, 2]];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub direction: Direction,
    pub distance: f64,
    pub feasible: bool,
}

/// The four candidate moves of one decision cycle, best (closest) first.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidates([Candidate; 4]);

impl Candidates {
    pub fn new(mut candidates: [Candidate; 4]) -> Self {
        // Stable sort keeps East, South, West, North order on ties.
        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Self(candidates)
    }

    pub fn best(&self) -> &Candidate {
        &self.0[0]
    }

    pub fn ranked(&self) -> &[Candidate; 4] {
        &self.0
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Candidate> {
        self.0.iter()
    }

    pub fn get(&self, direction: Direction) -> &Candidate {
        self.0
            .iter()
            .find(|candidate| candidate.direction == direction)
            .unwrap_or(&self.0[0])
    }

    pub fn is_feasible(&self, direction: Direction) -> bool {
        self.get(direction).feasible
    }
}

/// Which moves are allowed, indexed by direction. A move needs a free target
/// cell and no visited cell on either flank; when that rules out every move,
/// only a move with both flanks visited is refused.
pub fn feasibility(perception: &Perception) -> [bool; 4] {
    let merged = perception.merged();
    let strict = Direction::ALL.map(|direction| {
        let [a, b] = FLANKS[direction.index()];
        perception.merged_toward(direction) == Cell::Free
            && !(merged[a] == Cell::Visited || merged[b] == Cell::Visited)
    });
    if strict.iter().any(|feasible| *feasible) {
        return strict;
    }

    Direction::ALL.map(|direction| {
        let [a, b] = FLANKS[direction.index()];
        perception.merged_toward(direction) == Cell::Free
            && !(merged[a] == Cell::Visited && merged[b] == Cell::Visited)
    })
}

pub fn build_candidates(perception: &Perception) -> Candidates {
    let (target_x, target_y) = perception.target_estimate();
    let feasible = feasibility(perception);
    let position: GridCoord = perception.position;

    Candidates::new(Direction::ALL.map(|direction| Candidate {
        direction,
        distance: position.step(direction).distance_to(target_x, target_y),
        feasible: feasible[direction.index()],
    }))
}
