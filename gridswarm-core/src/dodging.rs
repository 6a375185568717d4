use tracing::debug;

use crate::behavior::{Behavior, ThinkContext};
use crate::cell::Cell;
use crate::coordinates::Direction;
use crate::decision::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DodgingState {
    #[default]
    Normal,
    Dodging {
        preferred: Direction,
    },
}

/// Obstacle-avoidance memory that survives between decision cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DodgingContext {
    state: DodgingState,
}

impl DodgingContext {
    pub fn state(&self) -> DodgingState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, DodgingState::Dodging { .. })
    }

    /// Direction that was blocked when dodging started.
    pub fn preferred(&self) -> Option<Direction> {
        match self.state {
            DodgingState::Dodging { preferred } => Some(preferred),
            DodgingState::Normal => None,
        }
    }

    pub fn enter(&mut self, preferred: Direction) {
        self.state = DodgingState::Dodging { preferred };
    }

    pub fn reset(&mut self) {
        self.state = DodgingState::Normal;
    }
}

/// Routes around an obstacle that blocks the best move, hugging its boundary
/// until the original direction opens up again.
#[derive(Debug, Clone, Copy, Default)]
pub struct DodgingBehavior;

impl DodgingBehavior {
    fn while_normal(ctx: &mut ThinkContext<'_>) -> Verdict {
        let best = ctx.candidates.best();
        if !best.feasible && ctx.perception.surroundings.toward(best.direction) == Cell::Obstacle {
            debug!(direction = ?best.direction, "entering dodging");
            ctx.dodging.enter(best.direction);
        }
        Verdict::Defer
    }

    fn while_dodging(ctx: &mut ThinkContext<'_>, preferred: Direction) -> Verdict {
        if ctx.candidates.is_feasible(preferred) {
            debug!(direction = ?preferred, "leaving dodging");
            ctx.dodging.reset();
            return Verdict::Decide(preferred.into());
        }

        let surroundings = &ctx.perception.surroundings;
        let hugging_corner = ctx.candidates.iter().find(|candidate| {
            let d = candidate.direction;
            candidate.feasible
                && (surroundings.corner(d, d.next()) == Cell::Obstacle
                    || surroundings.corner(d, d.previous()) == Cell::Obstacle)
        });
        if let Some(candidate) = hugging_corner {
            return Verdict::Decide(candidate.direction.into());
        }

        let movements = ctx.perception.valid_movements();
        let next_to_obstacle = ctx.candidates.iter().find(|candidate| {
            let d = candidate.direction;
            candidate.feasible
                && (movements[d.next().index()] == Cell::Obstacle
                    || movements[d.previous().index()] == Cell::Obstacle)
        });
        if let Some(candidate) = next_to_obstacle {
            return Verdict::Decide(candidate.direction.into());
        }

        Verdict::Defer
    }
}

impl Behavior for DodgingBehavior {
    fn name(&self) -> &'static str {
        "dodging"
    }

    fn evaluate(&mut self, ctx: &mut ThinkContext<'_>) -> Verdict {
        match ctx.dodging.preferred() {
            Some(preferred) => Self::while_dodging(ctx, preferred),
            None => Self::while_normal(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::GridCoord;
    use crate::decision::Decision;
    use crate::grid::GridMap;
    use crate::movement::build_candidates;
    use crate::sensing::{Perception, Surroundings};
    use Direction::*;

    fn evaluate(surroundings: Surroundings, memory: &GridMap, dodging: &mut DodgingContext) -> Verdict {
        let perception = Perception::new(GridCoord::new(5, 5), 0.0, 3.0, surroundings, memory);
        let candidates = build_candidates(&perception);
        let mut ctx = ThinkContext {
            perception: &perception,
            candidates: &candidates,
            dodging,
            rethinks: 0,
        };
        DodgingBehavior.evaluate(&mut ctx)
    }

    #[test]
    fn enters_when_best_move_hits_obstacle() {
        let memory = GridMap::new(10, 10);
        let mut dodging = DodgingContext::default();
        let verdict = evaluate(Surroundings::default().with(5, Cell::Obstacle), &memory, &mut dodging);

        assert_eq!(verdict, Verdict::Defer);
        assert_eq!(dodging.preferred(), Some(East));
    }

    #[test]
    fn visited_target_does_not_start_dodging() {
        let mut memory = GridMap::new(10, 10);
        memory.set(GridCoord::new(6, 5), Cell::Visited).unwrap();
        let mut dodging = DodgingContext::default();
        let verdict = evaluate(Surroundings::default(), &memory, &mut dodging);

        assert_eq!(verdict, Verdict::Defer);
        assert!(!dodging.is_active());
    }

    #[test]
    fn resumes_preferred_direction_once_feasible() {
        let memory = GridMap::new(10, 10);
        let mut dodging = DodgingContext::default();
        dodging.enter(East);

        let verdict = evaluate(Surroundings::default(), &memory, &mut dodging);

        assert_eq!(verdict, Verdict::Decide(Decision::Move(East)));
        assert_eq!(dodging.state(), DodgingState::Normal);
    }

    #[test]
    fn prefers_move_next_to_obstacle_corner() {
        let memory = GridMap::new(10, 10);
        let mut dodging = DodgingContext::default();
        dodging.enter(East);
        // East blocked, obstacle on the south-west corner: South keeps hugging it.
        let surroundings = Surroundings::default()
            .with(5, Cell::Obstacle)
            .with(6, Cell::Obstacle);

        let verdict = evaluate(surroundings, &memory, &mut dodging);

        assert_eq!(verdict, Verdict::Decide(Decision::Move(South)));
        assert!(dodging.is_active());
    }

    #[test]
    fn falls_back_to_adjacent_obstacle_check() {
        let memory = GridMap::new(10, 10);
        let mut dodging = DodgingContext::default();
        dodging.enter(East);
        // East blocked, corners clear: North and South sit beside the east wall.
        let surroundings = Surroundings::default().with(5, Cell::Obstacle);

        let verdict = evaluate(surroundings, &memory, &mut dodging);

        assert_eq!(verdict, Verdict::Decide(Decision::Move(South)));
        assert_eq!(dodging.preferred(), Some(East));
    }

    #[test]
    fn defers_without_any_obstacle_reference() {
        let mut memory = GridMap::new(10, 10);
        // Preferred direction only blocked by memory, nothing to hug.
        memory.set(GridCoord::new(6, 5), Cell::Visited).unwrap();
        let mut dodging = DodgingContext::default();
        dodging.enter(East);

        let verdict = evaluate(Surroundings::default(), &memory, &mut dodging);

        assert_eq!(verdict, Verdict::Defer);
        assert!(dodging.is_active());
    }
}
