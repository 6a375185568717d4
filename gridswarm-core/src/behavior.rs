//! Ordered decision stages run once per think cycle.
//!
//! The chain is `termination → critical → first → dodging → third → basic`.
//! Every stage but the last may defer; `basic` always produces a decision.

use tracing::{debug, trace, warn};

use crate::cell::Cell;
use crate::config::DroneConfig;
use crate::coordinates::Direction;
use crate::decision::{Decision, Outcome, Verdict};
use crate::dodging::{DodgingBehavior, DodgingContext};
use crate::grid::GridMap;
use crate::message::StatusReport;
use crate::movement::{Candidate, Candidates};
use crate::sensing::Perception;

pub struct ThinkContext<'a> {
    pub perception: &'a Perception,
    pub candidates: &'a Candidates,
    pub dodging: &'a mut DodgingContext,
    /// How many times this status snapshot has already been rethought.
    pub rethinks: u32,
}

pub trait Behavior: Send {
    fn name(&self) -> &'static str;
    fn evaluate(&mut self, ctx: &mut ThinkContext<'_>) -> Verdict;
}

/// Empty extension point.
#[derive(Debug, Clone, Copy)]
pub struct Pass(pub &'static str);

impl Behavior for Pass {
    fn name(&self) -> &'static str {
        self.0
    }

    fn evaluate(&mut self, _ctx: &mut ThinkContext<'_>) -> Verdict {
        Verdict::Defer
    }
}

/// Gives up once the distance to the target has not improved for `limit`
/// consecutive evaluations.
#[derive(Debug, Clone)]
pub struct StallCheck {
    limit: u32,
    closest: Option<f64>,
    stalled: u32,
}

impl StallCheck {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            closest: None,
            stalled: 0,
        }
    }

    pub fn stalled(&self) -> u32 {
        self.stalled
    }
}

impl Behavior for StallCheck {
    fn name(&self) -> &'static str {
        "stall-check"
    }

    fn evaluate(&mut self, ctx: &mut ThinkContext<'_>) -> Verdict {
        if ctx.rethinks > 0 {
            return Verdict::Defer;
        }
        let distance = ctx.perception.distance;
        if self.closest.is_none_or(|closest| distance < closest) {
            self.closest = Some(distance);
            self.stalled = 0;
            return Verdict::Defer;
        }

        self.stalled += 1;
        if self.stalled >= self.limit {
            warn!(distance, stalled = self.stalled, "no progress towards target, giving up");
            return Decision::End(Outcome::Fail).into();
        }
        Verdict::Defer
    }
}

/// Resolves near-equal opposite candidates while dodging. `None` keeps the
/// second-best direction.
pub trait TieBreaker: Send {
    fn resolve(&mut self, ctx: &ThinkContext<'_>, second: Direction, third: Direction) -> Option<Direction>;
}

/// Picks the third-best direction when its corner with the blocked best
/// direction is open while the second-best one runs into an obstacle corner.
#[derive(Debug, Clone, Copy, Default)]
pub struct CornerTieBreak;

impl TieBreaker for CornerTieBreak {
    fn resolve(&mut self, ctx: &ThinkContext<'_>, second: Direction, third: Direction) -> Option<Direction> {
        let best = ctx.candidates.best().direction;
        let surroundings = &ctx.perception.surroundings;
        let second_corner = surroundings.corner(best, second);
        let third_corner = surroundings.corner(best, third);
        (third_corner == Cell::Free && second_corner == Cell::Obstacle).then_some(third)
    }
}

/// Greedy default stage.
pub struct BasicBehavior {
    tie_breaker: Box<dyn TieBreaker>,
}

impl BasicBehavior {
    pub fn new(tie_breaker: Box<dyn TieBreaker>) -> Self {
        Self { tie_breaker }
    }

    pub fn decide(&mut self, ctx: &ThinkContext<'_>) -> Decision {
        let candidates = ctx.candidates;
        let best = candidates.best();
        if best.feasible {
            return best.direction.into();
        }

        let mut second: Option<Candidate> = None;
        let mut third: Option<Candidate> = None;
        for candidate in candidates.iter().rev().filter(|candidate| candidate.feasible) {
            third = second;
            second = Some(*candidate);
        }

        let Some(second) = second else {
            debug!("no feasible move left");
            return Decision::End(Outcome::Fail);
        };
        let Some(third) = third else {
            return second.direction.into();
        };

        if (second.distance - third.distance).abs() < 1.0
            && ctx.dodging.is_active()
            && third.direction == second.direction.opposite()
        {
            if let Some(direction) = self.tie_breaker.resolve(ctx, second.direction, third.direction) {
                trace!(?direction, "tie resolved");
                return direction.into();
            }
        }
        second.direction.into()
    }
}

impl Default for BasicBehavior {
    fn default() -> Self {
        Self::new(Box::new(CornerTieBreak))
    }
}

/// Hook run before every evaluation, including after a rethink. May adjust
/// the status snapshot and the drone's memory.
pub trait Refresh: Send {
    fn refresh(&mut self, status: &mut StatusReport, memory: &mut GridMap);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Termination,
    Critical,
    First,
    Dodging,
    Third,
}

pub struct BehaviorChain {
    termination: Box<dyn Behavior>,
    critical: Box<dyn Behavior>,
    first: Box<dyn Behavior>,
    dodging: Box<dyn Behavior>,
    third: Box<dyn Behavior>,
    basic: BasicBehavior,
    refresh: Option<Box<dyn Refresh>>,
}

impl BehaviorChain {
    /// Stall check after `stall_limit` idle evaluations, dodging enabled.
    pub fn standard(stall_limit: u32) -> Self {
        Self {
            termination: Box::new(StallCheck::new(stall_limit)),
            critical: Box::new(Pass("critical")),
            first: Box::new(Pass("first")),
            dodging: Box::new(DodgingBehavior),
            third: Box::new(Pass("third")),
            basic: BasicBehavior::default(),
            refresh: None,
        }
    }

    /// Builds the chain for a drone exploring a `width × height` map.
    pub fn from_config(config: &DroneConfig, width: usize, height: usize) -> Self {
        let limit = config
            .stall_limit
            .unwrap_or_else(|| u32::try_from(width + height).unwrap_or(u32::MAX));
        let chain = Self::standard(limit);
        if config.dodging {
            chain
        } else {
            chain.with_stage(Slot::Dodging, Pass("dodging"))
        }
    }

    pub fn with_stage(mut self, slot: Slot, behavior: impl Behavior + 'static) -> Self {
        let behavior: Box<dyn Behavior> = Box::new(behavior);
        match slot {
            Slot::Termination => self.termination = behavior,
            Slot::Critical => self.critical = behavior,
            Slot::First => self.first = behavior,
            Slot::Dodging => self.dodging = behavior,
            Slot::Third => self.third = behavior,
        }
        self
    }

    pub fn with_tie_breaker(mut self, tie_breaker: impl TieBreaker + 'static) -> Self {
        self.basic = BasicBehavior::new(Box::new(tie_breaker));
        self
    }

    pub fn with_refresh(mut self, refresh: impl Refresh + 'static) -> Self {
        self.refresh = Some(Box::new(refresh));
        self
    }

    pub fn refresh(&mut self, status: &mut StatusReport, memory: &mut GridMap) {
        if let Some(refresh) = self.refresh.as_mut() {
            refresh.refresh(status, memory);
        }
    }

    /// Runs every stage in order. `None` asks the caller to refresh its state
    /// and evaluate again.
    pub fn evaluate(&mut self, ctx: &mut ThinkContext<'_>) -> Option<Decision> {
        match self.termination.evaluate(ctx) {
            Verdict::Decide(decision @ Decision::End(Outcome::Fail)) => return Some(decision),
            Verdict::Defer => {}
            other => {
                warn!(stage = self.termination.name(), verdict = ?other, "termination stage may only fail, ignoring")
            }
        }

        for stage in [
            &mut self.critical,
            &mut self.first,
            &mut self.dodging,
            &mut self.third,
        ] {
            match stage.evaluate(ctx) {
                Verdict::Decide(decision) => {
                    trace!(stage = stage.name(), ?decision, "stage decided");
                    return Some(decision);
                }
                Verdict::Rethink => {
                    debug!(stage = stage.name(), "rethink requested");
                    return None;
                }
                Verdict::Defer => {}
            }
        }

        Some(self.basic.decide(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::GridCoord;
    use crate::movement::build_candidates;
    use crate::sensing::Surroundings;
    use Direction::*;

    fn perceive(surroundings: Surroundings) -> Perception {
        Perception::new(GridCoord::new(5, 5), 0.0, 3.0, surroundings, &GridMap::new(10, 10))
    }

    fn run_chain(chain: &mut BehaviorChain, perception: &Perception, dodging: &mut DodgingContext) -> Option<Decision> {
        let candidates = build_candidates(perception);
        let mut ctx = ThinkContext {
            perception,
            candidates: &candidates,
            dodging,
            rethinks: 0,
        };
        chain.evaluate(&mut ctx)
    }

    fn run_basic(perception: &Perception, dodging: &mut DodgingContext) -> Decision {
        let candidates = build_candidates(perception);
        let ctx = ThinkContext {
            perception,
            candidates: &candidates,
            dodging,
            rethinks: 0,
        };
        BasicBehavior::default().decide(&ctx)
    }

    struct RethinkOnce {
        calls: u32,
    }

    impl Behavior for RethinkOnce {
        fn name(&self) -> &'static str {
            "rethink-once"
        }

        fn evaluate(&mut self, _ctx: &mut ThinkContext<'_>) -> Verdict {
            self.calls += 1;
            if self.calls == 1 {
                Verdict::Rethink
            } else {
                Verdict::Defer
            }
        }
    }

    struct Always(Decision);

    impl Behavior for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        fn evaluate(&mut self, _ctx: &mut ThinkContext<'_>) -> Verdict {
            self.0.into()
        }
    }

    #[test]
    fn blocked_east_goes_south() {
        let perception = perceive(Surroundings::default().with(5, Cell::Obstacle));
        let mut chain = BehaviorChain::standard(20);
        let mut dodging = DodgingContext::default();

        let decision = run_chain(&mut chain, &perception, &mut dodging);

        assert_eq!(decision, Some(Decision::Move(South)));
        assert_eq!(dodging.preferred(), Some(East));
    }

    #[test]
    fn walled_in_drone_fails() {
        let walls = Surroundings::default()
            .with(1, Cell::Obstacle)
            .with(3, Cell::Obstacle)
            .with(5, Cell::Obstacle)
            .with(7, Cell::Obstacle);
        let mut dodging = DodgingContext::default();
        assert_eq!(run_basic(&perceive(walls), &mut dodging), Decision::End(Outcome::Fail));
    }

    #[test]
    fn single_open_direction_is_taken() {
        let surroundings = Surroundings::default()
            .with(1, Cell::Obstacle)
            .with(3, Cell::Obstacle)
            .with(5, Cell::Obstacle);
        let mut dodging = DodgingContext::default();
        assert_eq!(run_basic(&perceive(surroundings), &mut dodging), Decision::Move(South));
    }

    #[test]
    fn corner_tie_break_is_deterministic() {
        // East blocked, obstacle in the south-east corner: North wins the tie.
        let surroundings = Surroundings::default()
            .with(5, Cell::Obstacle)
            .with(8, Cell::Obstacle);
        let perception = perceive(surroundings);
        let mut dodging = DodgingContext::default();
        dodging.enter(East);

        for _ in 0..3 {
            assert_eq!(run_basic(&perception, &mut dodging), Decision::Move(North));
        }

        // Same tie outside of dodging keeps the second-best candidate.
        dodging.reset();
        assert_eq!(run_basic(&perception, &mut dodging), Decision::Move(South));
    }

    #[test]
    fn rethink_returns_control_to_caller() {
        let perception = perceive(Surroundings::default());
        let mut chain = BehaviorChain::standard(20).with_stage(Slot::First, RethinkOnce { calls: 0 });
        let mut dodging = DodgingContext::default();

        assert_eq!(run_chain(&mut chain, &perception, &mut dodging), None);
        assert_eq!(
            run_chain(&mut chain, &perception, &mut dodging),
            Some(Decision::Move(East))
        );
    }

    #[test]
    fn critical_stage_overrides_everything_after_it() {
        let perception = perceive(Surroundings::default());
        let mut chain = BehaviorChain::standard(20).with_stage(Slot::Critical, Always(Decision::Move(West)));
        let mut dodging = DodgingContext::default();
        assert_eq!(
            run_chain(&mut chain, &perception, &mut dodging),
            Some(Decision::Move(West))
        );
    }

    #[test]
    fn termination_stage_cannot_move() {
        let perception = perceive(Surroundings::default());
        let mut chain = BehaviorChain::standard(20).with_stage(Slot::Termination, Always(Decision::Move(West)));
        let mut dodging = DodgingContext::default();
        assert_eq!(
            run_chain(&mut chain, &perception, &mut dodging),
            Some(Decision::Move(East))
        );
    }

    #[test]
    fn stall_check_gives_up_without_progress() {
        let perception = perceive(Surroundings::default());
        let mut chain = BehaviorChain::standard(2);
        let mut dodging = DodgingContext::default();

        assert_eq!(run_chain(&mut chain, &perception, &mut dodging), Some(Decision::Move(East)));
        assert_eq!(run_chain(&mut chain, &perception, &mut dodging), Some(Decision::Move(East)));
        assert_eq!(
            run_chain(&mut chain, &perception, &mut dodging),
            Some(Decision::End(Outcome::Fail))
        );
    }

    #[test]
    fn stall_counter_resets_on_progress() {
        let mut check = StallCheck::new(5);
        let candidates_for = |distance| {
            Perception::new(GridCoord::new(1, 1), 0.0, distance, Surroundings::default(), &GridMap::new(4, 4))
        };
        let mut dodging = DodgingContext::default();
        for distance in [3.0, 3.0, 3.0, 2.0] {
            let perception = candidates_for(distance);
            let candidates = build_candidates(&perception);
            let mut ctx = ThinkContext {
                perception: &perception,
                candidates: &candidates,
                dodging: &mut dodging,
                rethinks: 0,
            };
            assert_eq!(check.evaluate(&mut ctx), Verdict::Defer);
        }
        assert_eq!(check.stalled(), 0);
    }

    #[test]
    fn rethink_passes_do_not_count_as_stalls() {
        let mut check = StallCheck::new(2);
        let perception = perceive(Surroundings::default());
        let candidates = build_candidates(&perception);
        let mut dodging = DodgingContext::default();

        for rethinks in [0, 1, 2, 3, 4, 0] {
            let mut ctx = ThinkContext {
                perception: &perception,
                candidates: &candidates,
                dodging: &mut dodging,
                rethinks,
            };
            assert_eq!(check.evaluate(&mut ctx), Verdict::Defer);
        }
        assert_eq!(check.stalled(), 1);
    }

    #[test]
    fn disabled_dodging_never_enters() {
        let config = DroneConfig {
            dodging: false,
            ..DroneConfig::default()
        };
        let perception = perceive(Surroundings::default().with(5, Cell::Obstacle));
        let mut chain = BehaviorChain::from_config(&config, 10, 10);
        let mut dodging = DodgingContext::default();

        assert_eq!(
            run_chain(&mut chain, &perception, &mut dodging),
            Some(Decision::Move(South))
        );
        assert!(!dodging.is_active());
    }
}
