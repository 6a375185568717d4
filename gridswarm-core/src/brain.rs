use tracing::{debug, trace};

use crate::behavior::{BehaviorChain, ThinkContext};
use crate::cell::Cell;
use crate::coordinates::GridCoord;
use crate::decision::{Decision, Outcome};
use crate::dodging::DodgingContext;
use crate::grid::GridMap;
use crate::message::StatusReport;
use crate::movement::build_candidates;
use crate::sensing::Perception;
use crate::standby::StandbyGate;

/// Decision state of one drone, owned by its think cycle.
pub struct Brain {
    memory: GridMap,
    dodging: DodgingContext,
    chain: BehaviorChain,
    position: Option<GridCoord>,
}

impl Brain {
    pub fn new(memory: GridMap, chain: BehaviorChain) -> Self {
        Self {
            memory,
            dodging: DodgingContext::default(),
            chain,
            position: None,
        }
    }

    pub fn set_chain(&mut self, chain: BehaviorChain) {
        self.chain = chain;
    }

    pub fn memory(&self) -> &GridMap {
        &self.memory
    }

    pub fn dodging(&self) -> &DodgingContext {
        &self.dodging
    }

    pub fn position(&self) -> Option<GridCoord> {
        self.position
    }

    /// Takes the position from a fresh status, leaving the previous cell
    /// marked as visited in memory.
    pub fn observe(&mut self, status: &StatusReport) {
        if let Some(previous) = self.position {
            if let Err(error) = self.memory.set(previous, Cell::Visited) {
                debug!(%error, "previous position outside memory map");
            }
        }
        self.position = Some(status.gps);
    }

    /// One decision cycle. Blocks while the stand-by gate is held and keeps
    /// re-evaluating for as long as a stage asks to rethink.
    pub fn think(&mut self, status: &mut StatusReport, standby: &StandbyGate) -> Decision {
        self.observe(status);
        if status.goal {
            self.dodging.reset();
            return Decision::End(Outcome::Success);
        }

        let mut rethinks = 0;
        loop {
            standby.wait_if_standby();
            self.chain.refresh(status, &mut self.memory);

            let perception = Perception::new(
                status.gps,
                status.gonio.alpha,
                status.gonio.dist,
                status.radar,
                &self.memory,
            );
            let candidates = build_candidates(&perception);
            trace!(ranked = ?candidates.ranked(), "candidates");

            let mut ctx = ThinkContext {
                perception: &perception,
                candidates: &candidates,
                dodging: &mut self.dodging,
                rethinks,
            };
            if let Some(decision) = self.chain.evaluate(&mut ctx) {
                if decision.is_terminal() {
                    self.dodging.reset();
                }
                return decision;
            }
            rethinks = rethinks.saturating_add(1);
        }
    }
}
