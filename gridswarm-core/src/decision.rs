use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinates::Direction;

pub const END_SUCCESS_CODE: i32 = -1;
pub const END_FAIL_CODE: i32 = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Fail,
}

/// What a drone reports to the coordinator. Serialized as the wire code:
/// 0..=3 for a move, -1 / -2 for the end of exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Decision {
    Move(Direction),
    End(Outcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown decision code {0}")]
pub struct UnknownDecision(pub i32);

impl Decision {
    pub const fn code(self) -> i32 {
        match self {
            Decision::Move(direction) => direction as i32,
            Decision::End(Outcome::Success) => END_SUCCESS_CODE,
            Decision::End(Outcome::Fail) => END_FAIL_CODE,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0..=3 => Some(Decision::Move(Direction::from_index(code as usize))),
            END_SUCCESS_CODE => Some(Decision::End(Outcome::Success)),
            END_FAIL_CODE => Some(Decision::End(Outcome::Fail)),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Decision::End(_))
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Decision::Move(direction) => Some(direction),
            Decision::End(_) => None,
        }
    }
}

impl From<Direction> for Decision {
    fn from(direction: Direction) -> Self {
        Decision::Move(direction)
    }
}

impl From<Decision> for i32 {
    fn from(decision: Decision) -> Self {
        decision.code()
    }
}

impl TryFrom<i32> for Decision {
    type Error = UnknownDecision;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Decision::from_code(code).ok_or(UnknownDecision(code))
    }
}

/// Result of one behavior stage. `Defer` hands over to the next stage,
/// `Rethink` restarts refresh and evaluation of the whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Decide(Decision),
    Defer,
    Rethink,
}

impl From<Decision> for Verdict {
    fn from(decision: Decision) -> Self {
        Verdict::Decide(decision)
    }
}
