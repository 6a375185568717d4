use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinates::GridCoord;
use crate::decision::Decision;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace window ends at {end} before it starts at {start}")]
    EndBeforeStart { start: usize, end: usize },
    #[error("trace window ends at {end} but only {len} entries exist")]
    OutOfRange { end: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub decision: Decision,
    pub location: GridCoord,
}

/// Append-only log of accepted decisions and where each one left the drone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trace {
    entries: Vec<TraceEntry>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, decision: Decision, location: GridCoord) {
        self.entries.push(TraceEntry { decision, location });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TraceEntry> {
        self.entries.get(index)
    }

    pub fn location(&self, index: usize) -> Option<GridCoord> {
        self.get(index).map(|entry| entry.location)
    }

    pub fn last(&self) -> Option<&TraceEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter()
    }

    /// Copy of the entries `start..=end`.
    pub fn sub_trace(&self, start: usize, end: usize) -> Result<Trace, TraceError> {
        if end < start {
            return Err(TraceError::EndBeforeStart { start, end });
        }
        if end >= self.entries.len() {
            return Err(TraceError::OutOfRange {
                end,
                len: self.entries.len(),
            });
        }
        Ok(Trace {
            entries: self.entries[start..=end].to_vec(),
        })
    }
}
