use parking_lot::{Condvar, Mutex};
use tracing::warn;

/// Counted pause switch for the think cycle. Every `enter` must be matched by
/// a `leave`; the cycle only runs while the count is zero.
#[derive(Debug, Default)]
pub struct StandbyGate {
    depth: Mutex<usize>,
    resumed: Condvar,
}

impl StandbyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) {
        *self.depth.lock() += 1;
    }

    /// Returns `false` for a `leave` without a matching `enter`, which is
    /// logged and leaves the gate open.
    pub fn leave(&self) -> bool {
        let mut depth = self.depth.lock();
        if *depth == 0 {
            warn!("stand-by left more often than entered");
            return false;
        }
        *depth -= 1;
        if *depth == 0 {
            self.resumed.notify_one();
        }
        true
    }

    /// Scoped `enter`/`leave` pair.
    pub fn hold(&self) -> StandbyGuard<'_> {
        self.enter();
        StandbyGuard { gate: self }
    }

    pub fn depth(&self) -> usize {
        *self.depth.lock()
    }

    /// Blocks while the gate is held.
    pub fn wait_if_standby(&self) {
        let mut depth = self.depth.lock();
        while *depth > 0 {
            self.resumed.wait(&mut depth);
        }
    }
}

pub struct StandbyGuard<'a> {
    gate: &'a StandbyGate,
}

impl Drop for StandbyGuard<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}
