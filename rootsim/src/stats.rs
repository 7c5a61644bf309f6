//! Execution statistics.
use std::ops::AddAssign;

/// Counters of the activity of an LP, or of a set of LPs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpStats {
    /// Events executed in forward mode, including those later rolled back.
    pub events: u64,
    /// Events that became permanent, i.e. older than the GVT.
    pub committed: u64,
    /// Rollbacks performed.
    pub rollbacks: u64,
    /// Events re-executed silently to rebuild a state after a rollback.
    pub silent_events: u64,
    /// Antimessages received.
    pub antimessages: u64,
    /// Checkpoints taken.
    pub checkpoints: u64,
}

impl LpStats {
    /// Returns the ratio of committed events over executed events, or 1 if no
    /// event was executed.
    pub fn efficiency(&self) -> f64 {
        if self.events == 0 {
            1.0
        } else {
            self.committed as f64 / self.events as f64
        }
    }
}

impl AddAssign for LpStats {
    fn add_assign(&mut self, other: Self) {
        self.events += other.events;
        self.committed += other.committed;
        self.rollbacks += other.rollbacks;
        self.silent_events += other.silent_events;
        self.antimessages += other.antimessages;
        self.checkpoints += other.checkpoints;
    }
}
