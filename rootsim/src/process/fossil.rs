//! Fossil collection and committed-state inspection.
use crate::message::INIT;
use crate::model::{Effects, Model};
use crate::time::SimTime;

use super::{run_event, Lp, UnblockStatus};

impl<S: Clone> Lp<S> {
    /// Returns the index of the snapshot acting as time barrier: the latest
    /// snapshot strictly older than the GVT, or the oldest one if there is
    /// none.
    fn find_time_barrier(&self, gvt: SimTime) -> Option<usize> {
        if self.snapshots.is_empty() {
            return None;
        }
        if gvt == SimTime::ZERO {
            return Some(0);
        }

        Some(
            self.snapshots
                .iter()
                .rposition(|s| s.lvt < gvt)
                .unwrap_or(0),
        )
    }

    /// Releases the snapshots and messages that can no longer be involved in
    /// a rollback given the GVT.
    pub(crate) fn fossil_collect(&mut self, gvt: SimTime) {
        let Some(barrier) = self.find_time_barrier(gvt) else {
            return;
        };
        self.snapshots.drain(..barrier);

        let barrier_event = self.snapshots[0].last_event;
        let barrier_ts = self.queue_in[barrier_event].timestamp;

        // Rendezvous consumed by events about to be released are committed.
        let queue_in = &self.queue_in;
        self.rendezvous_queue.retain(|r| match r.status {
            UnblockStatus::Consumed(key) => queue_in[key].timestamp >= barrier_ts,
            _ => true,
        });

        let mut committed = 0;
        self.queue_in.truncate_front_while(Some(barrier_event), |m| {
            let release = m.timestamp < barrier_ts;
            if release && m.event_type != INIT {
                committed += 1;
            }
            release
        });
        self.stats.committed += committed;

        while self
            .queue_out
            .front()
            .is_some_and(|h| h.send_time < barrier_ts)
        {
            self.queue_out.pop_front();
        }
        while self
            .control_out
            .front()
            .is_some_and(|h| h.send_time < barrier_ts)
        {
            self.control_out.pop_front();
        }
    }

    /// Evaluates the termination predicate of the model on the committed state
    /// of the LP.
    ///
    /// In accurate mode, the state of the time barrier snapshot is brought
    /// forward to the GVT by silently re-executing the committed events that
    /// follow it on a copy. Returns `false` if no committed state exists.
    pub(crate) fn committed_on_gvt<M>(
        &self,
        model: &M,
        gvt: SimTime,
        accurate: bool,
        lp_count: usize,
    ) -> bool
    where
        M: Model<State = S>,
    {
        let Some(barrier) = self.find_time_barrier(gvt) else {
            return false;
        };
        let snapshot = &self.snapshots[barrier];
        if !accurate {
            return model.on_gvt(self.gid, &snapshot.state);
        }

        let mut state = snapshot.state.clone();
        let mut numerical = snapshot.numerical;
        let mut effects = Effects::default();
        let mut cursor = snapshot.last_event;
        while let Some(next) = self.queue_in.next(cursor) {
            if !self.is_processed(next) || self.queue_in[next].timestamp >= gvt {
                break;
            }
            run_event(
                model,
                self.gid,
                lp_count,
                &self.queue_in[next],
                &mut state,
                &mut numerical,
                &mut effects,
                true,
                false,
            );
            cursor = next;
        }

        model.on_gvt(self.gid, &state)
    }

    /// Accounts for the executed events older than the final GVT as committed.
    pub(crate) fn commit_remaining(&mut self, gvt: SimTime) {
        let Some(bound) = self.bound else {
            return;
        };
        let mut committed = 0;
        for (key, msg) in self.queue_in.iter() {
            if msg.timestamp >= gvt {
                break;
            }
            if msg.event_type != INIT {
                committed += 1;
            }
            if key == bound {
                break;
            }
        }
        self.stats.committed += committed;
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{event, new_lp, run_pending, t, timestamps, Recorder};
    use super::super::LpState;
    use super::*;
    use crate::simulation::Checkpointing;

    #[test]
    fn fossil_collection_keeps_barrier() {
        let mut lp = new_lp(1, Checkpointing::Periodic(2));
        let mut out = Vec::new();
        for i in 1..=8 {
            lp.receive(event(0, 1, i as f64, 0, i)).unwrap();
        }
        run_pending(&mut lp, &mut out);
        // Snapshots at 0, 2, 4, 6, 8.
        assert_eq!(lp.snapshots.len(), 5);

        lp.fossil_collect(t(5.5));
        let lvts: Vec<_> = lp.snapshots.iter().map(|s| s.lvt).collect();
        assert_eq!(lvts, vec![t(4.0), t(6.0), t(8.0)]);
        // INIT and the events at 1, 2 and 3 are released.
        assert_eq!(lp.queue_in.len(), 5);
        assert_eq!(lp.stats.committed, 3);

        // A rollback to the retained barrier still succeeds.
        lp.receive(event(0, 1, 4.5, 0, 100)).unwrap();
        assert_eq!(lp.state, LpState::Rollback);
        lp.rollback(&Recorder, 2, &mut out).unwrap();
        assert_eq!(lp.lvt(), t(4.0));
        assert_eq!(lp.stats.silent_events, 0);

        run_pending(&mut lp, &mut out);
        assert_eq!(
            timestamps(&lp),
            vec![1.0, 2.0, 3.0, 4.0, 4.5, 5.0, 6.0, 7.0, 8.0]
        );
    }

    #[test]
    fn fossil_collection_at_zero_is_noop() {
        let mut lp = new_lp(1, Checkpointing::Copy);
        let mut out = Vec::new();
        lp.receive(event(0, 1, 1.0, 0, 1)).unwrap();
        run_pending(&mut lp, &mut out);

        lp.fossil_collect(SimTime::ZERO);
        assert_eq!(lp.snapshots.len(), 2);
        assert_eq!(lp.queue_in.len(), 2);
    }

    #[test]
    fn output_queue_is_truncated() {
        let mut lp = new_lp(0, Checkpointing::Copy);
        let mut out = Vec::new();
        for i in 1..=4 {
            lp.receive(event(1, 0, i as f64, 1, i)).unwrap();
        }
        run_pending(&mut lp, &mut out);
        assert_eq!(lp.queue_out.len(), 4);

        lp.fossil_collect(t(3.5));
        // The barrier is the snapshot at 3: sends from events 1 and 2 go.
        assert_eq!(lp.queue_out.len(), 2);
    }

    #[test]
    fn accurate_state_is_realigned() {
        let mut lp = new_lp(1, Checkpointing::Periodic(10));
        let mut out = Vec::new();
        for i in 1..=5 {
            lp.receive(event(0, 1, i as f64, 0, i)).unwrap();
        }
        run_pending(&mut lp, &mut out);

        // Only the INIT snapshot is committed: the predicate (3 events) fails
        // on it but holds once realigned to a GVT of 3.5.
        assert!(!lp.committed_on_gvt(&Recorder, t(3.5), false, 2));
        assert!(lp.committed_on_gvt(&Recorder, t(3.5), true, 2));
        assert!(!lp.committed_on_gvt(&Recorder, t(2.5), true, 2));
    }

    #[test]
    fn remaining_events_are_committed() {
        let mut lp = new_lp(1, Checkpointing::Copy);
        let mut out = Vec::new();
        for i in 1..=5 {
            lp.receive(event(0, 1, i as f64, 0, i)).unwrap();
        }
        run_pending(&mut lp, &mut out);

        lp.commit_remaining(t(3.5));
        assert_eq!(lp.stats.committed, 3);
    }
}
