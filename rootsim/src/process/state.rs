//! State log and rollback engine.
use std::panic::Location;

use crate::message::Msg;
use crate::model::Model;
use crate::simulation::{Checkpointing, SimulationError};
use crate::util::list::Key;

use super::{Lp, LpState, Snapshot};

impl<S: Clone> Lp<S> {
    /// Checkpoints the state after the last executed event if the
    /// checkpointing policy requires it.
    ///
    /// Returns `true` if a snapshot was taken.
    pub(crate) fn log_state(&mut self) -> bool {
        if self.state.is_synchronizing() {
            return false;
        }

        let policy = &mut self.checkpointing;
        policy.from_last_ckpt += 1;
        let take = policy.forced
            || match policy.mode {
                Checkpointing::Copy => true,
                Checkpointing::Periodic(_) => policy.from_last_ckpt >= policy.period,
            };
        if take {
            self.take_snapshot();
        }

        take
    }

    fn take_snapshot(&mut self) {
        let Some(bound) = self.bound else {
            return;
        };
        self.snapshots.push_back(Snapshot {
            lvt: self.queue_in[bound].timestamp,
            last_event: bound,
            state: self.current.clone(),
            numerical: self.numerical,
        });
        self.checkpointing.from_last_ckpt = 0;
        self.checkpointing.forced = false;
        self.stats.checkpoints += 1;
    }

    /// Deletes the snapshots taken after the bound.
    pub(super) fn discard_snapshots_after_bound(&mut self) {
        while let Some(snapshot) = self.snapshots.back() {
            if self.is_processed(snapshot.last_event) {
                break;
            }
            self.snapshots.pop_back();
        }
    }

    /// Installs the latest snapshot and returns the event it was taken after.
    fn restore_state(&mut self) -> Option<Key> {
        let snapshot = self.snapshots.back()?;
        self.current = snapshot.state.clone();
        self.numerical = snapshot.numerical;

        Some(snapshot.last_event)
    }

    /// Re-executes the events following `from` up to the bound, discarding
    /// their outputs. Returns the number of re-executed events.
    fn silent_execution<M>(&mut self, model: &M, from: Key, lp_count: usize) -> usize
    where
        M: Model<State = S>,
    {
        let Some(bound) = self.bound else {
            return 0;
        };
        let previous = self.state;
        self.state = LpState::SilentExec;

        let mut count = 0;
        let mut cursor = from;
        while cursor != bound {
            let Some(next) = self.queue_in.next(cursor) else {
                break;
            };
            cursor = next;
            self.execute(model, cursor, lp_count, true, false);
            count += 1;
        }
        self.state = previous;

        count
    }

    /// Restores the LP to the state it had right after executing its bound.
    ///
    /// The bound must have been repositioned beforehand, which leaves the LP
    /// in `Rollback` state. Antimessages for the messages sent by undone events
    /// are pushed to `out`.
    pub(crate) fn rollback<M>(
        &mut self,
        model: &M,
        lp_count: usize,
        out: &mut Vec<Msg>,
    ) -> Result<(), SimulationError>
    where
        M: Model<State = S>,
    {
        if self.state != LpState::Rollback {
            return Err(SimulationError::InvalidState {
                lp: self.gid,
                description: "rollback requested outside of the rollback state",
                location: Location::caller(),
            });
        }
        let lvt = self.lvt();

        let sent = self.send_antimessages(out) + self.rollback_control_message(out);
        self.discard_snapshots_after_bound();
        let Some(from) = self.restore_state() else {
            return Err(SimulationError::InvalidState {
                lp: self.gid,
                description: "no snapshot to roll back to",
                location: Location::caller(),
            });
        };
        let replayed = self.silent_execution(model, from, lp_count);
        if let Some(error) = self.effects.error.take() {
            return Err(error);
        }

        self.checkpointing.from_last_ckpt = replayed;
        self.stats.rollbacks += 1;
        self.stats.silent_events += replayed as u64;
        self.state = self.resume_state;
        // Unblocks received while the rollback was pending are used now.
        self.try_unblock();
        tracing::debug!(
            lp = self.gid.index(),
            lvt = %lvt,
            antimessages = sent,
            replayed,
            "rollback"
        );

        Ok(())
    }

    /// Sends antimessages for all messages sent by events executed after the
    /// bound.
    ///
    /// Executed events have increasing ordinals in queue order, so the
    /// messages to cancel are the ones with a producer ordinal above that of
    /// the bound.
    fn send_antimessages(&mut self, out: &mut Vec<Msg>) -> usize {
        let bound_seq = self.bound_seq();
        let mut count = 0;
        while let Some(header) = self.queue_out.back() {
            if header.producer <= bound_seq {
                break;
            }
            out.push(header.antimessage());
            self.queue_out.pop_back();
            count += 1;
        }

        count
    }

    /// Sends negative control messages for all control messages sent after
    /// the bound.
    fn rollback_control_message(&mut self, out: &mut Vec<Msg>) -> usize {
        let bound_seq = self.bound_seq();
        let mut count = 0;
        while let Some(header) = self.control_out.back() {
            if header.producer <= bound_seq {
                break;
            }
            out.push(header.antimessage());
            self.control_out.pop_back();
            count += 1;
        }

        count
    }
}
