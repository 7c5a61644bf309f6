//! Input queue management: message reception, straggler and antimessage
//! handling, and the rendezvous state machine.
use std::panic::Location;

use crate::message::{mark_to_gid, MessageKind, Msg, INIT, UNBLOCK};
use crate::simulation::SimulationError;
use crate::time::SimTime;
use crate::util::list::Key;

use super::{Lp, LpState, Rendezvous, UnblockStatus};

impl<S: Clone> Lp<S> {
    /// Local virtual time: the timestamp of the last executed event.
    pub(crate) fn lvt(&self) -> SimTime {
        self.bound
            .map(|bound| self.queue_in[bound].timestamp)
            .unwrap_or(SimTime::ZERO)
    }

    /// Execution ordinal of the bound.
    pub(super) fn bound_seq(&self) -> u64 {
        self.bound
            .map(|bound| self.queue_in[bound].exec_seq)
            .unwrap_or(0)
    }

    /// The first event that was not yet executed.
    fn next_unprocessed(&self) -> Option<Key> {
        match self.bound {
            Some(bound) => self.queue_in.next(bound),
            None => self.queue_in.head(),
        }
    }

    /// Timestamp considered by the scheduler, or `None` if the LP cannot be
    /// scheduled.
    pub(crate) fn next_event_timestamp(&self) -> Option<SimTime> {
        match self.state {
            LpState::WaitForUnblock => None,
            // The pending rollback and the resumption are both performed on
            // the bound.
            LpState::ReadyForSynch | LpState::Rollback => Some(self.lvt()),
            _ => self
                .next_unprocessed()
                .map(|next| self.queue_in[next].timestamp),
        }
    }

    /// Lower bound of the timestamps of the events this LP may still execute,
    /// as contributed to the GVT reduction.
    pub(crate) fn gvt_timestamp(&self) -> SimTime {
        let synchronizing = self.state.is_synchronizing()
            || (self.state == LpState::Rollback && self.resume_state.is_synchronizing());
        if synchronizing {
            return self.lvt();
        }

        self.next_unprocessed()
            .map(|next| self.queue_in[next].timestamp)
            .unwrap_or(SimTime::INFINITY)
    }

    /// Moves the bound to the next event and returns it.
    pub(crate) fn advance_to_next_event(&mut self) -> Option<Key> {
        let next = self.next_unprocessed()?;
        self.bound = Some(next);

        Some(next)
    }

    /// Returns the bound, i.e. the event to resume in `ReadyForSynch` state.
    pub(crate) fn bound(&self) -> Option<Key> {
        self.bound
    }

    /// Returns `true` if the event was already executed.
    pub(super) fn is_processed(&self, key: Key) -> bool {
        let Some(bound) = self.bound else {
            return false;
        };
        let ts = self.queue_in[key].timestamp;
        let bound_ts = self.queue_in[bound].timestamp;
        if ts != bound_ts {
            return ts < bound_ts;
        }

        // Same timestamp: look for the event among the ties up to the bound.
        let mut cursor = Some(bound);
        while let Some(c) = cursor {
            if c == key {
                return true;
            }
            if self.queue_in[c].timestamp != ts {
                return false;
            }
            cursor = self.queue_in.prev(c);
        }

        false
    }

    /// Enqueues a message retrieved from the bottom-half channel.
    pub(crate) fn receive(&mut self, msg: Msg) -> Result<(), SimulationError> {
        match msg.kind {
            MessageKind::Positive => {
                if msg.event_type < 0 {
                    return Err(SimulationError::ReservedEventType {
                        lp: self.gid,
                        event_type: msg.event_type,
                        location: Location::caller(),
                    });
                }
                let ts = msg.timestamp;
                self.queue_in.place_by(msg, |m| m.timestamp);
                if ts < self.lvt() {
                    tracing::debug!(
                        lp = self.gid.index(),
                        straggler = %ts,
                        lvt = %self.lvt(),
                        "straggler received"
                    );
                    self.rewind(ts);
                }
                Ok(())
            }
            MessageKind::Negative => self.annihilate(&msg),
            MessageKind::Control if msg.event_type == UNBLOCK => {
                self.receive_unblock(&msg);
                Ok(())
            }
            MessageKind::NegativeControl if msg.event_type == UNBLOCK => {
                self.annihilate_unblock(&msg)
            }
            MessageKind::Control | MessageKind::NegativeControl => {
                Err(SimulationError::ReservedEventType {
                    lp: self.gid,
                    event_type: msg.event_type,
                    location: Location::caller(),
                })
            }
        }
    }

    /// Moves the bound back to the last event with a timestamp strictly lower
    /// than `offending`, which requires a rollback.
    ///
    /// Events tied with the offending timestamp are undone as well. The bound
    /// never moves before the head of the queue.
    pub(super) fn rewind(&mut self, offending: SimTime) {
        let Some(mut bound) = self.bound else {
            return;
        };
        while self.queue_in[bound].timestamp >= offending {
            match self.queue_in.prev(bound) {
                Some(prev) => bound = prev,
                None => break,
            }
        }

        if self.state != LpState::Rollback {
            self.resume_state = self.state;
            self.state = LpState::Rollback;
        }
        self.bound = Some(bound);

        // Snapshots and rendezvous must not refer to undone events, which may
        // be removed from the queue before the rollback itself takes place.
        self.discard_snapshots_after_bound();
        self.undo_rendezvous_after_bound();
    }

    /// Cancels the message matching an antimessage.
    fn annihilate(&mut self, anti: &Msg) -> Result<(), SimulationError> {
        // Matching messages are most often recent ones.
        let Some(key) = self
            .queue_in
            .rfind(|m| m.mark == anti.mark && m.event_type != INIT)
        else {
            tracing::debug!(
                lp = self.gid.index(),
                origin = mark_to_gid(anti.mark).index(),
                mark = anti.mark,
                "no message matches the antimessage"
            );
            return Err(SimulationError::UnmatchedAntimessage {
                lp: self.gid,
                mark: anti.mark,
                location: Location::caller(),
            });
        };
        tracing::trace!(
            lp = self.gid.index(),
            mark = anti.mark,
            timestamp = %anti.timestamp,
            "antimessage received"
        );
        self.stats.antimessages += 1;

        if self.is_processed(key) {
            self.rewind(self.queue_in[key].timestamp);
        }
        if self.bound == Some(key) {
            return Err(SimulationError::InvalidState {
                lp: self.gid,
                description: "antimessage cancels the first event of the input queue",
                location: Location::caller(),
            });
        }
        self.queue_in.remove(key);

        Ok(())
    }

    fn receive_unblock(&mut self, msg: &Msg) {
        self.rendezvous_queue.push(Rendezvous {
            mark: msg.rendezvous_mark,
            status: UnblockStatus::Pending,
        });
        self.try_unblock();
    }

    /// Uses a pending unblock message, if the LP is waiting for one.
    pub(super) fn try_unblock(&mut self) {
        let waiting = self.state == LpState::WaitForUnblock
            || (self.state == LpState::Rollback && self.resume_state == LpState::WaitForUnblock);
        if !waiting {
            return;
        }
        let Some(rendezvous) = self
            .rendezvous_queue
            .iter_mut()
            .find(|r| r.status == UnblockStatus::Pending)
        else {
            return;
        };

        rendezvous.status = UnblockStatus::Unblocking;
        if self.state == LpState::Rollback {
            self.resume_state = LpState::ReadyForSynch;
        } else {
            self.state = LpState::ReadyForSynch;
        }
    }

    /// Cancels an unblock message.
    ///
    /// If the unblock was already used to resume the LP, the LP rolls back
    /// before the resumed event.
    fn annihilate_unblock(&mut self, anti: &Msg) -> Result<(), SimulationError> {
        let Some(mut index) = self
            .rendezvous_queue
            .iter()
            .rposition(|r| r.mark == anti.rendezvous_mark)
        else {
            return Err(SimulationError::UnmatchedAntimessage {
                lp: self.gid,
                mark: anti.mark,
                location: Location::caller(),
            });
        };
        self.stats.antimessages += 1;

        if let UnblockStatus::Consumed(key) = self.rendezvous_queue[index].status {
            self.rewind(self.queue_in[key].timestamp);
            // Rewinding may have released other rendezvous but keeps the order.
            index = self
                .rendezvous_queue
                .iter()
                .rposition(|r| r.mark == anti.rendezvous_mark)
                .unwrap_or(index);
        }

        let rendezvous = self.rendezvous_queue.remove(index);
        if rendezvous.status == UnblockStatus::Unblocking {
            if self.state == LpState::ReadyForSynch {
                self.state = LpState::WaitForUnblock;
            } else if self.state == LpState::Rollback
                && self.resume_state == LpState::ReadyForSynch
            {
                self.resume_state = LpState::WaitForUnblock;
            }
            self.try_unblock();
        }

        Ok(())
    }

    /// Suspends the LP on its bound event.
    pub(super) fn suspend(&mut self) {
        self.suspended_at = self.bound;
        self.state = LpState::WaitForUnblock;
        self.try_unblock();
    }

    /// Records the completion of the resumed execution of `key`.
    pub(super) fn complete_resumption(&mut self, key: Key) {
        if let Some(rendezvous) = self
            .rendezvous_queue
            .iter_mut()
            .find(|r| r.status == UnblockStatus::Unblocking)
        {
            rendezvous.status = UnblockStatus::Consumed(key);
        }
        self.suspended_at = None;
        self.checkpointing.forced = true;
    }

    /// Releases the rendezvous bound to events that were undone.
    fn undo_rendezvous_after_bound(&mut self) {
        if let Some(suspended_at) = self.suspended_at {
            if !self.is_processed(suspended_at) {
                self.suspended_at = None;
                if self.resume_state.is_synchronizing() {
                    self.resume_state = LpState::Ready;
                }
                for rendezvous in &mut self.rendezvous_queue {
                    if rendezvous.status == UnblockStatus::Unblocking {
                        rendezvous.status = UnblockStatus::Pending;
                    }
                }
            }
        }

        for i in 0..self.rendezvous_queue.len() {
            if let UnblockStatus::Consumed(key) = self.rendezvous_queue[i].status {
                if !self.is_processed(key) {
                    self.rendezvous_queue[i].status = UnblockStatus::Pending;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{event, new_lp, run_pending, t, timestamps};
    use super::*;
    use crate::simulation::Checkpointing;

    #[test]
    fn straggler_triggers_rollback() {
        let mut lp = new_lp(1, Checkpointing::Copy);
        let mut out = Vec::new();
        lp.receive(event(0, 1, 2.0, 0, 1)).unwrap();
        lp.receive(event(0, 1, 4.0, 0, 2)).unwrap();
        run_pending(&mut lp, &mut out);
        assert_eq!(lp.lvt(), t(4.0));

        lp.receive(event(0, 1, 3.0, 0, 3)).unwrap();
        assert_eq!(lp.state, LpState::Rollback);
        assert_eq!(lp.lvt(), t(2.0));

        run_pending(&mut lp, &mut out);
        assert_eq!(timestamps(&lp), vec![2.0, 3.0, 4.0]);
        assert_eq!(lp.stats.rollbacks, 1);
        assert_eq!(lp.state, LpState::Ready);
    }

    #[test]
    fn ties_with_straggler_are_undone() {
        let mut lp = new_lp(1, Checkpointing::Copy);
        let mut out = Vec::new();
        lp.receive(event(0, 1, 1.0, 0, 1)).unwrap();
        lp.receive(event(0, 1, 2.0, 0, 2)).unwrap();
        lp.receive(event(0, 1, 2.0, 1, 3)).unwrap();
        lp.receive(event(0, 1, 5.0, 0, 4)).unwrap();
        run_pending(&mut lp, &mut out);

        // An antimessage for one of the tied events undoes both of them.
        let mut anti = event(0, 1, 2.0, 1, 3);
        anti.kind = MessageKind::Negative;
        lp.receive(anti).unwrap();
        assert_eq!(lp.lvt(), t(1.0));

        run_pending(&mut lp, &mut out);
        assert_eq!(
            lp.current_state().as_slice(),
            &[(1.0, 0), (2.0, 0), (5.0, 0)]
        );
        assert_eq!(lp.stats.antimessages, 1);
    }

    #[test]
    fn straggler_at_time_zero_cancels_undone_sends() {
        let mut lp = new_lp(0, Checkpointing::Copy);
        let mut out = Vec::new();
        // The type 1 event sends a message to LP 1.
        lp.receive(event(1, 0, 0.0, 1, 1)).unwrap();
        lp.receive(event(1, 0, 0.5, 0, 2)).unwrap();
        run_pending(&mut lp, &mut out);
        assert_eq!(out.len(), 1);

        // Only INIT precedes the straggler, so both events are undone and
        // the first one sends its message again.
        lp.receive(event(1, 0, 0.0, 0, 3)).unwrap();
        assert_eq!(lp.lvt(), SimTime::ZERO);
        run_pending(&mut lp, &mut out);

        let positives: Vec<_> = out.iter().filter(|m| m.kind == MessageKind::Positive).collect();
        let negatives: Vec<_> = out.iter().filter(|m| m.kind == MessageKind::Negative).collect();
        assert_eq!(positives.len(), 2);
        assert_eq!(negatives.len(), 1);
        assert_eq!(negatives[0].mark, positives[0].mark);
        assert_eq!(
            lp.current_state().as_slice(),
            &[(0.0, 1), (0.0, 0), (0.5, 0)]
        );
    }

    #[test]
    fn antimessage_for_pending_event_needs_no_rollback() {
        let mut lp = new_lp(1, Checkpointing::Copy);
        let mut out = Vec::new();
        lp.receive(event(0, 1, 1.0, 0, 1)).unwrap();
        run_pending(&mut lp, &mut out);
        lp.receive(event(0, 1, 3.0, 0, 2)).unwrap();

        let mut anti = event(0, 1, 3.0, 0, 2);
        anti.kind = MessageKind::Negative;
        lp.receive(anti).unwrap();

        assert_eq!(lp.state, LpState::Ready);
        assert_eq!(lp.next_event_timestamp(), None);
        assert_eq!(lp.gvt_timestamp(), SimTime::INFINITY);
    }

    #[test]
    fn unmatched_antimessage_is_fatal() {
        let mut lp = new_lp(1, Checkpointing::Copy);
        let mut anti = event(0, 1, 3.0, 0, 42);
        anti.kind = MessageKind::Negative;

        assert!(matches!(
            lp.receive(anti),
            Err(SimulationError::UnmatchedAntimessage { mark: 42, .. })
        ));
    }

    #[test]
    fn reserved_types_are_rejected() {
        let mut lp = new_lp(1, Checkpointing::Copy);

        assert!(matches!(
            lp.receive(event(0, 1, 3.0, INIT, 5)),
            Err(SimulationError::ReservedEventType { event_type: INIT, .. })
        ));
    }
}
