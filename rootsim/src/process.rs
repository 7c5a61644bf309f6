//! Logical process control block.
//!
//! An [`Lp`] holds everything the kernel knows about one logical process: its
//! input queue with the `bound` cursor on the last executed event, the headers
//! of the messages it sent, the chain of state snapshots and the current model
//! state.
//!
//! An LP is exclusively owned by the worker it is bound to, so none of its
//! methods need synchronization. Messages from other LPs only reach it through
//! its bottom-half channel.
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::message::{Msg, MsgHeader, MessageKind};
use crate::model::{Context, Effects, Event, LpId, Model};
use crate::numerical::Numerical;
use crate::simulation::{Checkpointing, SimulationError};
use crate::stats::LpStats;
use crate::time::SimTime;
use crate::util::list::{Key, List};

mod fossil;
mod queues;
mod state;

/// Execution state of an LP.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LpState {
    Ready,
    Running,
    /// The bound was moved back and the state must be restored.
    Rollback,
    SilentExec,
    /// Suspended by the model, waiting for an unblock control message.
    WaitForUnblock,
    /// Unblocked, waiting to re-execute the event that suspended the LP.
    ReadyForSynch,
}

impl LpState {
    /// Returns `true` if the LP is within a suspension, whether unblocked yet
    /// or not.
    fn is_synchronizing(self) -> bool {
        matches!(self, Self::WaitForUnblock | Self::ReadyForSynch)
    }
}

/// A checkpoint of an LP.
pub(crate) struct Snapshot<S> {
    lvt: SimTime,
    /// The last event executed when the snapshot was taken.
    last_event: Key,
    state: S,
    numerical: Numerical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum UnblockStatus {
    /// Received but not yet used to resume the LP.
    Pending,
    /// The LP is ready to resume thanks to this message.
    Unblocking,
    /// The LP resumed the execution of this event thanks to this message.
    Consumed(Key),
}

/// A received unblock control message.
#[derive(Debug)]
struct Rendezvous {
    mark: u64,
    status: UnblockStatus,
}

struct CheckpointPolicy {
    mode: Checkpointing,
    period: usize,
    from_last_ckpt: usize,
    forced: bool,
}

/// The control block of a logical process.
pub(crate) struct Lp<S> {
    pub(crate) gid: LpId,
    pub(crate) state: LpState,
    /// The state to enter once a pending rollback completes.
    resume_state: LpState,
    queue_in: List<Msg>,
    /// The last executed event; only `None` before initialization.
    bound: Option<Key>,
    queue_out: VecDeque<MsgHeader>,
    control_out: VecDeque<MsgHeader>,
    rendezvous_queue: Vec<Rendezvous>,
    suspended_at: Option<Key>,
    /// Ordinal of the next forward execution. INIT has ordinal 0.
    next_seq: u64,
    snapshots: VecDeque<Snapshot<S>>,
    current: S,
    numerical: Numerical,
    effects: Effects,
    checkpointing: CheckpointPolicy,
    /// Wall-clock time spent in forward execution.
    busy: Duration,
    /// Set once `on_gvt` returned `true` in incremental termination mode.
    pub(crate) ccgs_done: bool,
    pub(crate) stats: LpStats,
}

impl<S: Clone> Lp<S> {
    /// Creates an LP and runs its INIT event.
    ///
    /// The messages scheduled by the model during initialization are left in
    /// the outgoing buffer and must be flushed with [`Lp::send_outgoing`].
    pub(crate) fn new<M>(
        model: &M,
        gid: LpId,
        lp_count: usize,
        master_seed: u64,
        checkpointing: Checkpointing,
    ) -> Result<Self, SimulationError>
    where
        M: Model<State = S>,
    {
        let mut queue_in = List::new();
        let init = queue_in.push_front(Msg::init(gid));
        let mut numerical = Numerical::new(master_seed, gid.index());
        let mut effects = Effects::default();

        let current = {
            let _time = crate::tracing::enter_time(SimTime::ZERO);
            let mut cx = Context::new(
                gid,
                lp_count,
                SimTime::ZERO,
                &mut numerical,
                &mut effects,
                false,
            );
            model.init(gid, &mut cx)
        };
        if let Some(error) = effects.error.take() {
            return Err(error);
        }
        if std::mem::take(&mut effects.suspend) {
            tracing::warn!(lp = gid.index(), "suspension requested during INIT was ignored");
        }

        let period = match checkpointing {
            Checkpointing::Copy => 1,
            Checkpointing::Periodic(period) => period.max(1),
        };
        let mut lp = Self {
            gid,
            state: LpState::Ready,
            resume_state: LpState::Ready,
            queue_in,
            bound: Some(init),
            queue_out: VecDeque::new(),
            control_out: VecDeque::new(),
            rendezvous_queue: Vec::new(),
            suspended_at: None,
            next_seq: 1,
            snapshots: VecDeque::new(),
            current,
            numerical,
            effects,
            checkpointing: CheckpointPolicy {
                mode: checkpointing,
                period,
                from_last_ckpt: 0,
                // The state right after INIT is always logged.
                forced: true,
            },
            busy: Duration::ZERO,
            ccgs_done: false,
            stats: LpStats::default(),
        };
        lp.apply_checkpoint_requests();
        lp.log_state();

        Ok(lp)
    }

    /// Returns the current model state of the LP.
    pub(crate) fn current_state(&self) -> &S {
        &self.current
    }

    pub(crate) fn into_state(self) -> S {
        self.current
    }

    /// Estimated load of the LP, used for load-based rebinding.
    ///
    /// This is the number of events in the input queue times the mean
    /// wall-clock cost of an event, over the simulated time spanned by the
    /// input queue.
    pub(crate) fn workload_factor(&self) -> f64 {
        let mean_cost = self.busy.as_secs_f64() / self.stats.events.max(1) as f64;
        let span = match (self.queue_in.head(), self.queue_in.tail()) {
            (Some(first), Some(last)) => {
                self.queue_in[last].timestamp.as_f64() - self.queue_in[first].timestamp.as_f64()
            }
            _ => 0.0,
        };
        let span = if span.is_finite() && span > 0.0 { span } else { 1.0 };

        self.queue_in.len() as f64 * mean_cost / span
    }

    /// Executes the event designated by `key` on the current state.
    fn execute<M>(&mut self, model: &M, key: Key, lp_count: usize, silent: bool, resumed: bool)
    where
        M: Model<State = S>,
    {
        let Self {
            gid,
            queue_in,
            current,
            numerical,
            effects,
            ..
        } = self;

        run_event(
            model,
            *gid,
            lp_count,
            &queue_in[key],
            current,
            numerical,
            effects,
            silent,
            resumed,
        );
    }

    /// Forward execution of the event designated by `key`, with the
    /// bookkeeping of its effects. The outgoing messages are not flushed.
    pub(crate) fn process_event<M>(
        &mut self,
        model: &M,
        key: Key,
        lp_count: usize,
        resumed: bool,
    ) -> Result<(), SimulationError>
    where
        M: Model<State = S>,
    {
        self.state = LpState::Running;
        self.queue_in[key].exec_seq = self.next_seq;
        self.next_seq += 1;
        let start = Instant::now();
        self.execute(model, key, lp_count, false, resumed);
        self.busy += start.elapsed();
        self.stats.events += 1;

        if let Some(error) = self.effects.error.take() {
            return Err(error);
        }
        self.apply_checkpoint_requests();

        if resumed {
            self.complete_resumption(key);
        }
        if std::mem::take(&mut self.effects.suspend) {
            self.suspend();
        } else {
            self.state = LpState::Ready;
        }

        Ok(())
    }

    fn apply_checkpoint_requests(&mut self) {
        if std::mem::take(&mut self.effects.force_checkpoint) {
            self.checkpointing.forced = true;
        }
        if let Some(period) = self.effects.checkpoint_period.take() {
            self.checkpointing.period = period;
        }
    }

    /// Sends the messages generated by the last executed event, keeping their
    /// headers for antimessage generation.
    pub(crate) fn send_outgoing(&mut self, out: &mut Vec<Msg>) {
        let producer = self.bound_seq();
        for msg in self.effects.outgoing.drain(..) {
            match msg.kind {
                MessageKind::Control => self.control_out.push_back(msg.header(producer)),
                _ => self.queue_out.push_back(msg.header(producer)),
            }
            out.push(msg);
        }
    }
}

/// Runs a model callback for one message on the given state.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_event<M: Model>(
    model: &M,
    gid: LpId,
    lp_count: usize,
    msg: &Msg,
    state: &mut M::State,
    numerical: &mut Numerical,
    effects: &mut Effects,
    silent: bool,
    resumed: bool,
) {
    let _time = crate::tracing::enter_time(msg.timestamp);
    let mut cx = Context::new(gid, lp_count, msg.timestamp, numerical, effects, silent);

    model.process_event(state, &Event::new(msg, resumed), &mut cx);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A model recording the timestamps and types of the events it executes.
    ///
    /// Events of type 1 sent to LP 0 trigger a type 10 event for LP 1, ten
    /// time units later. Events of type 2 set the checkpoint period to 2.
    pub(crate) struct Recorder;

    impl Model for Recorder {
        type State = Vec<(f64, i32)>;

        fn init(&self, _lp: LpId, _cx: &mut Context<'_>) -> Self::State {
            Vec::new()
        }

        fn process_event(&self, state: &mut Self::State, event: &Event<'_>, cx: &mut Context<'_>) {
            state.push((event.timestamp().as_f64(), event.event_type()));
            // Draw a number so that the RNG state is part of the replay.
            cx.random();
            if event.event_type() == 1 && cx.lp() == LpId::new(0) {
                let t = cx.now() + 10.0;
                cx.schedule_new_event(LpId::new(1), t, 10, &[]).unwrap();
            }
            if event.event_type() == 2 {
                cx.set_checkpoint_period(2);
            }
        }

        fn on_gvt(&self, _lp: LpId, state: &Self::State) -> bool {
            state.len() >= 3
        }
    }

    pub(crate) fn t(x: f64) -> SimTime {
        SimTime::new(x).unwrap()
    }

    pub(crate) fn event(
        sender: usize,
        receiver: usize,
        ts: f64,
        event_type: i32,
        mark: u64,
    ) -> Msg {
        Msg {
            sender: LpId::new(sender),
            receiver: LpId::new(receiver),
            event_type,
            kind: MessageKind::Positive,
            timestamp: t(ts),
            send_time: SimTime::ZERO,
            mark,
            rendezvous_mark: 0,
            payload: Box::new([]),
            exec_seq: 0,
        }
    }

    pub(crate) fn new_lp(gid: usize, checkpointing: Checkpointing) -> Lp<Vec<(f64, i32)>> {
        Lp::new(&Recorder, LpId::new(gid), 2, 1, checkpointing).unwrap()
    }

    /// Executes all pending events, performing rollbacks as needed.
    pub(crate) fn run_pending(lp: &mut Lp<Vec<(f64, i32)>>, out: &mut Vec<Msg>) {
        loop {
            if lp.state == LpState::Rollback {
                lp.rollback(&Recorder, 2, out).unwrap();
                continue;
            }
            let Some(key) = lp.advance_to_next_event() else {
                break;
            };
            lp.process_event(&Recorder, key, 2, false).unwrap();
            lp.send_outgoing(out);
            lp.log_state();
        }
    }

    pub(crate) fn timestamps(lp: &Lp<Vec<(f64, i32)>>) -> Vec<f64> {
        lp.current_state().iter().map(|e| e.0).collect()
    }

    #[test]
    fn init_is_checkpointed() {
        let lp = new_lp(0, Checkpointing::Periodic(5));

        assert_eq!(lp.snapshots.len(), 1);
        assert_eq!(lp.lvt(), SimTime::ZERO);
        assert_eq!(lp.state, LpState::Ready);
        assert!(lp.current_state().is_empty());
    }

    #[test]
    fn events_are_executed_in_order() {
        let mut lp = new_lp(0, Checkpointing::Copy);
        let mut out = Vec::new();
        for (i, ts) in [3.0, 1.0, 2.0].into_iter().enumerate() {
            lp.receive(event(1, 0, ts, 0, i as u64)).unwrap();
        }
        run_pending(&mut lp, &mut out);

        assert_eq!(timestamps(&lp), vec![1.0, 2.0, 3.0]);
        assert_eq!(lp.lvt(), t(3.0));
        assert_eq!(lp.snapshots.len(), 4);
        assert_eq!(lp.stats.events, 3);
    }
}
