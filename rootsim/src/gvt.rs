//! Global virtual time reduction.
//!
//! The GVT is computed without stopping the workers: each worker polls the
//! reduction state once per iteration of its main loop and moves through the
//! phases of the round at its own pace.
//!
//! A round is started by the first worker noticing that the wall-clock GVT
//! period has elapsed. It then proceeds as follows:
//!
//! 1. *Phase A*: each worker starts recording the minimum timestamp of the
//!    messages it sends, then checks in.
//! 2. *Send*: once all workers have checked in, each worker drains its
//!    bottom-half channels one more time, which collects all the messages
//!    sent before the round started, then checks in.
//! 3. *Phase B*: once all workers have drained their channels, each worker
//!    publishes the minimum of the next event timestamps of its LPs and of the
//!    timestamps of the messages it sent since phase A, then checks in.
//! 4. *Aware*: once all minima are published, each worker computes the GVT
//!    as their minimum, performs fossil collection and, every few rounds,
//!    evaluates the termination predicate of its LPs. The last worker to
//!    check in decides whether the simulation ends and closes the round.
//! 5. *End*: each worker resets its published minimum and checks out, after
//!    which a new round may start.
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

use crate::time::SimTime;
use crate::transport::Transport;

pub(crate) mod ccgs;

/// GVT reduction state shared by all workers.
pub(crate) struct GvtShared {
    workers: usize,
    period: Duration,
    time_bound: Option<SimTime>,
    epoch: Instant,
    /// End of the last round, in nanoseconds since `epoch`.
    last_round_end: AtomicU64,
    /// Number of started rounds.
    round: CachePadded<AtomicU64>,
    in_progress: CachePadded<AtomicBool>,
    counter_a: CachePadded<AtomicUsize>,
    counter_send: CachePadded<AtomicUsize>,
    counter_b: CachePadded<AtomicUsize>,
    counter_aware: CachePadded<AtomicUsize>,
    counter_end: CachePadded<AtomicUsize>,
    /// Local minima published by the workers in phase B.
    minima: Box<[CachePadded<AtomicU64>]>,
    /// Set by any worker whose LPs do not all agree to terminate.
    ccgs_veto: AtomicBool,
    gvt: AtomicU64,
    completed_rounds: AtomicU64,
    end: AtomicBool,
}

impl GvtShared {
    pub(crate) fn new(workers: usize, period: Duration, time_bound: Option<SimTime>) -> Self {
        Self {
            workers,
            period,
            time_bound,
            epoch: Instant::now(),
            last_round_end: AtomicU64::new(0),
            round: CachePadded::new(AtomicU64::new(0)),
            in_progress: CachePadded::new(AtomicBool::new(false)),
            counter_a: CachePadded::new(AtomicUsize::new(0)),
            counter_send: CachePadded::new(AtomicUsize::new(0)),
            counter_b: CachePadded::new(AtomicUsize::new(0)),
            counter_aware: CachePadded::new(AtomicUsize::new(0)),
            counter_end: CachePadded::new(AtomicUsize::new(0)),
            minima: (0..workers)
                .map(|_| CachePadded::new(AtomicU64::new(SimTime::INFINITY.to_bits())))
                .collect(),
            ccgs_veto: AtomicBool::new(false),
            gvt: AtomicU64::new(SimTime::ZERO.to_bits()),
            completed_rounds: AtomicU64::new(0),
            end: AtomicBool::new(false),
        }
    }

    /// Returns the last committed GVT.
    pub(crate) fn gvt(&self) -> SimTime {
        SimTime::from_bits(self.gvt.load(Ordering::Acquire))
    }

    /// Returns the number of completed rounds.
    pub(crate) fn completed_rounds(&self) -> u64 {
        self.completed_rounds.load(Ordering::Acquire)
    }

    /// Returns `true` once a round decided that the simulation is over.
    pub(crate) fn should_end(&self) -> bool {
        self.end.load(Ordering::Acquire)
    }

    fn elapsed_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Starts a new round if the GVT period has elapsed and no round is
    /// running.
    fn try_start_round(&self) {
        if self.in_progress.load(Ordering::Acquire)
            || self.counter_end.load(Ordering::Acquire) != 0
        {
            return;
        }
        let since_last = self
            .elapsed_nanos()
            .saturating_sub(self.last_round_end.load(Ordering::Relaxed));
        if since_last < self.period.as_nanos() as u64 {
            return;
        }
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        for counter in [
            &self.counter_a,
            &self.counter_send,
            &self.counter_b,
            &self.counter_aware,
            &self.counter_end,
        ] {
            counter.store(self.workers, Ordering::Relaxed);
        }
        self.ccgs_veto.store(false, Ordering::Relaxed);
        // Publishes the counters to the workers joining the round.
        self.round.fetch_add(1, Ordering::Release);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    Send { drained: bool },
    B,
    Aware,
    End,
}

/// The progress of a worker in the GVT reduction.
pub(crate) struct GvtWorker {
    id: usize,
    phase: Phase,
    round_seen: u64,
    /// Minimum timestamp of the messages sent since phase A.
    red_min: SimTime,
    tracking: bool,
    last_gvt: SimTime,
    rounds: u64,
    snapshot_cycles: u64,
}

impl GvtWorker {
    pub(crate) fn new(id: usize, snapshot_cycles: u32) -> Self {
        Self {
            id,
            phase: Phase::Idle,
            round_seen: 0,
            red_min: SimTime::INFINITY,
            tracking: false,
            last_gvt: SimTime::ZERO,
            rounds: 0,
            snapshot_cycles: snapshot_cycles.max(1) as u64,
        }
    }

    /// Records the timestamp of a sent message.
    pub(crate) fn on_send(&mut self, timestamp: SimTime) {
        if self.tracking {
            self.red_min = self.red_min.min(timestamp);
        }
    }

    /// Number of GVT values adopted by this worker.
    pub(crate) fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Returns `true` if termination must be evaluated on the GVT being
    /// adopted.
    pub(crate) fn is_ccgs_round(&self) -> bool {
        self.rounds % self.snapshot_cycles == 0
    }

    /// Advances the reduction as far as possible without waiting.
    ///
    /// Returns the new GVT when it becomes known to this worker, in which case
    /// [`GvtWorker::complete_aware`] must be called once the GVT has been
    /// consumed.
    pub(crate) fn poll<F>(&mut self, shared: &GvtShared, local_min: F) -> Option<SimTime>
    where
        F: FnOnce() -> SimTime,
    {
        match self.phase {
            Phase::Idle => {
                shared.try_start_round();
                let round = shared.round.load(Ordering::Acquire);
                if round != self.round_seen {
                    self.round_seen = round;
                    self.red_min = SimTime::INFINITY;
                    self.tracking = true;
                    shared.counter_a.fetch_sub(1, Ordering::AcqRel);
                    self.phase = Phase::Send { drained: false };
                }
            }
            Phase::Send { drained } => {
                if shared.counter_a.load(Ordering::Acquire) == 0 {
                    if drained {
                        shared.counter_send.fetch_sub(1, Ordering::AcqRel);
                        self.phase = Phase::B;
                    } else {
                        // Channels are drained once more before checking in.
                        self.phase = Phase::Send { drained: true };
                    }
                }
            }
            Phase::B => {
                if shared.counter_send.load(Ordering::Acquire) == 0 {
                    let min = local_min().min(self.red_min);
                    self.tracking = false;
                    shared.minima[self.id].store(min.to_bits(), Ordering::Release);
                    shared.counter_b.fetch_sub(1, Ordering::AcqRel);
                    self.phase = Phase::Aware;
                }
            }
            Phase::Aware => {
                if shared.counter_b.load(Ordering::Acquire) == 0 {
                    let gvt = shared
                        .minima
                        .iter()
                        .map(|m| SimTime::from_bits(m.load(Ordering::Acquire)))
                        .min()
                        .unwrap_or(SimTime::INFINITY);
                    let gvt = if gvt < self.last_gvt {
                        tracing::warn!(
                            new = %gvt,
                            last = %self.last_gvt,
                            "GVT went backwards, keeping the last value"
                        );
                        self.last_gvt
                    } else {
                        gvt
                    };
                    self.last_gvt = gvt;
                    self.rounds += 1;

                    return Some(gvt);
                }
            }
            Phase::End => {
                if !shared.in_progress.load(Ordering::Acquire) {
                    shared.minima[self.id].store(SimTime::INFINITY.to_bits(), Ordering::Release);
                    shared.counter_end.fetch_sub(1, Ordering::AcqRel);
                    self.phase = Phase::Idle;
                }
            }
        }

        None
    }

    /// Checks out of the aware phase once the GVT was consumed.
    ///
    /// `vote` is the outcome of the termination predicate for the LPs of this
    /// worker, if it was evaluated. The last worker to check out decides
    /// whether the simulation ends and closes the round.
    pub(crate) fn complete_aware(
        &mut self,
        shared: &GvtShared,
        vote: Option<bool>,
        transport: &dyn Transport,
    ) {
        debug_assert_eq!(self.phase, Phase::Aware);

        if vote == Some(false) {
            shared.ccgs_veto.store(true, Ordering::Release);
        }
        if shared.counter_aware.fetch_sub(1, Ordering::AcqRel) == 1 {
            let gvt = self.last_gvt;
            shared.gvt.store(gvt.to_bits(), Ordering::Release);
            shared.completed_rounds.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(gvt = %gvt, "GVT round completed");

            let mut end = false;
            if vote.is_some() && !shared.ccgs_veto.load(Ordering::Acquire) {
                transport.broadcast_termination();
                if transport.all_kernels_terminated() {
                    tracing::info!(gvt = %gvt, "all LPs agree to terminate");
                    end = true;
                }
            }
            if gvt.is_infinite() {
                tracing::info!("no pending event left");
                end = true;
            }
            if shared.time_bound.is_some_and(|bound| gvt >= bound) {
                tracing::info!(gvt = %gvt, "simulation time bound reached");
                end = true;
            }
            if end {
                shared.end.store(true, Ordering::Release);
            }

            shared
                .last_round_end
                .store(shared.elapsed_nanos(), Ordering::Relaxed);
            shared.in_progress.store(false, Ordering::Release);
        }
        self.phase = Phase::End;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, MsgChannel};

    fn t(x: f64) -> SimTime {
        SimTime::new(x).unwrap()
    }

    /// Polls the workers in turn until each of them adopted a GVT, then
    /// completes the round.
    fn round(
        shared: &GvtShared,
        workers: &mut [GvtWorker],
        minima: &[f64],
        votes: &[Option<bool>],
    ) -> Vec<SimTime> {
        let channels: Vec<MsgChannel> = Vec::new();
        let transport = ChannelTransport::new(&channels);
        let mut adopted = vec![None; workers.len()];

        for _ in 0..100 {
            for (i, worker) in workers.iter_mut().enumerate() {
                if adopted[i].is_some() && worker.phase == Phase::Idle {
                    continue;
                }
                if let Some(gvt) = worker.poll(shared, || t(minima[i])) {
                    adopted[i] = Some(gvt);
                    worker.complete_aware(shared, votes[i], &transport);
                }
            }
            if adopted.iter().all(Option::is_some)
                && workers.iter().all(|w| w.phase == Phase::Idle)
            {
                break;
            }
        }

        adopted.into_iter().map(|gvt| gvt.unwrap()).collect()
    }

    #[test]
    fn gvt_is_the_minimum_of_local_minima() {
        let shared = GvtShared::new(3, Duration::ZERO, None);
        let mut workers: Vec<_> = (0..3).map(|id| GvtWorker::new(id, 1)).collect();

        let adopted = round(&shared, &mut workers, &[4.0, 2.5, 7.0], &[Some(false); 3]);
        assert_eq!(adopted, vec![t(2.5); 3]);
        assert_eq!(shared.gvt(), t(2.5));
        assert_eq!(shared.completed_rounds(), 1);
        assert!(!shared.should_end());
    }

    #[test]
    fn sent_messages_are_accounted_for() {
        let shared = GvtShared::new(2, Duration::ZERO, None);
        let mut workers: Vec<_> = (0..2).map(|id| GvtWorker::new(id, 1)).collect();

        // Worker 0 joins the round, then sends a message before phase B.
        workers[0].poll(&shared, || t(10.0));
        workers[0].on_send(t(1.5));

        let adopted = round(&shared, &mut workers, &[10.0, 10.0], &[Some(false); 2]);
        assert_eq!(adopted, vec![t(1.5); 2]);
    }

    #[test]
    fn gvt_is_monotonic() {
        let shared = GvtShared::new(2, Duration::ZERO, None);
        let mut workers: Vec<_> = (0..2).map(|id| GvtWorker::new(id, 1)).collect();

        round(&shared, &mut workers, &[5.0, 6.0], &[Some(false); 2]);
        let adopted = round(&shared, &mut workers, &[3.0, 6.0], &[Some(false); 2]);
        assert_eq!(adopted, vec![t(5.0); 2]);
        assert_eq!(shared.completed_rounds(), 2);
    }

    #[test]
    fn round_ends_simulation() {
        let shared = GvtShared::new(2, Duration::ZERO, Some(t(100.0)));
        let mut workers: Vec<_> = (0..2).map(|id| GvtWorker::new(id, 1)).collect();

        // A single veto prevents termination.
        round(&shared, &mut workers, &[5.0, 6.0], &[Some(true), Some(false)]);
        assert!(!shared.should_end());

        round(&shared, &mut workers, &[5.0, 6.0], &[Some(true), Some(true)]);
        assert!(shared.should_end());
    }

    #[test]
    fn time_bound_ends_simulation() {
        let shared = GvtShared::new(2, Duration::ZERO, Some(t(100.0)));
        let mut workers: Vec<_> = (0..2).map(|id| GvtWorker::new(id, 1)).collect();

        round(&shared, &mut workers, &[99.0, 150.0], &[None; 2]);
        assert!(!shared.should_end());
        round(&shared, &mut workers, &[100.0, 150.0], &[None; 2]);
        assert!(shared.should_end());
    }

    #[test]
    fn snapshot_cycles() {
        let mut worker = GvtWorker::new(0, 3);
        let mut ccgs_rounds = Vec::new();
        for round in 1..=6 {
            worker.rounds = round;
            ccgs_rounds.push(worker.is_ccgs_round());
        }
        assert_eq!(ccgs_rounds, vec![false, false, true, false, false, true]);
    }
}
