//! Worker threads of a parallel simulation.
//!
//! Each worker exclusively owns the LPs bound to it. The main loop of a worker
//! repeatedly drains the bottom-half channels of its LPs, schedules one unit
//! of work, flushes the resulting messages and advances the GVT reduction.
//!
//! With load-based binding, LPs change owner at the end of a GVT round: all
//! workers hand their LPs over to a shared pool, meet, and then take back the
//! LPs newly assigned to them.
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crossbeam_utils::Backoff;

use crate::gvt::{ccgs, GvtShared, GvtWorker};
use crate::message::Msg;
use crate::model::{LpId, Model};
use crate::process::Lp;
use crate::scheduler::{self, binding};
use crate::time::SimTime;
use crate::transport::{CborLoopback, ChannelTransport, MsgChannel, Transport};

use super::{
    Config, Delivery, LpBinding, Shared, SimulationError, SimulationReport, TerminationMode,
};

/// Resources shared by all workers.
struct Setup<'a, M: Model> {
    model: &'a M,
    lp_count: usize,
    config: &'a Config,
    master_seed: u64,
    channels: &'a [MsgChannel],
    transport: &'a dyn Transport,
    shared: &'a Shared,
    rebinding: Option<&'a Rebinding<M::State>>,
}

/// A worker and the LPs bound to it.
pub(crate) struct Worker<'a, M: Model> {
    id: usize,
    model: &'a M,
    lp_count: usize,
    termination_mode: TerminationMode,
    lps: Vec<Lp<M::State>>,
    channels: &'a [MsgChannel],
    transport: &'a dyn Transport,
    shared: &'a Shared,
    rebinding: Option<&'a Rebinding<M::State>>,
    gvt: GvtWorker,
    inbox: Vec<Msg>,
    outbox: Vec<Msg>,
}

impl<'a, M: Model> Worker<'a, M> {
    /// Creates the LPs bound to the worker and sends the messages scheduled
    /// during their initialization.
    fn new(id: usize, gids: &[LpId], setup: &Setup<'a, M>) -> Result<Self, SimulationError> {
        let mut worker = Self {
            id,
            model: setup.model,
            lp_count: setup.lp_count,
            termination_mode: setup.config.termination_mode,
            lps: Vec::with_capacity(gids.len()),
            channels: setup.channels,
            transport: setup.transport,
            shared: setup.shared,
            rebinding: setup.rebinding,
            gvt: GvtWorker::new(id, setup.config.gvt_snapshot_cycles),
            inbox: Vec::new(),
            outbox: Vec::new(),
        };
        for &gid in gids {
            let mut lp = Lp::new(
                setup.model,
                gid,
                setup.lp_count,
                setup.master_seed,
                setup.config.checkpointing,
            )?;
            lp.send_outgoing(&mut worker.outbox);
            worker.lps.push(lp);
        }
        worker.flush()?;

        Ok(worker)
    }

    /// Runs the main loop until the simulation ends or fails.
    fn run(&mut self) -> Result<(), SimulationError> {
        tracing::debug!(worker = self.id, lps = self.lps.len(), "worker started");

        let backoff = Backoff::new();
        while !self.shared.should_stop() {
            if self.step()? {
                backoff.reset();
            } else {
                backoff.snooze();
            }
        }

        Ok(())
    }

    /// Performs one iteration of the main loop and returns `true` if some LP
    /// made progress.
    fn step(&mut self) -> Result<bool, SimulationError> {
        self.process_bottom_halves()?;
        let progress =
            scheduler::schedule(self.model, &mut self.lps, self.lp_count, &mut self.outbox)?;
        self.flush()?;
        self.gvt_operations()?;

        Ok(progress)
    }

    /// Moves the messages received by the LPs into their input queues.
    fn process_bottom_halves(&mut self) -> Result<(), SimulationError> {
        for lp in &mut self.lps {
            self.channels[lp.gid.index()].swap(&mut self.inbox);
            for msg in self.inbox.drain(..) {
                lp.receive(msg)?;
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), SimulationError> {
        for msg in self.outbox.drain(..) {
            self.gvt.on_send(msg.timestamp);
            self.transport.deliver(msg)?;
        }

        Ok(())
    }

    fn gvt_operations(&mut self) -> Result<(), SimulationError> {
        let lps = &self.lps;
        let local_min = || {
            lps.iter()
                .map(|lp| lp.gvt_timestamp())
                .min()
                .unwrap_or(SimTime::INFINITY)
        };
        let Some(gvt) = self.gvt.poll(&self.shared.gvt, local_min) else {
            return Ok(());
        };

        for lp in &mut self.lps {
            lp.fossil_collect(gvt);
        }
        let vote = self.gvt.is_ccgs_round().then(|| {
            ccgs::evaluate(
                self.model,
                &mut self.lps,
                gvt,
                self.termination_mode,
                self.lp_count,
            )
        });
        self.gvt.complete_aware(&self.shared.gvt, vote, self.transport);

        // All workers reach this point for the same round, whether the
        // simulation ends or not.
        if let Some(rebinding) = self.rebinding {
            if self.gvt.rounds() % rebinding.period == 0 {
                rebinding.rebind(self.id, &mut self.lps, self.shared)?;
            }
        }

        Ok(())
    }

    fn into_lps(self) -> Vec<Lp<M::State>> {
        self.lps
    }
}

/// A reusable spinning barrier that gives up once an error was reported.
struct SyncPoint {
    arrived: AtomicUsize,
    expected: usize,
}

impl SyncPoint {
    fn new(expected: usize) -> Self {
        Self {
            arrived: AtomicUsize::new(0),
            expected,
        }
    }

    /// Waits for all workers and returns `false` if an error was reported in
    /// the meantime.
    fn wait(&self, shared: &Shared) -> bool {
        let ticket = self.arrived.fetch_add(1, Ordering::AcqRel);
        let target = (ticket / self.expected + 1) * self.expected;
        let backoff = Backoff::new();
        while self.arrived.load(Ordering::Acquire) < target {
            if shared.has_error() {
                return false;
            }
            backoff.snooze();
        }

        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exchange area for the load-based rebinding of LPs.
struct Rebinding<S> {
    workers: usize,
    /// Number of GVT rounds between two rebindings.
    period: u64,
    /// LPs handed over by their previous owner, indexed by LP.
    pool: Mutex<Vec<Option<Lp<S>>>>,
    workloads: Mutex<Vec<f64>>,
    owners: Mutex<Vec<usize>>,
    sync: SyncPoint,
}

impl<S: Clone> Rebinding<S> {
    fn new(lp_count: usize, workers: usize, period: u32) -> Self {
        Self {
            workers,
            period: u64::from(period.max(1)),
            pool: Mutex::new((0..lp_count).map(|_| None).collect()),
            workloads: Mutex::new(vec![0.0; lp_count]),
            owners: Mutex::new(Vec::new()),
            sync: SyncPoint::new(workers),
        }
    }

    /// Hands over the LPs of worker `id` and takes back its new LPs.
    ///
    /// Must be called by all workers. No LP is taken before all LPs were
    /// handed over, so an LP is never held by two workers.
    fn rebind(
        &self,
        id: usize,
        lps: &mut Vec<Lp<S>>,
        shared: &Shared,
    ) -> Result<(), SimulationError> {
        {
            let mut pool = lock(&self.pool);
            let mut workloads = lock(&self.workloads);
            for lp in lps.drain(..) {
                let index = lp.gid.index();
                workloads[index] = lp.workload_factor();
                pool[index] = Some(lp);
            }
        }
        if !self.sync.wait(shared) {
            return Ok(());
        }

        if id == 0 {
            let owners = binding::knapsack(&lock(&self.workloads), self.workers);
            *lock(&self.owners) = owners;
        }
        if !self.sync.wait(shared) {
            return Ok(());
        }

        {
            let owners = lock(&self.owners);
            let mut pool = lock(&self.pool);
            for index in (0..owners.len()).filter(|&index| owners[index] == id) {
                let Some(lp) = pool[index].take() else {
                    return Err(SimulationError::InvalidState {
                        lp: LpId::new(index),
                        description: "LP missing from the rebinding pool",
                        location: Location::caller(),
                    });
                };
                lps.push(lp);
            }
        }
        if id == 0 {
            tracing::debug!("LPs rebound to workers");
        }
        // The exchange area may only be reused once every worker is done.
        self.sync.wait(shared);

        Ok(())
    }
}

/// Runs `f`, reporting its error or panic to the other workers.
fn guarded<T, F>(worker: usize, shared: &Shared, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T, SimulationError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            shared.report_error(error);
            None
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            shared.report_error(SimulationError::WorkerPanic { worker, message });
            None
        }
    }
}

fn worker_main<'a, M: Model>(
    id: usize,
    gids: &[LpId],
    setup: &Setup<'a, M>,
    startup: &SyncPoint,
    shutdown: &SyncPoint,
) -> Option<Vec<Lp<M::State>>> {
    let mut worker = guarded(id, setup.shared, || Worker::new(id, gids, setup));

    // No event is executed before all INIT messages are sent.
    if !startup.wait(setup.shared) {
        worker = None;
    }
    if let Some(worker) = worker.as_mut() {
        guarded(id, setup.shared, || worker.run());
    }
    shutdown.wait(setup.shared);

    worker.map(Worker::into_lps)
}

/// Runs a simulation on `config.workers` worker threads.
pub(crate) fn run_parallel<M: Model>(
    model: &M,
    lp_count: usize,
    config: &Config,
    master_seed: u64,
) -> Result<SimulationReport<M::State>, SimulationError> {
    let channels: Vec<MsgChannel> = (0..lp_count).map(|_| MsgChannel::new()).collect();
    let transport: Box<dyn Transport + '_> = match config.delivery {
        Delivery::Direct => Box::new(ChannelTransport::new(&channels)),
        Delivery::Serialized => Box::new(CborLoopback::new(&channels)),
    };
    let bindings = binding::bind(config.lp_binding, lp_count, config.workers);
    let workers = bindings.len();
    let shared = Shared::new(GvtShared::new(workers, config.gvt_period, config.time_bound));
    let rebinding = (config.lp_binding == LpBinding::Knapsack && workers > 1)
        .then(|| Rebinding::new(lp_count, workers, config.rebind_period));
    let setup = Setup {
        model,
        lp_count,
        config,
        master_seed,
        channels: &channels,
        transport: &*transport,
        shared: &shared,
        rebinding: rebinding.as_ref(),
    };
    let startup = SyncPoint::new(workers);
    let shutdown = SyncPoint::new(workers);

    let lps: Vec<Lp<M::State>> = thread::scope(|s| {
        let mut handles = Vec::with_capacity(workers);
        for (id, gids) in bindings.iter().enumerate() {
            let (setup, startup, shutdown) = (&setup, &startup, &shutdown);
            let spawned = thread::Builder::new()
                .name(format!("rootsim-worker-{id}"))
                .spawn_scoped(s, move || worker_main(id, gids, setup, startup, shutdown));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => shared.report_error(SimulationError::WorkerPanic {
                    worker: id,
                    message: format!("the worker thread could not be spawned: {e}"),
                }),
            }
        }

        handles
            .into_iter()
            .filter_map(|handle| handle.join().ok().flatten())
            .flatten()
            .collect()
    });

    if let Some(error) = shared.take_error() {
        return Err(error);
    }

    let gvt = shared.gvt.gvt();
    let mut slots: Vec<Option<Lp<M::State>>> = (0..lp_count).map(|_| None).collect();
    for lp in lps {
        let index = lp.gid.index();
        if slots[index].replace(lp).is_some() {
            return Err(SimulationError::InvalidState {
                lp: LpId::new(index),
                description: "LP owned by two workers at shutdown",
                location: Location::caller(),
            });
        }
    }
    let mut stats = Vec::with_capacity(lp_count);
    let mut states = Vec::with_capacity(lp_count);
    for (index, slot) in slots.into_iter().enumerate() {
        let Some(mut lp) = slot else {
            return Err(SimulationError::InvalidState {
                lp: LpId::new(index),
                description: "LP missing at shutdown",
                location: Location::caller(),
            });
        };
        lp.commit_remaining(gvt);
        stats.push(lp.stats);
        states.push(lp.into_state());
    }

    Ok(SimulationReport {
        gvt,
        gvt_rounds: shared.gvt.completed_rounds(),
        stats,
        states,
    })
}
