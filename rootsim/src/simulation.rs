//! Simulation management.
//!
//! This module contains the entry points for running a simulation:
//!
//! * the [`SimInit`] builder, which gathers the model, the number of LPs and
//!   the [`Config`],
//! * the [`Simulation`] instance it produces, which runs to completion with
//!   [`Simulation::run`],
//! * the [`SimulationReport`] returned on completion, holding the committed
//!   statistics and the final state of every LP.
//!
//! # Termination
//!
//! A parallel simulation ends at the first GVT round where either:
//!
//! * the [`Model::on_gvt`](crate::model::Model::on_gvt) predicate holds for
//!   all LPs (it is evaluated every
//!   [`Config::gvt_snapshot_cycles`] rounds, in the [`TerminationMode`] of the
//!   configuration),
//! * the GVT reaches [`Config::time_bound`],
//! * no event remains anywhere, which shows as an infinite GVT.
//!
//! # Errors
//!
//! A fatal error in any worker, such as a causality violation or an
//! unmatched antimessage, stops all workers and is returned by
//! [`Simulation::run`]. Only the first error is reported.
//!
//! # Example
//!
//! ```
//! use rootsim::model::{Context, Event, LpId, Model};
//! use rootsim::simulation::{Config, SimInit, TerminationMode};
//!
//! /// Each LP bounces events to its neighbour until it has seen ten of them.
//! struct Ring;
//!
//! impl Model for Ring {
//!     type State = u32;
//!
//!     fn init(&self, lp: LpId, cx: &mut Context<'_>) -> u32 {
//!         let next = LpId::new((lp.index() + 1) % cx.lp_count());
//!         let t = cx.now() + 1.0;
//!         cx.schedule_new_event(next, t, 0, &[]).unwrap();
//!         0
//!     }
//!
//!     fn process_event(&self, count: &mut u32, _event: &Event<'_>, cx: &mut Context<'_>) {
//!         *count += 1;
//!         let next = LpId::new((cx.lp().index() + 1) % cx.lp_count());
//!         let t = cx.now() + 1.0;
//!         cx.schedule_new_event(next, t, 0, &[]).unwrap();
//!     }
//!
//!     fn on_gvt(&self, _lp: LpId, count: &u32) -> bool {
//!         *count >= 10
//!     }
//! }
//!
//! let config = Config {
//!     workers: 2,
//!     termination_mode: TerminationMode::Accurate,
//!     ..Config::default()
//! };
//! let report = SimInit::with_config(Ring, 4, config).init()?.run()?;
//!
//! assert!(report.states().iter().all(|&count| count >= 10));
//! # Ok::<(), rootsim::simulation::SimulationError>(())
//! ```
mod config;
mod serial;
mod sim_init;
mod worker;

pub use config::{
    Checkpointing, Config, Delivery, ExecutionMode, LpBinding, Seed, TerminationMode, DEFAULT_SEED,
};
pub use sim_init::SimInit;
pub use crate::transport::TransportError;

use std::error::Error;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::gvt::GvtShared;
use crate::model::{LpId, Model};
use crate::stats::LpStats;
use crate::time::SimTime;

/// A fatal simulation error.
#[derive(Debug)]
#[non_exhaustive]
pub enum SimulationError {
    /// An event was scheduled in the past of its sender.
    CausalityViolation {
        /// The sender.
        lp: LpId,
        /// The simulation time of the sender.
        now: SimTime,
        /// The requested timestamp.
        timestamp: SimTime,
        /// The call site of the scheduling request.
        location: &'static Location<'static>,
    },
    /// An antimessage did not match any message of the input queue.
    UnmatchedAntimessage {
        /// The receiver of the antimessage.
        lp: LpId,
        /// The mark of the antimessage.
        mark: u64,
        /// Where the mismatch was detected.
        location: &'static Location<'static>,
    },
    /// A model used an event type reserved by the kernel, or the kernel
    /// received a control message of unknown type.
    ReservedEventType {
        /// The offending LP.
        lp: LpId,
        /// The event type.
        event_type: i32,
        /// Where the event type was rejected.
        location: &'static Location<'static>,
    },
    /// An LP reached an inconsistent state.
    InvalidState {
        /// The offending LP.
        lp: LpId,
        /// The nature of the inconsistency.
        description: &'static str,
        /// Where the inconsistency was detected.
        location: &'static Location<'static>,
    },
    /// A model passed an invalid argument to a kernel service.
    InvalidArgument {
        /// The offending LP.
        lp: LpId,
        /// The nature of the invalid argument.
        description: &'static str,
        /// The call site of the service.
        location: &'static Location<'static>,
    },
    /// The configuration is not usable.
    InvalidConfig(String),
    /// A message could not be delivered.
    Transport(TransportError),
    /// A worker thread panicked.
    WorkerPanic {
        /// The index of the worker.
        worker: usize,
        /// The panic message, if it was a string.
        message: String,
    },
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CausalityViolation {
                lp,
                now,
                timestamp,
                location,
            } => write!(
                f,
                "{lp} scheduled an event at {timestamp} while at time {now} ({location})"
            ),
            Self::UnmatchedAntimessage { lp, mark, location } => write!(
                f,
                "{lp} received an antimessage with mark {mark:#x} matching no message ({location})"
            ),
            Self::ReservedEventType {
                lp,
                event_type,
                location,
            } => write!(
                f,
                "{lp} used the reserved event type {event_type} ({location})"
            ),
            Self::InvalidState {
                lp,
                description,
                location,
            } => write!(f, "{lp} is in an invalid state: {description} ({location})"),
            Self::InvalidArgument {
                lp,
                description,
                location,
            } => write!(f, "{lp} passed an invalid argument: {description} ({location})"),
            Self::InvalidConfig(description) => {
                write!(f, "invalid configuration: {description}")
            }
            Self::Transport(e) => fmt::Display::fmt(e, f),
            Self::WorkerPanic { worker, message } => {
                write!(f, "worker {worker} panicked: {message}")
            }
        }
    }
}

impl Error for SimulationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for SimulationError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// An error returned to a model by a scheduling request.
///
/// All of these errors except [`SchedulingError::InvalidReceiver`] are also
/// fatal: the simulation stops with a [`SimulationError`] once the event
/// returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulingError {
    /// The timestamp is earlier than the current simulation time.
    PastTimestamp,
    /// The event type is reserved by the kernel.
    ReservedEventType,
    /// The receiver does not exist; the event was dropped.
    InvalidReceiver,
}

impl fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PastTimestamp => f.write_str("the scheduled time is in the past"),
            Self::ReservedEventType => f.write_str("the event type is reserved"),
            Self::InvalidReceiver => f.write_str("the receiver does not exist"),
        }
    }
}

impl Error for SchedulingError {}

/// A simulation ready to run.
///
/// A `Simulation` is created with [`SimInit::init`].
pub struct Simulation<M: Model> {
    model: M,
    lp_count: usize,
    config: Config,
    master_seed: u64,
}

impl<M: Model> Simulation<M> {
    pub(crate) fn new(model: M, lp_count: usize, config: Config, master_seed: u64) -> Self {
        Self {
            model,
            lp_count,
            config,
            master_seed,
        }
    }

    /// Returns the configuration of the simulation.
    ///
    /// The number of workers is the one effectively used.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the master seed of the random number generators.
    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Runs the simulation to completion.
    pub fn run(self) -> Result<SimulationReport<M::State>, SimulationError> {
        tracing::info!(
            lps = self.lp_count,
            workers = self.config.workers,
            mode = ?self.config.execution_mode,
            "simulation started"
        );

        let report = match self.config.execution_mode {
            ExecutionMode::Parallel => {
                worker::run_parallel(&self.model, self.lp_count, &self.config, self.master_seed)
            }
            ExecutionMode::Serial => {
                serial::run_serial(&self.model, self.lp_count, &self.config, self.master_seed)
                    .inspect_err(|error| tracing::error!("{}", error))
            }
        }?;

        let totals = report.total_stats();
        tracing::info!(
            gvt = %report.gvt,
            committed = totals.committed,
            rollbacks = totals.rollbacks,
            "simulation completed"
        );

        Ok(report)
    }
}

impl<M: Model> fmt::Debug for Simulation<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("lp_count", &self.lp_count)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The outcome of a completed simulation.
pub struct SimulationReport<S> {
    gvt: SimTime,
    gvt_rounds: u64,
    stats: Vec<LpStats>,
    states: Vec<S>,
}

impl<S> SimulationReport<S> {
    /// Returns the last GVT of the simulation.
    ///
    /// In serial mode, this is the timestamp of the first event left
    /// unprocessed, or infinity if none remains.
    pub fn gvt(&self) -> SimTime {
        self.gvt
    }

    /// Returns the number of completed GVT rounds.
    pub fn gvt_rounds(&self) -> u64 {
        self.gvt_rounds
    }

    /// Returns the statistics of each LP, indexed by LP.
    pub fn stats(&self) -> &[LpStats] {
        &self.stats
    }

    /// Returns the sum of the statistics of all LPs.
    pub fn total_stats(&self) -> LpStats {
        self.stats.iter().fold(LpStats::default(), |mut total, s| {
            total += *s;
            total
        })
    }

    /// Returns the final state of each LP, indexed by LP.
    ///
    /// The states of a parallel simulation include the effects of all the
    /// events executed by the end of the simulation, some of which may be
    /// later than the last GVT.
    pub fn states(&self) -> &[S] {
        &self.states
    }

    /// Returns the final state of an LP.
    pub fn state(&self, lp: LpId) -> Option<&S> {
        self.states.get(lp.index())
    }

    /// Consumes the report and returns the final states.
    pub fn into_states(self) -> Vec<S> {
        self.states
    }
}

impl<S> fmt::Debug for SimulationReport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulationReport")
            .field("gvt", &self.gvt)
            .field("gvt_rounds", &self.gvt_rounds)
            .field("total_stats", &self.total_stats())
            .finish_non_exhaustive()
    }
}

/// State shared by all workers of a parallel simulation.
pub(crate) struct Shared {
    pub(crate) gvt: GvtShared,
    error_flag: AtomicBool,
    first_error: Mutex<Option<SimulationError>>,
}

impl Shared {
    pub(crate) fn new(gvt: GvtShared) -> Self {
        Self {
            gvt,
            error_flag: AtomicBool::new(false),
            first_error: Mutex::new(None),
        }
    }

    /// Returns `true` if the workers must leave their main loop.
    pub(crate) fn should_stop(&self) -> bool {
        self.has_error() || self.gvt.should_end()
    }

    pub(crate) fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::Acquire)
    }

    /// Records an error and requests all workers to stop.
    ///
    /// Only the first reported error is kept.
    pub(crate) fn report_error(&self, error: SimulationError) {
        tracing::error!("{}", error);
        let mut first_error = self
            .first_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if first_error.is_none() {
            *first_error = Some(error);
        }
        self.error_flag.store(true, Ordering::Release);
    }

    pub(crate) fn take_error(&self) -> Option<SimulationError> {
        self.first_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_is_kept() {
        let shared = Shared::new(GvtShared::new(1, std::time::Duration::ZERO, None));
        assert!(!shared.should_stop());

        shared.report_error(SimulationError::InvalidConfig("first".into()));
        shared.report_error(SimulationError::InvalidConfig("second".into()));
        assert!(shared.should_stop());
        assert!(matches!(
            shared.take_error(),
            Some(SimulationError::InvalidConfig(s)) if s == "first"
        ));
    }

    #[test]
    fn error_display() {
        let error = SimulationError::CausalityViolation {
            lp: LpId::new(3),
            now: SimTime::new(2.0).unwrap(),
            timestamp: SimTime::new(1.0).unwrap(),
            location: Location::caller(),
        };
        let text = error.to_string();
        assert!(text.starts_with("LP 3 scheduled an event at 1"));
    }
}
