//! An optimistic kernel for parallel discrete-event simulation.
//!
//! ROOT-Sim runs a simulation made of a fixed set of *logical processes*
//! (LPs) exchanging timestamped events, on several worker threads and
//! without any lookahead requirement on the model. It relies on the Time
//! Warp synchronization protocol:
//!
//! * each worker executes the events of its LPs speculatively, in timestamp
//!   order, without waiting for other workers,
//! * when an LP receives an event in its past (a *straggler*), it rolls back:
//!   its state is restored from a snapshot, the events it sent in the undone
//!   part of its execution are cancelled with *antimessages*, and the events
//!   since the snapshot are silently re-executed,
//! * the *global virtual time* (GVT), a lower bound on the timestamp of any
//!   event that may still be executed, is periodically computed without
//!   stopping the workers; the memory held for the part of the execution
//!   older than the GVT is then released, and the termination predicate of
//!   the model is evaluated on the *committed* state of each LP.
//!
//! # A practical overview
//!
//! A simulation is described by a single [`Model`](model::Model)
//! implementation shared by all LPs, and by the private
//! [`State`](model::Model::State) of each LP, which is the only data saved
//! and restored by the kernel. The model has three callbacks:
//!
//! * [`init`](model::Model::init) creates the initial state of an LP and may
//!   schedule its first events,
//! * [`process_event`](model::Model::process_event) executes one event on the
//!   state of its receiver and may schedule new events through the
//!   [`Context`](model::Context),
//! * [`on_gvt`](model::Model::on_gvt) tells whether an LP, given a committed
//!   state, agrees to end the simulation.
//!
//! The simulation is then configured and run with the
//! [`SimInit`](simulation::SimInit) builder:
//!
//! ```
//! use rootsim::model::{Context, Event, LpId, Model};
//! use rootsim::simulation::{Checkpointing, SimInit};
//! use rootsim::time::SimTime;
//!
//! /// Every LP pings a random LP after an exponentially distributed delay.
//! struct Ping;
//!
//! impl Model for Ping {
//!     type State = u64;
//!
//!     fn init(&self, lp: LpId, cx: &mut Context<'_>) -> u64 {
//!         let t = SimTime::ZERO + cx.expent(1.0);
//!         cx.schedule_new_event(lp, t, 0, &[]).unwrap();
//!         0
//!     }
//!
//!     fn process_event(&self, pings: &mut u64, _event: &Event<'_>, cx: &mut Context<'_>) {
//!         *pings += 1;
//!         let receiver = cx.random_range(0, cx.lp_count() as i32 - 1) as usize;
//!         let t = cx.now() + cx.expent(1.0);
//!         cx.schedule_new_event(LpId::new(receiver), t, 0, &[]).unwrap();
//!     }
//!
//!     fn on_gvt(&self, _lp: LpId, pings: &u64) -> bool {
//!         *pings >= 100
//!     }
//! }
//!
//! let report = SimInit::new(Ping, 16)
//!     .set_workers(2)
//!     .set_checkpointing(Checkpointing::Periodic(5))
//!     .init()?
//!     .run()?;
//!
//! let totals = report.total_stats();
//! assert!(totals.committed >= 16 * 100);
//! println!("efficiency: {:.1}%", totals.efficiency() * 100.0);
//! # Ok::<(), rootsim::simulation::SimulationError>(())
//! ```
//!
//! # Determinism
//!
//! Each LP owns a random number generator seeded from the master seed and the
//! LP index, which is checkpointed with the state. Provided the model only
//! draws random numbers from its [`Context`](model::Context) and never
//! schedules two events for the same LP at the same timestamp, the committed
//! history of each LP is identical to that of a sequential run with
//! [`ExecutionMode::Serial`](simulation::ExecutionMode::Serial), whatever the
//! number of workers.
//!
//! # Logging
//!
//! See the [`tracing`] module.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]

pub(crate) mod channel;
pub(crate) mod gvt;
mod loom_exports;
pub(crate) mod message;
pub mod model;
pub(crate) mod numerical;
pub(crate) mod process;
pub(crate) mod scheduler;
pub mod simulation;
pub mod stats;
pub mod time;
pub mod tracing;
pub(crate) mod transport;
pub(crate) mod util;
