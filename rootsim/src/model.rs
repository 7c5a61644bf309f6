//! Model interface.
//!
//! # Model trait
//!
//! A simulation consists of a fixed number of *logical processes* (LPs), each
//! identified by an [`LpId`] in `0..lp_count`. All LPs share the behavior
//! described by a single [`Model`] implementation but each owns a private
//! [`Model::State`], which is the only piece of data the kernel checkpoints
//! and restores.
//!
//! The kernel drives each LP through three callbacks:
//!
//! * [`Model::init`] runs once per LP at time zero and returns its initial
//!   state; it may schedule the first events,
//! * [`Model::process_event`] runs for every event delivered to the LP and
//!   mutates its state,
//! * [`Model::on_gvt`] is a termination predicate evaluated on *committed*
//!   states only, i.e. states that can no longer be rolled back.
//!
//! Because execution is optimistic, `process_event` may be called for events
//! that are later cancelled, and may be silently re-executed after a rollback.
//! A model must therefore be a deterministic function of its state, of the
//! event and of the random numbers drawn from the [`Context`]: it must not
//! read any other mutable data, and any side effect outside of the state and
//! of the context is unsafe.
//!
//! # Examples
//!
//! A model in which every LP forwards a token to a random LP after an
//! exponentially distributed delay:
//!
//! ```
//! use rootsim::model::{Context, Event, LpId, Model};
//! use rootsim::time::SimTime;
//!
//! struct Forwarder;
//!
//! #[derive(Clone, Default)]
//! struct Received {
//!     count: u64,
//! }
//!
//! impl Model for Forwarder {
//!     type State = Received;
//!
//!     fn init(&self, lp: LpId, cx: &mut Context<'_>) -> Received {
//!         let delay = cx.expent(1.0);
//!         cx.schedule_new_event(lp, SimTime::ZERO + delay, 0, &[]).unwrap();
//!
//!         Received::default()
//!     }
//!
//!     fn process_event(&self, state: &mut Received, _event: &Event<'_>, cx: &mut Context<'_>) {
//!         state.count += 1;
//!
//!         let receiver = cx.random_range(0, cx.lp_count() as i32 - 1) as usize;
//!         let timestamp = cx.now() + cx.expent(1.0);
//!         cx.schedule_new_event(LpId::new(receiver), timestamp, 0, &[]).unwrap();
//!     }
//!
//!     fn on_gvt(&self, _lp: LpId, state: &Received) -> bool {
//!         state.count >= 1000
//!     }
//! }
//! ```
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::Msg;
use crate::time::SimTime;

mod context;

pub use context::Context;
pub(crate) use context::Effects;

/// Identifier of a logical process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LpId(usize);

impl LpId {
    /// Creates the identifier of the LP with the specified index.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the index of the LP.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for LpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LP {}", self.0)
    }
}

impl From<usize> for LpId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// Behavior shared by all the LPs of a simulation.
pub trait Model: Send + Sync + 'static {
    /// The state of an LP.
    ///
    /// A checkpoint is a clone of the state, so cloning should be reasonably
    /// cheap.
    type State: Clone + Send + 'static;

    /// Initializes an LP.
    ///
    /// This is called once per LP at simulation time zero, before any event is
    /// processed by this LP.
    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> Self::State;

    /// Processes an event delivered to the LP owning `state`.
    fn process_event(&self, state: &mut Self::State, event: &Event<'_>, cx: &mut Context<'_>);

    /// Returns `true` if the LP considers that the simulation may end.
    ///
    /// The state passed is always committed. The simulation ends once all LPs
    /// agree on a consistent global state.
    fn on_gvt(&self, lp: LpId, state: &Self::State) -> bool;
}

/// An event delivered to an LP.
#[derive(Debug)]
pub struct Event<'a> {
    msg: &'a Msg,
    resumed: bool,
}

impl<'a> Event<'a> {
    pub(crate) fn new(msg: &'a Msg, resumed: bool) -> Self {
        Self { msg, resumed }
    }

    /// Returns the delivery time of the event.
    pub fn timestamp(&self) -> SimTime {
        self.msg.timestamp
    }

    /// Returns the type given by the sender.
    pub fn event_type(&self) -> i32 {
        self.msg.event_type
    }

    /// Returns the LP that scheduled the event.
    pub fn sender(&self) -> LpId {
        self.msg.sender
    }

    /// Returns the time at which the event was scheduled.
    pub fn send_time(&self) -> SimTime {
        self.msg.send_time
    }

    /// Returns the payload of the event.
    pub fn payload(&self) -> &'a [u8] {
        &self.msg.payload
    }

    /// Returns `true` if the event is delivered again to resume an LP that
    /// suspended itself while processing it.
    ///
    /// See [`Context::suspend`].
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }
}
