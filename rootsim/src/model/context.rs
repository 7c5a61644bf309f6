use std::fmt;
use std::panic::Location;

use crate::message::{generate_mark, MessageKind, Msg, UNBLOCK};
use crate::numerical::Numerical;
use crate::simulation::{SchedulingError, SimulationError};
use crate::time::SimTime;

use super::LpId;

/// The side effects of an event execution, applied by the kernel once the
/// model callback has returned.
#[derive(Debug, Default)]
pub(crate) struct Effects {
    /// Messages generated by the current event, in scheduling order.
    pub(crate) outgoing: Vec<Msg>,
    /// Number of marks generated so far by the LP.
    pub(crate) mark_counter: u64,
    pub(crate) force_checkpoint: bool,
    pub(crate) checkpoint_period: Option<usize>,
    pub(crate) suspend: bool,
    /// First fatal error raised by the model through the context.
    pub(crate) error: Option<SimulationError>,
}

impl Effects {
    /// Records a fatal error. It is logged once it reaches the engine.
    fn raise(&mut self, error: SimulationError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// A handle to the kernel, given to the model callbacks.
///
/// The context identifies the LP being executed and the current simulation
/// time, lets the model schedule new events and provides the rollbackable
/// random number library.
///
/// # Random numbers
///
/// All random numbers must be drawn from the context: the generator state is
/// saved in each checkpoint and restored on rollback, which makes re-execution
/// of events deterministic.
///
/// # Silent execution
///
/// When events are re-executed to rebuild the state of an LP after a
/// rollback, scheduling requests and checkpoint or suspension requests are
/// ignored since their effects already took place during the original
/// execution.
pub struct Context<'a> {
    lp: LpId,
    lp_count: usize,
    now: SimTime,
    numerical: &'a mut Numerical,
    effects: &'a mut Effects,
    silent: bool,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        lp: LpId,
        lp_count: usize,
        now: SimTime,
        numerical: &'a mut Numerical,
        effects: &'a mut Effects,
        silent: bool,
    ) -> Self {
        Self {
            lp,
            lp_count,
            now,
            numerical,
            effects,
            silent,
        }
    }

    /// Returns the current simulation time of the LP.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Returns the identifier of the LP being executed.
    pub fn lp(&self) -> LpId {
        self.lp
    }

    /// Returns the total number of LPs.
    pub fn lp_count(&self) -> usize {
        self.lp_count
    }

    /// Schedules an event for the specified LP.
    ///
    /// The timestamp may not lie in the past of the calling LP and the event
    /// type must be non-negative, negative types being reserved to the
    /// kernel. Both conditions are causality or protocol violations: besides
    /// the returned error, they abort the simulation.
    ///
    /// A receiver outside of the simulated LPs is reported as a warning and
    /// the event is discarded.
    #[track_caller]
    pub fn schedule_new_event(
        &mut self,
        receiver: LpId,
        timestamp: SimTime,
        event_type: i32,
        payload: &[u8],
    ) -> Result<(), SchedulingError> {
        if self.silent {
            return Ok(());
        }
        if event_type < 0 {
            self.effects.raise(SimulationError::ReservedEventType {
                lp: self.lp,
                event_type,
                location: Location::caller(),
            });
            return Err(SchedulingError::ReservedEventType);
        }

        self.send(
            receiver,
            timestamp,
            event_type,
            MessageKind::Positive,
            payload,
            Location::caller(),
        )
    }

    fn send(
        &mut self,
        receiver: LpId,
        timestamp: SimTime,
        event_type: i32,
        kind: MessageKind,
        payload: &[u8],
        location: &'static Location<'static>,
    ) -> Result<(), SchedulingError> {
        if timestamp < self.now {
            self.effects.raise(SimulationError::CausalityViolation {
                lp: self.lp,
                now: self.now,
                timestamp,
                location,
            });
            return Err(SchedulingError::PastTimestamp);
        }
        if receiver.index() >= self.lp_count {
            tracing::warn!(
                lp = self.lp.index(),
                receiver = receiver.index(),
                "event scheduled for a non-existent LP was discarded"
            );
            return Err(SchedulingError::InvalidReceiver);
        }

        let mark = generate_mark(self.lp, self.effects.mark_counter);
        self.effects.mark_counter += 1;
        self.effects.outgoing.push(Msg {
            sender: self.lp,
            receiver,
            event_type,
            kind,
            timestamp,
            send_time: self.now,
            mark,
            rendezvous_mark: if kind == MessageKind::Control { mark } else { 0 },
            payload: payload.into(),
            exec_seq: 0,
        });

        Ok(())
    }

    /// Returns a uniformly distributed number in the open interval (0, 1).
    pub fn random(&mut self) -> f64 {
        self.numerical.random()
    }

    /// Returns a uniformly distributed integer in `[min, max]`.
    pub fn random_range(&mut self, min: i32, max: i32) -> i32 {
        self.numerical.random_range(min, max)
    }

    /// Returns an integer in `[min, max]` with a non-uniform distribution
    /// biased by `x`.
    pub fn random_range_non_uniform(&mut self, x: i32, min: i32, max: i32) -> i32 {
        self.numerical.random_range_non_uniform(x, min, max)
    }

    /// Returns an exponentially distributed number with the specified mean.
    ///
    /// A negative mean aborts the simulation and yields 0.
    #[track_caller]
    pub fn expent(&mut self, mean: f64) -> f64 {
        if mean < 0.0 {
            self.effects.raise(SimulationError::InvalidArgument {
                lp: self.lp,
                description: "negative mean passed to `expent`",
                location: Location::caller(),
            });
            return 0.0;
        }

        self.numerical.expent(mean)
    }

    /// Returns a normally distributed number with zero mean and unit variance.
    pub fn normal(&mut self) -> f64 {
        self.numerical.normal()
    }

    /// Returns a gamma-distributed number of integer order `ia`.
    ///
    /// An order of 0 is replaced by 1 with a warning.
    pub fn gamma(&mut self, ia: u32) -> f64 {
        let ia = if ia == 0 {
            tracing::warn!(lp = self.lp.index(), "gamma distribution order must be >= 1, using 1");
            1
        } else {
            ia
        };

        self.numerical.gamma(ia)
    }

    /// Returns the waiting time of a Poisson process with unit rate.
    pub fn poisson(&mut self) -> f64 {
        self.numerical.poisson()
    }

    /// Returns a Zipf-distributed integer in `[1, limit]`.
    pub fn zipf(&mut self, skew: f64, limit: u32) -> u32 {
        self.numerical.zipf(skew, limit)
    }

    /// Requests a checkpoint of the LP state after the current event,
    /// regardless of the checkpointing period.
    pub fn force_checkpoint(&mut self) {
        if !self.silent {
            self.effects.force_checkpoint = true;
        }
    }

    /// Sets the number of events between two checkpoints of this LP in
    /// periodic checkpointing mode.
    ///
    /// A period of 0 is ignored.
    pub fn set_checkpoint_period(&mut self, period: usize) {
        if !self.silent && period > 0 {
            self.effects.checkpoint_period = Some(period);
        }
    }

    /// Suspends the LP once the current event has been processed.
    ///
    /// A suspended LP is not scheduled until another LP unblocks it with
    /// [`Context::send_unblock`]. The event during which `suspend` was called
    /// is then delivered again, with [`Event::is_resumed`](super::Event::is_resumed)
    /// returning `true`.
    ///
    /// Suspension is only available in parallel execution mode.
    pub fn suspend(&mut self) {
        if !self.silent {
            self.effects.suspend = true;
        }
    }

    /// Resumes a suspended LP.
    ///
    /// If the target is not suspended, the unblock request is kept until it
    /// suspends.
    #[track_caller]
    pub fn send_unblock(&mut self, lp: LpId) -> Result<(), SchedulingError> {
        if self.silent {
            return Ok(());
        }

        self.send(
            lp,
            self.now,
            UNBLOCK,
            MessageKind::Control,
            &[],
            Location::caller(),
        )
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("lp", &self.lp)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}
