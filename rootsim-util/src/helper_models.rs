//! Helper models.
//!
//! This module contains ready-made models, mostly useful for benchmarking the
//! kernel and for smoke tests.
//!

use rootsim::model::{Context, Event, LpId, Model};
use rootsim::time::SimTime;

/// The PHOLD benchmark.
///
/// Each LP starts with a population of events. Every event causes the
/// emission of exactly one new event, either to the LP itself or to a
/// uniformly chosen LP, after a fixed lookahead plus an exponentially
/// distributed delay. An LP agrees to terminate once it has processed a
/// number of events.
#[derive(Clone, Debug)]
pub struct Phold {
    /// Minimum delay between an event and the event it triggers.
    lookahead: f64,
    /// Mean of the exponential part of the delay.
    mean: f64,
    /// Probability for an event to be sent to a random LP rather than to
    /// the sender itself.
    remote: f64,
    /// Initial number of events per LP.
    population: usize,
    /// Number of events an LP processes before agreeing to terminate.
    target: u64,
}

impl Phold {
    /// Creates a PHOLD model terminating after `target` events per LP.
    pub fn new(target: u64) -> Self {
        Self {
            lookahead: 0.1,
            mean: 1.0,
            remote: 0.5,
            population: 1,
            target,
        }
    }

    /// Sets the minimum delay between an event and the event it triggers.
    pub fn with_lookahead(mut self, lookahead: f64) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Sets the mean of the exponential part of the delay.
    pub fn with_mean(mut self, mean: f64) -> Self {
        self.mean = mean;
        self
    }

    /// Sets the probability for an event to be sent to a random LP.
    pub fn with_remote_probability(mut self, remote: f64) -> Self {
        self.remote = remote;
        self
    }

    /// Sets the initial number of events per LP.
    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population;
        self
    }

    fn delay(&self, cx: &mut Context<'_>) -> f64 {
        self.lookahead + cx.expent(self.mean)
    }
}

/// State of a PHOLD LP.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PholdState {
    /// Events processed.
    pub processed: u64,
    /// Events sent to other LPs.
    pub sent_remote: u64,
    /// Timestamp of the last processed event.
    pub last: SimTime,
}

impl Model for Phold {
    type State = PholdState;

    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> PholdState {
        for _ in 0..self.population {
            let t = cx.now() + self.delay(cx);
            cx.schedule_new_event(lp, t, 0, &[]).unwrap();
        }

        PholdState::default()
    }

    fn process_event(&self, state: &mut PholdState, event: &Event<'_>, cx: &mut Context<'_>) {
        state.processed += 1;
        state.last = event.timestamp();

        let receiver = if cx.random() < self.remote {
            state.sent_remote += 1;
            LpId::new(cx.random_range(0, cx.lp_count() as i32 - 1) as usize)
        } else {
            cx.lp()
        };
        let t = cx.now() + self.delay(cx);
        cx.schedule_new_event(receiver, t, 0, &[]).unwrap();
    }

    fn on_gvt(&self, _lp: LpId, state: &PholdState) -> bool {
        state.processed >= self.target
    }
}

/// A ticker model.
///
/// Each LP self-schedules at the specified period, which can be used to keep
/// a simulation alive until its time bound.
#[derive(Clone, Copy, Debug)]
pub struct Ticker {
    /// Tick period.
    tick: f64,
}

impl Ticker {
    /// Creates a new `Ticker` with the specified self-scheduling period.
    ///
    /// # Panics
    ///
    /// Panics if the period is not strictly positive.
    pub fn new(tick: f64) -> Self {
        assert!(tick > 0.0, "the tick period must be positive");

        Self { tick }
    }
}

impl Model for Ticker {
    /// Number of ticks.
    type State = u64;

    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> u64 {
        let t = cx.now() + self.tick;
        cx.schedule_new_event(lp, t, 0, &[]).unwrap();

        0
    }

    fn process_event(&self, ticks: &mut u64, _event: &Event<'_>, cx: &mut Context<'_>) {
        *ticks += 1;
        let t = cx.now() + self.tick;
        cx.schedule_new_event(cx.lp(), t, 0, &[]).unwrap();
    }

    fn on_gvt(&self, _lp: LpId, _ticks: &u64) -> bool {
        false
    }
}
