//! Support for structured logging.
//!
//! # Overview
//!
//! The kernel reports its own activity with the
//! [`tracing`](https://docs.rs/tracing/latest/tracing/) crate: simulation
//! start and end are logged at the `INFO` level, GVT rounds and rollbacks at
//! the `DEBUG` level and antimessages at the `TRACE` level. Model-level
//! warnings, such as an event scheduled for a non-existent LP, use the `WARN`
//! level, and fatal errors are logged at the `ERROR` level before shutdown.
//!
//! Models are free to emit their own `tracing` events from their callbacks.
//! Note that because of rollbacks, an event logged by a model may later be
//! undone, and events logged during silent re-execution are emitted again.
//!
//! # Time-stamping
//!
//! Wall-clock time is of little use to interpret the log of an optimistic
//! simulation. The [`SimulationTime`] timer can be used with
//! `tracing_subscriber` to stamp each log line with the simulation time of
//! the event being executed by the emitting worker thread, or with `-` when
//! the thread is not executing an event:
//!
//! ```
//! use rootsim::tracing::SimulationTime;
//!
//! tracing_subscriber::fmt()
//!     .with_timer(SimulationTime::new())
//!     .with_max_level(tracing::Level::INFO)
//!     .try_init()
//!     .ok();
//! ```
//!
//! # Filtering
//!
//! Kernel events are emitted with the `rootsim` target. The noisier levels can
//! be selected per module with an `EnvFilter` directive such as
//! `RUST_LOG=rootsim=debug`.
use std::cell::Cell;
use std::fmt;

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;

use crate::time::SimTime;

thread_local! {
    static CURRENT_TIME: Cell<Option<SimTime>> = const { Cell::new(None) };
}

/// A timer for `tracing_subscriber` reporting the simulation time of the event
/// being executed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimulationTime {
    precision: Option<usize>,
}

impl SimulationTime {
    /// Creates a timer printing time with the default `f64` formatting.
    pub fn new() -> Self {
        Self { precision: None }
    }

    /// Creates a timer printing time with a fixed number of decimals.
    pub fn with_precision(precision: usize) -> Self {
        Self {
            precision: Some(precision),
        }
    }
}

impl FormatTime for SimulationTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match (CURRENT_TIME.with(|t| t.get()), self.precision) {
            (Some(t), Some(precision)) => write!(w, "{:.*}", precision, t.as_f64()),
            (Some(t), None) => write!(w, "{}", t),
            (None, _) => write!(w, "-"),
        }
    }
}

/// Restores the previous simulation time of the thread when dropped.
pub(crate) struct TimeGuard {
    previous: Option<SimTime>,
}

impl Drop for TimeGuard {
    fn drop(&mut self) {
        CURRENT_TIME.with(|t| t.set(self.previous));
    }
}

/// Sets the simulation time reported by [`SimulationTime`] on this thread.
pub(crate) fn enter_time(time: SimTime) -> TimeGuard {
    TimeGuard {
        previous: CURRENT_TIME.with(|t| t.replace(Some(time))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_guard_restores_previous_time() {
        let t1 = SimTime::new(1.0).unwrap();
        let t2 = SimTime::new(2.0).unwrap();
        {
            let _outer = enter_time(t1);
            {
                let _inner = enter_time(t2);
                assert_eq!(CURRENT_TIME.with(|t| t.get()), Some(t2));
            }
            assert_eq!(CURRENT_TIME.with(|t| t.get()), Some(t1));
        }
        assert_eq!(CURRENT_TIME.with(|t| t.get()), None);
    }
}
