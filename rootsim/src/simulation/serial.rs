//! Sequential reference engine.
//!
//! All LPs are run on the calling thread from a single calendar queue. Events
//! are executed in timestamp order, so neither checkpoints nor rollbacks are
//! needed.
use crate::message::{MessageKind, Msg};
use crate::model::{Context, Effects, LpId, Model};
use crate::numerical::Numerical;
use crate::process::run_event;
use crate::stats::LpStats;
use crate::time::SimTime;
use crate::util::calendar_queue::CalendarQueue;

use super::{Config, SimulationError, SimulationReport};

struct SerialLp<S> {
    state: S,
    numerical: Numerical,
    effects: Effects,
    done: bool,
    stats: LpStats,
}

impl<S> SerialLp<S> {
    /// Moves the effects of the last callback to the calendar queue.
    fn flush(&mut self, queue: &mut CalendarQueue<Msg>) -> Result<(), SimulationError> {
        if let Some(error) = self.effects.error.take() {
            return Err(error);
        }
        if std::mem::take(&mut self.effects.suspend) {
            tracing::warn!("suspension is not supported in serial mode and was ignored");
        }
        self.effects.force_checkpoint = false;
        self.effects.checkpoint_period = None;

        for msg in self.effects.outgoing.drain(..) {
            if msg.kind == MessageKind::Control {
                tracing::warn!(
                    receiver = %msg.receiver,
                    "unblock messages are ignored in serial mode"
                );
                continue;
            }
            queue.put(msg.timestamp, msg);
        }

        Ok(())
    }
}

/// Runs a simulation sequentially on the calling thread.
pub(crate) fn run_serial<M: Model>(
    model: &M,
    lp_count: usize,
    config: &Config,
    master_seed: u64,
) -> Result<SimulationReport<M::State>, SimulationError> {
    let mut queue = CalendarQueue::new();
    let mut lps = Vec::with_capacity(lp_count);

    for index in 0..lp_count {
        let gid = LpId::new(index);
        let mut numerical = Numerical::new(master_seed, index);
        let mut effects = Effects::default();
        let state = {
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
        let mut lp = SerialLp {
            state,
            numerical,
            effects,
            done: false,
            stats: LpStats::default(),
        };
        lp.flush(&mut queue)?;
        lps.push(lp);
    }

    let mut remaining = lp_count;
    let gvt = loop {
        if remaining == 0 {
            tracing::info!("all LPs agree to terminate");
            break queue.peek_time().unwrap_or(SimTime::INFINITY);
        }
        let Some((timestamp, msg)) = queue.get() else {
            tracing::info!("no pending event left");
            break SimTime::INFINITY;
        };
        if config.time_bound.is_some_and(|bound| timestamp >= bound) {
            tracing::info!(time = %timestamp, "simulation time bound reached");
            break timestamp;
        }

        let gid = msg.receiver;
        let lp = &mut lps[gid.index()];
        run_event(
            model,
            gid,
            lp_count,
            &msg,
            &mut lp.state,
            &mut lp.numerical,
            &mut lp.effects,
            false,
            false,
        );
        lp.stats.events += 1;
        lp.stats.committed += 1;
        lp.flush(&mut queue)?;

        if !lp.done && model.on_gvt(gid, &lp.state) {
            lp.done = true;
            remaining -= 1;
        }
    };

    let (stats, states) = lps.into_iter().map(|lp| (lp.stats, lp.state)).unzip();

    Ok(SimulationReport {
        gvt,
        gvt_rounds: 0,
        stats,
        states,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Event;

    /// Each LP forwards a token to the next one, one time unit later.
    struct Token;

    impl Model for Token {
        type State = Vec<f64>;

        fn init(&self, lp: LpId, cx: &mut Context<'_>) -> Vec<f64> {
            if lp.index() == 0 {
                cx.schedule_new_event(lp, SimTime::new(1.0).unwrap(), 0, &[]).unwrap();
            }
            Vec::new()
        }

        fn process_event(&self, state: &mut Vec<f64>, event: &Event<'_>, cx: &mut Context<'_>) {
            state.push(event.timestamp().as_f64());
            let next = LpId::new((cx.lp().index() + 1) % cx.lp_count());
            let t = cx.now() + 1.0;
            cx.schedule_new_event(next, t, 0, &[]).unwrap();
        }

        fn on_gvt(&self, _lp: LpId, state: &Vec<f64>) -> bool {
            state.len() >= 2
        }
    }

    #[test]
    fn runs_until_all_lps_are_done() {
        let config = Config::default();
        let report = run_serial(&Token, 3, &config, 1).unwrap();

        assert_eq!(
            report.states(),
            &[vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]]
        );
        assert_eq!(report.gvt(), SimTime::new(7.0).unwrap());
        assert_eq!(report.total_stats().committed, 6);
    }

    #[test]
    fn time_bound_stops_execution() {
        let config = Config {
            time_bound: SimTime::new(2.5),
            ..Config::default()
        };
        let report = run_serial(&Token, 3, &config, 1).unwrap();

        assert_eq!(report.states(), &[vec![1.0], vec![2.0], vec![]]);
        assert_eq!(report.gvt(), SimTime::new(3.0).unwrap());
    }
}
