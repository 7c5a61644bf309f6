//! Suspension of an LP until another LP unblocks it.
use std::time::Duration;

use rootsim::model::{Context, Event, LpId, Model};
use rootsim::simulation::{Checkpointing, LpBinding, SimInit};
use rootsim::time::SimTime;

const WAIT: i32 = 0;
const RELEASE: i32 = 1;
const AFTER: i32 = 2;

/// LP 0 suspends on its first event until LP 1 releases it at time 2.
struct Handshake;

impl Model for Handshake {
    type State = Vec<(f64, i32, bool)>;

    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> Self::State {
        let (t, event_type) = match lp.index() {
            0 => (1.0, WAIT),
            _ => (2.0, RELEASE),
        };
        cx.schedule_new_event(lp, SimTime::new(t).unwrap(), event_type, &[])
            .unwrap();

        Vec::new()
    }

    fn process_event(&self, state: &mut Self::State, event: &Event<'_>, cx: &mut Context<'_>) {
        state.push((event.timestamp().as_f64(), event.event_type(), event.is_resumed()));
        match event.event_type() {
            WAIT if !event.is_resumed() => cx.suspend(),
            WAIT => {
                let t = cx.now() + 1.0;
                cx.schedule_new_event(cx.lp(), t, AFTER, &[]).unwrap();
            }
            RELEASE => cx.send_unblock(LpId::new(0)).unwrap(),
            _ => {}
        }
    }

    fn on_gvt(&self, _lp: LpId, _state: &Self::State) -> bool {
        false
    }
}

fn check(states: &[Vec<(f64, i32, bool)>]) {
    assert_eq!(
        states[0],
        vec![(1.0, WAIT, false), (1.0, WAIT, true), (2.0, AFTER, false)]
    );
    assert_eq!(states[1], vec![(2.0, RELEASE, false)]);
}

#[test]
fn suspended_lp_resumes_on_unblock() {
    for workers in [1, 2] {
        let report = SimInit::new(Handshake, 2)
            .set_workers(workers)
            .set_checkpointing(Checkpointing::Periodic(3))
            .set_gvt_period(Duration::from_millis(1))
            .init()
            .unwrap()
            .run()
            .unwrap();

        check(report.states());
        assert_eq!(report.gvt(), SimTime::INFINITY);
    }
}

#[test]
fn unblock_is_kept_until_suspension() {
    /// The release happens before the suspension in simulation time.
    struct EarlyRelease;

    impl Model for EarlyRelease {
        type State = Vec<(f64, bool)>;

        fn init(&self, lp: LpId, cx: &mut Context<'_>) -> Self::State {
            let t = if lp.index() == 0 { 5.0 } else { 1.0 };
            cx.schedule_new_event(lp, SimTime::new(t).unwrap(), 0, &[])
                .unwrap();
            Vec::new()
        }

        fn process_event(&self, state: &mut Self::State, event: &Event<'_>, cx: &mut Context<'_>) {
            state.push((event.timestamp().as_f64(), event.is_resumed()));
            if cx.lp() == LpId::new(0) {
                if !event.is_resumed() {
                    cx.suspend();
                }
            } else {
                cx.send_unblock(LpId::new(0)).unwrap();
            }
        }

        fn on_gvt(&self, _lp: LpId, _state: &Self::State) -> bool {
            false
        }
    }

    let report = SimInit::new(EarlyRelease, 2)
        .set_workers(2)
        .set_lp_binding(LpBinding::Circular)
        .set_gvt_period(Duration::from_millis(1))
        .init()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.states()[0], vec![(5.0, false), (5.0, true)]);
    assert_eq!(report.states()[1], vec![(1.0, false)]);
}
