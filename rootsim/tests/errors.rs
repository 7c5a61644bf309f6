//! Fatal errors raised by models.
use std::time::Duration;

use rootsim::model::{Context, Event, LpId, Model};
use rootsim::simulation::{
    ExecutionMode, SchedulingError, SimInit, SimulationError,
};
use rootsim::time::SimTime;

/// LP 1 schedules an event in its own past at its third event.
struct TimeTraveler;

impl Model for TimeTraveler {
    type State = u32;

    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> u32 {
        cx.schedule_new_event(lp, SimTime::new(1.0).unwrap(), 0, &[])
            .unwrap();
        0
    }

    fn process_event(&self, count: &mut u32, _event: &Event<'_>, cx: &mut Context<'_>) {
        *count += 1;
        let t = if cx.lp() == LpId::new(1) && *count == 3 {
            SimTime::new(cx.now().as_f64() - 0.5).unwrap()
        } else {
            cx.now() + 1.0
        };
        let result = cx.schedule_new_event(cx.lp(), t, 0, &[]);
        if *count == 3 && cx.lp() == LpId::new(1) {
            assert_eq!(result, Err(SchedulingError::PastTimestamp));
        }
    }

    fn on_gvt(&self, _lp: LpId, _count: &u32) -> bool {
        false
    }
}

#[test]
fn causality_violation_stops_parallel_simulation() {
    let result = SimInit::new(TimeTraveler, 4)
        .set_workers(2)
        .set_gvt_period(Duration::from_millis(1))
        .init()
        .unwrap()
        .run();

    match result {
        Err(SimulationError::CausalityViolation { lp, now, timestamp, .. }) => {
            assert_eq!(lp, LpId::new(1));
            assert_eq!(now, SimTime::new(3.0).unwrap());
            assert_eq!(timestamp, SimTime::new(2.5).unwrap());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn causality_violation_stops_serial_simulation() {
    let result = SimInit::new(TimeTraveler, 4)
        .set_execution_mode(ExecutionMode::Serial)
        .init()
        .unwrap()
        .run();

    assert!(matches!(
        result,
        Err(SimulationError::CausalityViolation { .. })
    ));
}

#[test]
fn reserved_event_type_is_fatal() {
    struct Reserved;

    impl Model for Reserved {
        type State = ();

        fn init(&self, lp: LpId, cx: &mut Context<'_>) {
            let result = cx.schedule_new_event(lp, SimTime::new(1.0).unwrap(), -3, &[]);
            assert_eq!(result, Err(SchedulingError::ReservedEventType));
        }

        fn process_event(&self, _state: &mut (), _event: &Event<'_>, _cx: &mut Context<'_>) {}

        fn on_gvt(&self, _lp: LpId, _state: &()) -> bool {
            true
        }
    }

    let result = SimInit::new(Reserved, 2).set_workers(2).init().unwrap().run();
    assert!(matches!(
        result,
        Err(SimulationError::ReservedEventType { event_type: -3, .. })
    ));
}

#[test]
fn model_panic_is_reported() {
    struct Faulty;

    impl Model for Faulty {
        type State = ();

        fn init(&self, lp: LpId, cx: &mut Context<'_>) {
            cx.schedule_new_event(lp, SimTime::new(1.0).unwrap(), 0, &[])
                .unwrap();
        }

        fn process_event(&self, _state: &mut (), _event: &Event<'_>, cx: &mut Context<'_>) {
            if cx.lp() == LpId::new(0) {
                panic!("faulty model");
            }
        }

        fn on_gvt(&self, _lp: LpId, _state: &()) -> bool {
            false
        }
    }

    let result = SimInit::new(Faulty, 2)
        .set_workers(2)
        .set_gvt_period(Duration::from_millis(1))
        .init()
        .unwrap()
        .run();

    match result {
        Err(SimulationError::WorkerPanic { worker, message }) => {
            assert_eq!(worker, 0);
            assert_eq!(message, "faulty model");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn invalid_receiver_is_not_fatal() {
    struct Stray;

    impl Model for Stray {
        type State = bool;

        fn init(&self, lp: LpId, cx: &mut Context<'_>) -> bool {
            let result = cx.schedule_new_event(LpId::new(99), SimTime::new(1.0).unwrap(), 0, &[]);
            assert_eq!(result, Err(SchedulingError::InvalidReceiver));
            cx.schedule_new_event(lp, SimTime::new(1.0).unwrap(), 0, &[])
                .unwrap();
            false
        }

        fn process_event(&self, done: &mut bool, _event: &Event<'_>, _cx: &mut Context<'_>) {
            *done = true;
        }

        fn on_gvt(&self, _lp: LpId, done: &bool) -> bool {
            *done
        }
    }

    let report = SimInit::new(Stray, 2)
        .set_workers(1)
        .set_gvt_period(Duration::from_millis(1))
        .init()
        .unwrap()
        .run()
        .unwrap();

    assert!(report.states().iter().all(|&done| done));
}
