//! Termination of parallel simulations through the model predicate.
use std::time::Duration;

use rootsim::model::{Context, Event, LpId, Model};
use rootsim::simulation::{
    Checkpointing, Config, ExecutionMode, SimInit, SimulationReport, TerminationMode,
};
use rootsim::time::SimTime;

const LP_COUNT: usize = 4;
const TARGET: u64 = 200;

/// Each LP sends events to random LPs and agrees to terminate once it has
/// processed `TARGET` events.
struct Counter;

impl Model for Counter {
    type State = u64;

    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> u64 {
        let t = cx.now() + cx.expent(1.0);
        cx.schedule_new_event(lp, t, 0, &[]).unwrap();
        0
    }

    fn process_event(&self, count: &mut u64, _event: &Event<'_>, cx: &mut Context<'_>) {
        *count += 1;
        let receiver = cx.random_range(0, cx.lp_count() as i32 - 1) as usize;
        let t = cx.now() + cx.expent(1.0);
        cx.schedule_new_event(LpId::new(receiver), t, 0, &[]).unwrap();
    }

    fn on_gvt(&self, _lp: LpId, count: &u64) -> bool {
        *count >= TARGET
    }
}

fn run(mode: TerminationMode, checkpointing: Checkpointing) -> SimulationReport<u64> {
    let config = Config {
        workers: 2,
        checkpointing,
        termination_mode: mode,
        gvt_period: Duration::from_millis(1),
        gvt_snapshot_cycles: 1,
        ..Config::default()
    };

    SimInit::with_config(Counter, LP_COUNT, config)
        .init()
        .unwrap()
        .run()
        .unwrap()
}

fn check(report: &SimulationReport<u64>) {
    assert!(report.states().iter().all(|&count| count >= TARGET));
    assert!(report.stats().iter().all(|s| s.committed >= TARGET));
    assert!(!report.gvt().is_infinite());
    assert!(report.gvt_rounds() >= 1);
}

#[test]
fn normal_termination() {
    check(&run(TerminationMode::Normal, Checkpointing::Copy));
}

#[test]
fn normal_termination_with_periodic_checkpointing() {
    check(&run(TerminationMode::Normal, Checkpointing::Periodic(7)));
}

#[test]
fn incremental_termination() {
    let report = run(TerminationMode::Incremental, Checkpointing::Copy);
    // An LP that agreed early is not asked again, so only the committed
    // counters are bounded below.
    assert!(report.stats().iter().all(|s| s.committed >= TARGET));
}

#[test]
fn accurate_termination() {
    check(&run(TerminationMode::Accurate, Checkpointing::Periodic(50)));
}

#[test]
fn serial_termination() {
    let config = Config {
        execution_mode: ExecutionMode::Serial,
        ..Config::default()
    };
    let report = SimInit::with_config(Counter, LP_COUNT, config)
        .init()
        .unwrap()
        .run()
        .unwrap();

    assert!(report.states().iter().all(|&count| count >= TARGET));
    assert_eq!(report.gvt_rounds(), 0);
}

#[test]
fn empty_simulation_ends_on_infinite_gvt() {
    struct Idle;

    impl Model for Idle {
        type State = ();

        fn init(&self, _lp: LpId, _cx: &mut Context<'_>) {}

        fn process_event(&self, _state: &mut (), _event: &Event<'_>, _cx: &mut Context<'_>) {}

        fn on_gvt(&self, _lp: LpId, _state: &()) -> bool {
            false
        }
    }

    let report = SimInit::new(Idle, 3)
        .set_workers(2)
        .set_gvt_period(Duration::from_millis(1))
        .init()
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.gvt(), SimTime::INFINITY);
    assert_eq!(report.total_stats().events, 0);
}
