//! Example: the PHOLD benchmark run in parallel and sequentially.
//!
//! This example demonstrates in particular:
//!
//! * simulation configuration,
//! * termination through the model predicate,
//! * execution statistics,
//! * logging with simulation time stamps.
//!
//! Set `RUST_LOG=rootsim=debug` to follow GVT rounds and rollbacks.

use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;

use rootsim::simulation::{
    Checkpointing, Config, ExecutionMode, SimInit, SimulationError, TerminationMode,
};
use rootsim::tracing::SimulationTime;
use rootsim_util::helper_models::Phold;

const LP_COUNT: usize = 256;
const TARGET: u64 = 1_000;

fn main() -> Result<(), SimulationError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(SimulationTime::with_precision(3))
        .init();

    let model = Phold::new(TARGET).with_population(4).with_remote_probability(0.8);

    // Parallel run.
    let config = Config {
        checkpointing: Checkpointing::Periodic(8),
        termination_mode: TerminationMode::Incremental,
        gvt_period: Duration::from_millis(20),
        ..Config::default()
    };
    let start = Instant::now();
    let report = SimInit::with_config(model.clone(), LP_COUNT, config).init()?.run()?;
    let totals = report.total_stats();
    tracing::info!(
        elapsed = ?start.elapsed(),
        gvt = %report.gvt(),
        rounds = report.gvt_rounds(),
        committed = totals.committed,
        rollbacks = totals.rollbacks,
        efficiency = totals.efficiency(),
        "parallel run"
    );
    assert!(report.states().iter().all(|s| s.processed >= TARGET));

    // Sequential run.
    let config = Config {
        execution_mode: ExecutionMode::Serial,
        ..Config::default()
    };
    let start = Instant::now();
    let report = SimInit::with_config(model, LP_COUNT, config).init()?.run()?;
    tracing::info!(
        elapsed = ?start.elapsed(),
        committed = report.total_stats().committed,
        "sequential run"
    );

    Ok(())
}
