use std::time::Duration;

use crate::time::SimTime;

/// Default master seed of the random number generators.
pub const DEFAULT_SEED: u64 = 0x5eed_cafe_f00d_d00d;

/// Policy for taking state snapshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Checkpointing {
    /// The state is logged after every event.
    #[default]
    Copy,
    /// The state is logged every `n` events.
    ///
    /// A period of 0 is treated as 1.
    Periodic(usize),
}

/// The way the termination predicate of the model is evaluated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TerminationMode {
    /// The predicate is evaluated on the committed snapshot of every LP.
    #[default]
    Normal,
    /// As `Normal`, but an LP is no longer asked once it agreed to terminate.
    ///
    /// Agreement is assumed to be permanent: if the committed state of an LP
    /// stops satisfying the predicate after it agreed, the simulation may
    /// still terminate.
    Incremental,
    /// The predicate is evaluated on the committed state of every LP brought
    /// forward to the GVT by silent re-execution.
    Accurate,
}

/// The assignment of LPs to worker threads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LpBinding {
    /// Each worker is assigned a contiguous range of LPs.
    #[default]
    Block,
    /// LP `i` is assigned to worker `i mod workers`.
    Circular,
    /// LPs start with a block assignment and are periodically redistributed
    /// so as to balance the estimated load of the workers.
    ///
    /// The estimated load of an LP grows with the length of its input queue
    /// and the mean wall-clock cost of its events, and decreases with the
    /// simulated time spanned by its input queue. Rebinding takes place at
    /// the end of a GVT round, every [`Config::rebind_period`] rounds.
    Knapsack,
}

/// The master seed of the random number generators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seed {
    /// A fixed seed, which makes runs reproducible.
    Fixed(u64),
    /// A seed drawn from the thread-local random number generator.
    Random,
}

impl Default for Seed {
    fn default() -> Self {
        Self::Fixed(DEFAULT_SEED)
    }
}

impl Seed {
    pub(crate) fn resolve(self) -> u64 {
        match self {
            Self::Fixed(seed) => seed,
            Self::Random => rand::random(),
        }
    }
}

/// The simulation engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Optimistic execution on several worker threads.
    #[default]
    Parallel,
    /// Sequential execution from a single calendar queue, without rollbacks.
    Serial,
}

/// The delivery path of messages between LPs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Messages are moved through shared memory.
    #[default]
    Direct,
    /// Messages are serialized and deserialized before delivery, as they
    /// would be when crossing a kernel boundary.
    Serialized,
}

/// Simulation configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of worker threads; the number of available CPUs by default.
    ///
    /// The number of workers is capped to the number of LPs.
    pub workers: usize,
    /// Snapshot policy.
    pub checkpointing: Checkpointing,
    /// Wall-clock interval between GVT rounds.
    pub gvt_period: Duration,
    /// The termination predicate is evaluated every `gvt_snapshot_cycles` GVT
    /// rounds.
    pub gvt_snapshot_cycles: u32,
    /// Evaluation mode of the termination predicate.
    pub termination_mode: TerminationMode,
    /// Assignment of LPs to workers.
    pub lp_binding: LpBinding,
    /// Number of GVT rounds between two rebindings with
    /// [`LpBinding::Knapsack`].
    pub rebind_period: u32,
    /// Master seed of the random number generators.
    pub seed: Seed,
    /// Simulation engine.
    pub execution_mode: ExecutionMode,
    /// Simulation time at which the simulation stops, if any.
    pub time_bound: Option<SimTime>,
    /// Delivery path of messages.
    pub delivery: Delivery,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            checkpointing: Checkpointing::default(),
            gvt_period: Duration::from_millis(100),
            gvt_snapshot_cycles: 2,
            termination_mode: TerminationMode::default(),
            lp_binding: LpBinding::default(),
            rebind_period: 100,
            seed: Seed::default(),
            execution_mode: ExecutionMode::default(),
            time_bound: None,
            delivery: Delivery::default(),
        }
    }
}
