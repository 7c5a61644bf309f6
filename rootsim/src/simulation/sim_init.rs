use std::fmt;
use std::time::Duration;

use crate::model::Model;
use crate::time::SimTime;

use super::{
    Checkpointing, Config, Delivery, ExecutionMode, LpBinding, Seed, Simulation, SimulationError,
    TerminationMode,
};

/// Builder for a simulation.
pub struct SimInit<M: Model> {
    model: M,
    lp_count: usize,
    config: Config,
}

impl<M: Model> SimInit<M> {
    /// Creates a builder for a simulation of `lp_count` LPs with the default
    /// configuration.
    pub fn new(model: M, lp_count: usize) -> Self {
        Self::with_config(model, lp_count, Config::default())
    }

    /// Creates a builder for a simulation of `lp_count` LPs with the specified
    /// configuration.
    pub fn with_config(model: M, lp_count: usize, config: Config) -> Self {
        Self {
            model,
            lp_count,
            config,
        }
    }

    /// Sets the number of worker threads.
    pub fn set_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Sets the snapshot policy.
    pub fn set_checkpointing(mut self, checkpointing: Checkpointing) -> Self {
        self.config.checkpointing = checkpointing;
        self
    }

    /// Sets the wall-clock interval between GVT rounds.
    pub fn set_gvt_period(mut self, period: Duration) -> Self {
        self.config.gvt_period = period;
        self
    }

    /// Sets the number of GVT rounds between evaluations of the termination
    /// predicate.
    pub fn set_gvt_snapshot_cycles(mut self, cycles: u32) -> Self {
        self.config.gvt_snapshot_cycles = cycles;
        self
    }

    /// Sets the evaluation mode of the termination predicate.
    pub fn set_termination_mode(mut self, mode: TerminationMode) -> Self {
        self.config.termination_mode = mode;
        self
    }

    /// Sets the assignment of LPs to workers.
    pub fn set_lp_binding(mut self, binding: LpBinding) -> Self {
        self.config.lp_binding = binding;
        self
    }

    /// Sets the number of GVT rounds between two rebindings of the LPs when
    /// the binding is [`LpBinding::Knapsack`].
    pub fn set_rebind_period(mut self, rounds: u32) -> Self {
        self.config.rebind_period = rounds;
        self
    }

    /// Sets the master seed of the random number generators.
    pub fn set_seed(mut self, seed: Seed) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets the simulation engine.
    pub fn set_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.config.execution_mode = mode;
        self
    }

    /// Sets the simulation time at which the simulation stops.
    pub fn set_time_bound(mut self, bound: SimTime) -> Self {
        self.config.time_bound = Some(bound);
        self
    }

    /// Sets the delivery path of messages.
    pub fn set_delivery(mut self, delivery: Delivery) -> Self {
        self.config.delivery = delivery;
        self
    }

    /// Validates the configuration and builds the simulation.
    pub fn init(mut self) -> Result<Simulation<M>, SimulationError> {
        if self.lp_count == 0 {
            return Err(SimulationError::InvalidConfig(
                "the simulation has no LP".to_string(),
            ));
        }
        if self.config.workers == 0 {
            return Err(SimulationError::InvalidConfig(
                "the number of workers must be at least 1".to_string(),
            ));
        }
        if self.config.gvt_snapshot_cycles == 0 {
            return Err(SimulationError::InvalidConfig(
                "the number of GVT snapshot cycles must be at least 1".to_string(),
            ));
        }
        if self.config.lp_binding == LpBinding::Knapsack && self.config.rebind_period == 0 {
            return Err(SimulationError::InvalidConfig(
                "the rebinding period must be at least 1 GVT round".to_string(),
            ));
        }
        if self.config.time_bound == Some(SimTime::ZERO) {
            return Err(SimulationError::InvalidConfig(
                "the simulation time bound must be positive".to_string(),
            ));
        }
        if self.config.workers > self.lp_count {
            tracing::debug!(
                workers = self.config.workers,
                lps = self.lp_count,
                "number of workers capped to the number of LPs"
            );
            self.config.workers = self.lp_count;
        }
        let master_seed = self.config.seed.resolve();

        Ok(Simulation::new(
            self.model,
            self.lp_count,
            self.config,
            master_seed,
        ))
    }
}

impl<M: Model> fmt::Debug for SimInit<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInit")
            .field("lp_count", &self.lp_count)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
