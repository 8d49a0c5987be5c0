//! Parameter sweeps over `(rho, alpha)`
//!
//! Runs share no mutable state, so each combination is an independent job
//! on the rayon pool. Parallelism lives here rather than inside a run.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::config::{ExperimentConfig, SimulationConfig};
use crate::core::error::Result;
use crate::data::inputs::CityInputs;
use crate::simulation::checkpoint::{CheckpointSink, JsonDirectorySink, NullSink};
use crate::simulation::driver::Simulation;
use crate::simulation::output::SimulationOutput;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepResult {
    pub rho: usize,
    pub alpha: f64,
    pub output: SimulationOutput,
}

impl SweepResult {
    pub fn calibration_error(&self) -> Option<f64> {
        self.output.statistics.calibration_error
    }
}

/// Run every combination, building one checkpoint sink per run
pub fn run_sweep_with<S, F>(
    experiment: &ExperimentConfig,
    inputs: &CityInputs,
    make_sink: F,
) -> Result<Vec<SweepResult>>
where
    S: CheckpointSink,
    F: Fn(&SimulationConfig) -> Result<S> + Sync,
{
    experiment.validate()?;
    let combinations = experiment.combinations();

    tracing::info!(
        runs = combinations.len(),
        threads = rayon::current_num_threads(),
        "starting parameter sweep"
    );

    combinations
        .par_iter()
        .map(|config| {
            let mut sink = make_sink(config)?;
            let mut simulation = Simulation::new(config.clone(), inputs)?
                .with_city_key(experiment.city_key.as_str());
            let output = simulation.run(&mut sink)?;
            Ok(SweepResult {
                rho: config.rho,
                alpha: config.alpha,
                output,
            })
        })
        .collect()
}

/// Run every combination, writing checkpoints under the experiment's output directory
pub fn run_sweep(experiment: &ExperimentConfig, inputs: &CityInputs) -> Result<Vec<SweepResult>> {
    run_sweep_with(experiment, inputs, |_| JsonDirectorySink::new(&experiment.output_dir))
}

/// Run every combination without writing anything
pub fn run_sweep_in_memory(
    experiment: &ExperimentConfig,
    inputs: &CityInputs,
) -> Result<Vec<SweepResult>> {
    run_sweep_with(experiment, inputs, |_| Ok(NullSink))
}

/// The combination whose zones best match the observed incomes
pub fn best_fit(results: &[SweepResult]) -> Option<&SweepResult> {
    results
        .iter()
        .filter_map(|r| r.calibration_error().map(|e| (r, e)))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(r, _)| r)
}
