//! Simulation output and serialization

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::city::report::ZoneSummary;
use crate::core::error::Result;
use crate::simulation::driver::Simulation;

/// Complete simulation output
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationOutput {
    pub rho: usize,
    pub alpha: f64,
    pub zones: Vec<ZoneSummary>,
    /// Expected number of agents per zone under the time-averaged occupancy
    pub average_occupancy: Vec<f64>,
    pub statistics: SimulationStats,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationStats {
    pub timesteps_simulated: u64,
    pub simulation_time_ms: u64,
    pub num_agents: usize,
    pub num_zones: usize,
    pub occupied_zones: usize,
    pub max_population: usize,
    pub mean_threshold: f64,
    pub calibration_error: Option<f64>,
}

impl SimulationOutput {
    pub fn new(simulation: &Simulation, elapsed: Duration) -> Result<Self> {
        let ledger = simulation.ledger();
        let agents = simulation.agents();
        let n = ledger.n();

        let zones = ledger.get_data(agents)?;
        let calibration_error = ledger.calibration_error(agents)?;

        let occupied_zones = (0..n).filter(|&z| ledger.population(z) > 0).count();
        let max_population = (0..n).map(|z| ledger.population(z)).max().unwrap_or(0);
        let mean_threshold = (0..n).map(|z| ledger.threshold(z)).sum::<f64>() / n as f64;

        Ok(Self {
            rho: simulation.config().rho,
            alpha: simulation.config().alpha,
            zones,
            average_occupancy: simulation.average_occupancy(),
            statistics: SimulationStats {
                timesteps_simulated: simulation.timestep(),
                simulation_time_ms: elapsed.as_millis() as u64,
                num_agents: agents.len(),
                num_zones: n,
                occupied_zones,
                max_population,
                mean_threshold,
                calibration_error,
            },
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn summary(&self) -> String {
        let calibration = self
            .statistics
            .calibration_error
            .map(|e| format!("{:.4}", e))
            .unwrap_or_else(|| "n/a".to_string());
        format!(
            "rho={} alpha={}: simulated {} timesteps in {}ms\n{} agents over {}/{} zones, max population {}, calibration error {}",
            self.rho,
            self.alpha,
            self.statistics.timesteps_simulated,
            self.statistics.simulation_time_ms,
            self.statistics.num_agents,
            self.statistics.occupied_zones,
            self.statistics.num_zones,
            self.statistics.max_population,
            calibration,
        )
    }
}
