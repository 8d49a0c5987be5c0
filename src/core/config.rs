//! Simulation configuration with documented constants
//!
//! Every tunable of a run lives here and is passed explicitly into the
//! driver. There is no process-wide configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::types::Timestep;

/// Default multiplicative-weights learning rate
pub const DEFAULT_EPSILON: f64 = 1e-3;

/// Default inequality factor of the synthetic Lorenz curve
pub const DEFAULT_TAU: f64 = 0.5;

/// How the per-timestep cost is applied to an agent's weight vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMode {
    /// Every zone's weight is updated with its own cost each timestep
    #[default]
    Vector,
    /// Only the weight of the zone the agent just chose is updated
    Scalar,
}

/// What to do when a route-restricted distribution has zero mass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteFallback {
    /// Sample from the unrestricted distribution instead
    #[default]
    Unrestricted,
    /// Abort the run with `SimError::EmptyRouteMass`
    Fail,
}

/// Where agent endowments come from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndowmentSource {
    /// Differences of the Lorenz curve `1 - (1 - x)^tau`
    Lorenz { tau: f64 },
    /// Population-weighted draw from the inputs' empirical income table
    Empirical,
}

impl Default for EndowmentSource {
    fn default() -> Self {
        EndowmentSource::Lorenz { tau: DEFAULT_TAU }
    }
}

/// Prefix of checkpoint files when none is configured
pub const DEFAULT_CITY_KEY: &str = "city";

/// Configuration of a single simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Zone capacity. Once a zone holds `rho` or more inhabitants, the
    /// endowment of its `rho`-th richest inhabitant becomes the admission
    /// threshold.
    pub rho: usize,

    /// Weight between community matching and amenity access in the cost.
    ///
    /// `alpha` scales the community term, `1 - alpha` the accessibility term.
    pub alpha: f64,

    /// Learning rate of the weight update `w *= 1 - epsilon * cost`.
    ///
    /// Must lie in (0, 1) so weights stay strictly positive.
    pub epsilon: f64,

    pub num_agents: usize,

    /// Total number of timesteps to simulate
    pub t_max: Timestep,

    /// Explicit checkpoint timesteps; takes precedence over `benchmark_interval`
    pub benchmarks: Vec<Timestep>,

    /// Checkpoint every `n` timesteps when `benchmarks` is empty
    pub benchmark_interval: Option<Timestep>,

    /// RNG seed. Derived from `rho` and `alpha` when absent.
    pub seed: Option<u64>,

    pub cost_mode: CostMode,
    pub route_fallback: RouteFallback,
    pub endowments: EndowmentSource,

    /// Minimum agent count before the learn phase runs on the rayon pool
    pub parallel_threshold: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rho: 4,
            alpha: 0.25,
            epsilon: DEFAULT_EPSILON,
            num_agents: 150,
            t_max: 100,
            benchmarks: Vec::new(),
            benchmark_interval: Some(10),
            seed: None,
            cost_mode: CostMode::Vector,
            route_fallback: RouteFallback::Unrestricted,
            endowments: EndowmentSource::default(),
            parallel_threshold: 1000,
        }
    }
}

impl SimulationConfig {
    /// Copy of this config with the sweep parameters replaced
    pub fn with_params(&self, rho: usize, alpha: f64) -> Self {
        Self {
            rho,
            alpha,
            ..self.clone()
        }
    }

    /// Seed actually used by the run
    pub fn effective_seed(&self) -> u64 {
        self.seed
            .unwrap_or_else(|| self.rho as u64 * 1000 + (self.alpha * 100.0).floor() as u64)
    }

    /// Strictly increasing checkpoint schedule, always non-empty
    pub fn benchmark_schedule(&self) -> Vec<Timestep> {
        if !self.benchmarks.is_empty() {
            return self.benchmarks.clone();
        }
        match self.benchmark_interval {
            Some(interval) if interval > 0 => {
                let mut schedule: Vec<Timestep> =
                    (1..=self.t_max / interval).map(|k| k * interval).collect();
                if schedule.last() != Some(&self.t_max) {
                    schedule.push(self.t_max);
                }
                schedule
            }
            _ => vec![self.t_max],
        }
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.rho == 0 {
            return Err(SimError::InvalidConfig("rho must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(SimError::InvalidConfig(format!(
                "alpha ({}) must lie in [0, 1]",
                self.alpha
            )));
        }
        // epsilon >= 1 would let a full-cost step drive a weight to zero
        if !(self.epsilon > 0.0 && self.epsilon < 1.0) {
            return Err(SimError::InvalidConfig(format!(
                "epsilon ({}) must lie in (0, 1)",
                self.epsilon
            )));
        }
        if self.num_agents == 0 {
            return Err(SimError::InvalidConfig("num_agents must be positive".into()));
        }
        if self.num_agents > u32::MAX as usize {
            return Err(SimError::InvalidConfig(format!(
                "num_agents ({}) exceeds the agent id space",
                self.num_agents
            )));
        }
        if self.t_max == 0 {
            return Err(SimError::InvalidConfig("t_max must be positive".into()));
        }
        if let EndowmentSource::Lorenz { tau } = self.endowments {
            if !(tau > 0.0 && tau <= 1.0) {
                return Err(SimError::InvalidConfig(format!(
                    "Lorenz tau ({}) must lie in (0, 1]",
                    tau
                )));
            }
        }

        let schedule = self.benchmark_schedule();
        if schedule.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SimError::InvalidConfig(
                "benchmarks must be strictly increasing".into(),
            ));
        }
        if schedule.iter().any(|&t| t == 0 || t > self.t_max) {
            return Err(SimError::InvalidConfig(format!(
                "benchmarks must lie in 1..={}",
                self.t_max
            )));
        }

        Ok(())
    }
}

/// A batch of runs over every `(rho, alpha)` combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Prefix of every file the experiment writes
    pub city_key: String,
    pub rhos: Vec<usize>,
    pub alphas: Vec<f64>,
    pub output_dir: PathBuf,
    /// Base run configuration; `rho` and `alpha` are overridden per combination
    pub simulation: SimulationConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            city_key: DEFAULT_CITY_KEY.into(),
            rhos: vec![4],
            alphas: vec![0.25],
            output_dir: PathBuf::from("data"),
            simulation: SimulationConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Load an experiment from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Every run configuration of the sweep, in `rho`-major order
    pub fn combinations(&self) -> Vec<SimulationConfig> {
        self.rhos
            .iter()
            .flat_map(|&rho| {
                self.alphas
                    .iter()
                    .map(move |&alpha| self.simulation.with_params(rho, alpha))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rhos.is_empty() || self.alphas.is_empty() {
            return Err(SimError::InvalidConfig(
                "experiment needs at least one rho and one alpha".into(),
            ));
        }
        for config in self.combinations() {
            config.validate()?;
        }
        Ok(())
    }
}
