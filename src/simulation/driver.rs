//! Main simulation loop
//!
//! Every timestep runs three phases in a fixed order:
//! 1. `act` for every agent (sequential, shares the RNG and the ledger)
//! 2. `ZoneLedger::update` (barrier)
//! 3. `learn` for every agent (independent; parallel above a threshold)

use std::time::Instant;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::agent::Agent;
use crate::city::ledger::ZoneLedger;
use crate::core::config::{SimulationConfig, DEFAULT_CITY_KEY};
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, Timestep};
use crate::data::inputs::CityInputs;
use crate::simulation::checkpoint::{Checkpoint, CheckpointSink};
use crate::simulation::endowment::draw_endowments;
use crate::simulation::output::SimulationOutput;

pub struct Simulation {
    /// Prefix of every checkpoint this run produces
    city_key: String,
    config: SimulationConfig,
    ledger: ZoneLedger,
    /// Agent arena, indexed by `AgentId`
    agents: Vec<Agent>,
    rng: ChaCha8Rng,
    timestep: Timestep,
}

impl Simulation {
    /// Build the city, draw endowments and place every agent
    pub fn new(config: SimulationConfig, inputs: &CityInputs) -> Result<Self> {
        config.validate()?;

        let mut ledger = ZoneLedger::new(inputs, config.rho)?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.effective_seed());

        let endowments = draw_endowments(config.endowments, config.num_agents, inputs, &mut rng)?;

        let agents = endowments
            .iter()
            .enumerate()
            .map(|(i, &endowment)| {
                let mut agent =
                    Agent::new(AgentId(i as u32), endowment, config.alpha, &mut ledger, &mut rng)?;
                agent.assign_routes(&inputs.routes)?;
                Ok(agent)
            })
            .collect::<Result<Vec<_>>>()?;

        let unknown_routes = inputs
            .routes
            .keys()
            .filter(|&&id| id as usize >= agents.len())
            .count();
        if unknown_routes > 0 {
            tracing::warn!(unknown_routes, "route table names agents that do not exist");
        }

        // Initial aggregation so the first learn step sees populated zones
        ledger.update(&agents)?;

        tracing::info!(
            rho = config.rho,
            alpha = config.alpha,
            agents = agents.len(),
            zones = ledger.n(),
            seed = config.effective_seed(),
            "simulation initialized"
        );

        Ok(Self {
            city_key: DEFAULT_CITY_KEY.to_string(),
            config,
            ledger,
            agents,
            rng,
            timestep: 0,
        })
    }

    /// Resume from a checkpoint
    pub fn from_checkpoint(checkpoint: Checkpoint) -> Result<Self> {
        checkpoint.config.validate()?;

        let Checkpoint {
            city_key,
            timestep,
            config,
            ledger,
            agents,
            rng,
        } = checkpoint;

        ledger.validate()?;
        if ledger.rho() != config.rho {
            return Err(SimError::InvalidInput(format!(
                "checkpoint ledger uses rho {} but its config rho {}",
                ledger.rho(),
                config.rho
            )));
        }
        for agent in &agents {
            agent.validate(ledger.n())?;
        }

        if agents.len() != config.num_agents || ledger.total_population() != agents.len() {
            return Err(SimError::InvalidInput(format!(
                "checkpoint holds {} agents but {} inhabitants",
                agents.len(),
                ledger.total_population()
            )));
        }
        if let Some(agent) = agents
            .iter()
            .enumerate()
            .find(|(i, a)| a.id.index() != *i || !ledger.contains(a.id, a.zone()))
            .map(|(_, a)| a)
        {
            return Err(SimError::InvalidInput(format!(
                "{} is out of place in the checkpoint",
                agent.id
            )));
        }

        Ok(Self {
            city_key,
            config,
            ledger,
            agents,
            rng,
            timestep,
        })
    }

    pub fn with_city_key(mut self, city_key: impl Into<String>) -> Self {
        self.city_key = city_key.into();
        self
    }

    /// Advance one timestep: act, aggregate, learn
    pub fn step(&mut self) -> Result<()> {
        let fallback = self.config.route_fallback;
        for agent in self.agents.iter_mut() {
            agent.act(&mut self.ledger, &mut self.rng, fallback)?;
        }

        self.ledger.update(&self.agents)?;

        let ledger = &self.ledger;
        let epsilon = self.config.epsilon;
        let mode = self.config.cost_mode;
        if self.agents.len() >= self.config.parallel_threshold {
            self.agents
                .par_iter_mut()
                .try_for_each(|agent| agent.learn(ledger, epsilon, mode))?;
        } else {
            for agent in self.agents.iter_mut() {
                agent.learn(ledger, epsilon, mode)?;
            }
        }

        self.timestep += 1;
        tracing::trace!(timestep = self.timestep, "timestep complete");
        Ok(())
    }

    /// Advance `steps` timesteps without checkpointing
    pub fn advance(&mut self, steps: u64) -> Result<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Run to `t_max`, handing a checkpoint to `sink` at every benchmark
    pub fn run(&mut self, sink: &mut dyn CheckpointSink) -> Result<SimulationOutput> {
        let start = Instant::now();
        let schedule = self.config.benchmark_schedule();

        tracing::info!(
            from = self.timestep,
            to = self.config.t_max,
            benchmarks = schedule.len(),
            "running simulation"
        );

        while self.timestep < self.config.t_max {
            self.step()?;

            if schedule.binary_search(&self.timestep).is_ok() {
                sink.record(&self.checkpoint())?;
                tracing::info!(
                    timestep = self.timestep,
                    occupied = self.occupied_zones(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "benchmark reached"
                );
            }
        }

        let output = SimulationOutput::new(self, start.elapsed())?;
        tracing::info!("{}", output.summary());
        Ok(output)
    }

    /// Move the end of the run to `t_max`.
    ///
    /// An explicit benchmark list gains `t_max` so the new end is checkpointed.
    pub fn extend_to(&mut self, t_max: Timestep) -> Result<()> {
        let mut config = self.config.clone();
        config.t_max = t_max;
        if config.benchmarks.last().map_or(false, |&last| last < t_max) {
            config.benchmarks.push(t_max);
        }
        config.validate()?;
        if t_max < self.timestep {
            return Err(SimError::InvalidConfig(format!(
                "t_max ({}) is before the current timestep ({})",
                t_max, self.timestep
            )));
        }
        self.config = config;
        Ok(())
    }

    /// Return to timestep 0: clear the ledger and reset every agent
    pub fn reset(&mut self) -> Result<()> {
        self.ledger.reset();
        for agent in self.agents.iter_mut() {
            agent.reset(&mut self.ledger, &mut self.rng)?;
        }
        self.ledger.update(&self.agents)?;
        self.timestep = 0;
        Ok(())
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            city_key: self.city_key.clone(),
            timestep: self.timestep,
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            agents: self.agents.clone(),
            rng: self.rng.clone(),
        }
    }

    /// Expected number of agents per zone under each agent's
    /// time-averaged occupancy distribution
    pub fn average_occupancy(&self) -> Vec<f64> {
        let mut occupancy = vec![0.0; self.ledger.n()];
        for agent in &self.agents {
            for (total, p) in occupancy.iter_mut().zip(agent.average_probabilities()) {
                *total += p;
            }
        }
        occupancy
    }

    pub fn occupied_zones(&self) -> usize {
        (0..self.ledger.n())
            .filter(|&z| self.ledger.population(z) > 0)
            .count()
    }

    pub fn city_key(&self) -> &str {
        &self.city_key
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ZoneLedger {
        &self.ledger
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn timestep(&self) -> Timestep {
        self.timestep
    }
}
