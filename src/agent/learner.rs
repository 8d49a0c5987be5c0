//! Agent - a resident that learns where to live
//!
//! Each timestep has two phases separated by the ledger update:
//! `act` leaves the current zone and samples a new one from the agent's
//! probability vector, `learn` applies the multiplicative-weights update
//! `w[z] *= 1 - epsilon * cost(z)` against the freshly aggregated ledger.

use std::hash::{Hash, Hasher};

use ahash::AHashMap;
use rand::distributions::{Distribution, WeightedError, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::cost::{cost_vector, zone_cost, CostProfile};
use crate::city::ledger::{Resident, ZoneLedger};
use crate::core::config::{CostMode, RouteFallback};
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, ZoneIndex};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Economic capacity, fixed for the whole run
    endowment: f64,
    /// Community vs. accessibility weighting of the cost
    alpha: f64,
    zone: ZoneIndex,
    /// Zone occupied before the latest `act`
    prev_zone: ZoneIndex,
    weights: Vec<f64>,
    probabilities: Vec<f64>,
    /// Running sum of every learned probability vector
    cumulative: Vec<f64>,
    learn_steps: u64,
    /// Zones the agent is restricted to; empty means unrestricted
    routes: Vec<ZoneIndex>,
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Agent {}

impl Hash for Agent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Resident for Agent {
    fn endowment(&self) -> f64 {
        self.endowment
    }

    fn zone(&self) -> ZoneIndex {
        self.zone
    }
}

impl Agent {
    /// Create an agent and place it in a zone sampled from uniform weights
    pub fn new<R: Rng>(
        id: AgentId,
        endowment: f64,
        alpha: f64,
        ledger: &mut ZoneLedger,
        rng: &mut R,
    ) -> Result<Self> {
        let n = ledger.n();
        let mut agent = Self {
            id,
            endowment,
            alpha,
            zone: 0,
            prev_zone: 0,
            weights: vec![1.0; n],
            probabilities: vec![1.0 / n as f64; n],
            cumulative: vec![0.0; n],
            learn_steps: 0,
            routes: Vec::new(),
        };
        agent.reset(ledger, rng)?;
        Ok(agent)
    }

    /// Reinitialize weights to uniform and resample the current zone
    pub fn reset<R: Rng>(&mut self, ledger: &mut ZoneLedger, rng: &mut R) -> Result<()> {
        ledger.leave(self.id, self.zone);

        let n = ledger.n();
        self.weights = vec![1.0; n];
        self.probabilities = vec![1.0 / n as f64; n];
        self.cumulative = vec![0.0; n];
        self.learn_steps = 0;

        let dist = WeightedIndex::new(&self.probabilities)?;
        self.zone = dist.sample(rng);
        self.prev_zone = self.zone;
        ledger.join(self.id, self.zone);
        Ok(())
    }

    /// Restrict future choices to `routes`; an empty list lifts the restriction
    pub fn set_routes(&mut self, routes: Vec<ZoneIndex>) -> Result<()> {
        if let Some(&z) = routes.iter().find(|&&z| z >= self.weights.len()) {
            return Err(SimError::InvalidInput(format!(
                "route of {} references unknown zone {}",
                self.id, z
            )));
        }
        self.routes = routes;
        Ok(())
    }

    /// Check that restored state fits a city of `n` zones
    pub fn validate(&self, n: usize) -> Result<()> {
        let invalid = |what: String| Err(SimError::InvalidInput(format!("{}: {}", self.id, what)));

        for (name, len) in [
            ("weights", self.weights.len()),
            ("probabilities", self.probabilities.len()),
            ("cumulative probabilities", self.cumulative.len()),
        ] {
            if len != n {
                return invalid(format!("{} has {} entries for {} zones", name, len, n));
            }
        }
        if self.zone >= n || self.prev_zone >= n {
            return invalid(format!(
                "zone {} / previous zone {} outside 0..{}",
                self.zone, self.prev_zone, n
            ));
        }
        if let Some(&z) = self.routes.iter().find(|&&z| z >= n) {
            return invalid(format!("route references unknown zone {}", z));
        }
        if !self.endowment.is_finite() || !(0.0..=1.0).contains(&self.alpha) {
            return invalid(format!(
                "endowment {} / alpha {} out of range",
                self.endowment, self.alpha
            ));
        }
        if self.weights.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
            return invalid("weights must be positive and finite".into());
        }
        if self.probabilities.iter().chain(&self.cumulative).any(|p| !p.is_finite()) {
            return invalid("probabilities must be finite".into());
        }
        Ok(())
    }

    /// Pick this agent's routes out of an agent id -> zones table
    pub fn assign_routes(&mut self, table: &AHashMap<u32, Vec<ZoneIndex>>) -> Result<()> {
        self.set_routes(table.get(&self.id.0).cloned().unwrap_or_default())
    }

    /// Move to a zone sampled from the current probability vector.
    ///
    /// Exactly one membership change happens in the ledger; the inhabitant
    /// total is unchanged when this returns.
    pub fn act<R: Rng>(
        &mut self,
        ledger: &mut ZoneLedger,
        rng: &mut R,
        fallback: RouteFallback,
    ) -> Result<()> {
        let next = self.sample_zone(rng, fallback)?;

        self.prev_zone = self.zone;
        ledger.leave(self.id, self.zone);
        self.zone = next;
        ledger.join(self.id, self.zone);
        Ok(())
    }

    fn sample_zone<R: Rng>(&self, rng: &mut R, fallback: RouteFallback) -> Result<ZoneIndex> {
        if !self.routes.is_empty() {
            let restricted = self.routes.iter().map(|&z| self.probabilities[z]);
            match WeightedIndex::new(restricted) {
                Ok(dist) => return Ok(self.routes[dist.sample(rng)]),
                Err(WeightedError::AllWeightsZero) => match fallback {
                    RouteFallback::Unrestricted => {
                        tracing::warn!(agent = %self.id, "route has no probability mass, sampling unrestricted");
                    }
                    RouteFallback::Fail => {
                        return Err(SimError::EmptyRouteMass { agent: self.id });
                    }
                },
                Err(e) => return Err(e.into()),
            }
        }

        let dist = WeightedIndex::new(&self.probabilities)?;
        Ok(dist.sample(rng))
    }

    /// Apply one multiplicative-weights step against the updated ledger
    pub fn learn(&mut self, ledger: &ZoneLedger, epsilon: f64, mode: CostMode) -> Result<()> {
        let profile = self.cost_profile();

        match mode {
            CostMode::Vector => {
                for (weight, cost) in self.weights.iter_mut().zip(cost_vector(&profile, ledger)) {
                    *weight *= 1.0 - epsilon * cost;
                }
            }
            CostMode::Scalar => {
                let z = self.zone;
                self.weights[z] *= 1.0 - epsilon * zone_cost(&profile, ledger, z);
            }
        }

        let sum: f64 = self.weights.iter().sum();
        if !(sum > 0.0 && sum.is_finite()) {
            return Err(SimError::DegenerateWeights { agent: self.id, sum });
        }

        for (p, w) in self.probabilities.iter_mut().zip(&self.weights) {
            *p = w / sum;
        }
        for (c, p) in self.cumulative.iter_mut().zip(&self.probabilities) {
            *c += p;
        }
        self.learn_steps += 1;
        Ok(())
    }

    pub fn cost_profile(&self) -> CostProfile {
        CostProfile {
            endowment: self.endowment,
            alpha: self.alpha,
            origin: self.prev_zone,
        }
    }

    pub fn endowment(&self) -> f64 {
        self.endowment
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn zone(&self) -> ZoneIndex {
        self.zone
    }

    pub fn prev_zone(&self) -> ZoneIndex {
        self.prev_zone
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    pub fn cumulative_probabilities(&self) -> &[f64] {
        &self.cumulative
    }

    pub fn learn_steps(&self) -> u64 {
        self.learn_steps
    }

    pub fn routes(&self) -> &[ZoneIndex] {
        &self.routes
    }

    /// Time-averaged occupancy distribution; the current one before any step
    pub fn average_probabilities(&self) -> Vec<f64> {
        if self.learn_steps == 0 {
            return self.probabilities.clone();
        }
        let steps = self.learn_steps as f64;
        self.cumulative.iter().map(|c| c / steps).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::inputs::{CityInputs, ZoneRecord};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn city(n: usize) -> ZoneLedger {
        let zones = (0..n)
            .map(|i| ZoneRecord {
                lon: i as f64,
                lat: 0.0,
                name: format!("Zone {}", i),
                special_district: true,
                external_id: format!("{}", i),
            })
            .collect();
        let distances = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 0.0 } else { 0.5 }).collect())
            .collect();
        let inputs = CityInputs {
            zones,
            distances,
            amenity_density: vec![0.2; n],
            expected_income: Default::default(),
            empirical_income: None,
            routes: Default::default(),
        };
        ZoneLedger::new(&inputs, 2).unwrap()
    }

    fn spawn(n_agents: u32, ledger: &mut ZoneLedger, rng: &mut ChaCha8Rng) -> Vec<Agent> {
        (0..n_agents)
            .map(|i| Agent::new(AgentId(i), 0.1 * (i + 1) as f64, 0.5, ledger, rng).unwrap())
            .collect()
    }

    #[test]
    fn test_new_agent_is_placed_with_uniform_probabilities() {
        let mut ledger = city(4);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let agent = Agent::new(AgentId(0), 0.5, 0.5, &mut ledger, &mut rng).unwrap();

        assert!(ledger.contains(agent.id, agent.zone()));
        assert_eq!(ledger.total_population(), 1);
        assert!(agent.probabilities().iter().all(|&p| p == 0.25));
        assert!(agent.weights().iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_act_changes_exactly_one_membership() {
        let mut ledger = city(5);
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut agents = spawn(6, &mut ledger, &mut rng);

        for _ in 0..20 {
            for agent in agents.iter_mut() {
                let before = agent.zone();
                agent
                    .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
                    .unwrap();
                assert_eq!(agent.prev_zone(), before);
                assert!(ledger.contains(agent.id, agent.zone()));
                assert_eq!(ledger.total_population(), 6);
            }
        }
    }

    #[test]
    fn test_act_respects_routes() {
        let mut ledger = city(6);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut agent = Agent::new(AgentId(0), 0.5, 0.5, &mut ledger, &mut rng).unwrap();
        agent.set_routes(vec![1, 4]).unwrap();

        for _ in 0..50 {
            agent
                .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
                .unwrap();
            assert!(agent.zone() == 1 || agent.zone() == 4);
        }
    }

    #[test]
    fn test_assign_routes_from_table() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut agents = spawn(2, &mut ledger, &mut rng);
        let mut table = AHashMap::new();
        table.insert(1u32, vec![2]);

        agents[0].assign_routes(&table).unwrap();
        agents[1].assign_routes(&table).unwrap();
        assert!(agents[0].routes().is_empty());
        assert_eq!(agents[1].routes(), &[2]);
    }

    #[test]
    fn test_rejects_route_to_unknown_zone() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut agent = Agent::new(AgentId(0), 0.5, 0.5, &mut ledger, &mut rng).unwrap();
        assert!(matches!(
            agent.set_routes(vec![0, 3]),
            Err(SimError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_route_mass_falls_back() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut agent = Agent::new(AgentId(0), 0.5, 0.5, &mut ledger, &mut rng).unwrap();
        agent.set_routes(vec![0]).unwrap();
        agent.probabilities = vec![0.0, 0.5, 0.5];

        agent
            .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
            .unwrap();
        assert_ne!(agent.zone(), 0);
    }

    #[test]
    fn test_empty_route_mass_fails_when_configured() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut agent = Agent::new(AgentId(0), 0.5, 0.5, &mut ledger, &mut rng).unwrap();
        let home = agent.zone();
        agent.set_routes(vec![0]).unwrap();
        agent.probabilities = vec![0.0, 0.5, 0.5];

        let result = agent.act(&mut ledger, &mut rng, RouteFallback::Fail);
        assert!(matches!(result, Err(SimError::EmptyRouteMass { .. })));
        // A failed act leaves the membership untouched
        assert!(ledger.contains(agent.id, home));
    }

    #[test]
    fn test_learn_keeps_distribution_normalized() {
        let mut ledger = city(4);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut agents = spawn(5, &mut ledger, &mut rng);

        for _ in 0..30 {
            for agent in agents.iter_mut() {
                agent
                    .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
                    .unwrap();
            }
            ledger.update(&agents).unwrap();
            for agent in agents.iter_mut() {
                let before = agent.weights().to_vec();
                agent.learn(&ledger, 1e-2, CostMode::Vector).unwrap();
                let sum: f64 = agent.probabilities().iter().sum();
                assert!((sum - 1.0).abs() < 1e-9);
                assert!(agent
                    .weights()
                    .iter()
                    .zip(&before)
                    .all(|(after, before)| after <= before && *after > 0.0));
            }
        }
        assert_eq!(agents[0].learn_steps(), 30);
    }

    #[test]
    fn test_scalar_mode_updates_only_chosen_zone() {
        let mut ledger = city(4);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut agents = spawn(1, &mut ledger, &mut rng);
        // Zone 3 stays empty, so its cost is 1 wherever the agent lands
        agents[0].set_routes(vec![0, 1, 2]).unwrap();
        agents[0]
            .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
            .unwrap();
        ledger.update(&agents).unwrap();
        agents[0].learn(&ledger, 0.1, CostMode::Scalar).unwrap();

        let chosen = agents[0].zone();
        for (z, &w) in agents[0].weights().iter().enumerate() {
            if z != chosen {
                assert_eq!(w, 1.0);
            }
        }
        assert_eq!(agents[0].weights()[3], 1.0);
    }

    #[test]
    fn test_validate_accepts_fresh_agent() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let agents = spawn(2, &mut ledger, &mut rng);
        assert!(agents.iter().all(|a| a.validate(3).is_ok()));
        assert!(agents[0].validate(4).is_err());
    }

    #[test]
    fn test_validate_rejects_restored_state_that_does_not_fit() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let agent = spawn(1, &mut ledger, &mut rng).remove(0);

        let mut bad_route = agent.clone();
        bad_route.routes = vec![7];
        assert!(matches!(bad_route.validate(3), Err(SimError::InvalidInput(_))));

        let mut short = agent.clone();
        short.weights = vec![1.0];
        short.probabilities = vec![1.0];
        assert!(matches!(short.validate(3), Err(SimError::InvalidInput(_))));

        let mut misplaced = agent.clone();
        misplaced.prev_zone = 3;
        assert!(misplaced.validate(3).is_err());

        let mut zero = agent;
        zero.weights[1] = 0.0;
        assert!(zero.validate(3).is_err());
    }

    #[test]
    fn test_degenerate_weights_are_fatal() {
        let mut ledger = city(2);
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let mut agents = spawn(1, &mut ledger, &mut rng);
        ledger.update(&agents).unwrap();
        agents[0].weights = vec![0.0, 0.0];

        let result = agents[0].learn(&ledger, 1e-3, CostMode::Vector);
        assert!(matches!(result, Err(SimError::DegenerateWeights { .. })));
    }

    #[test]
    fn test_average_probabilities() {
        let mut ledger = city(2);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut agents = spawn(1, &mut ledger, &mut rng);
        assert_eq!(agents[0].average_probabilities(), vec![0.5, 0.5]);

        for _ in 0..10 {
            agents[0]
                .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
                .unwrap();
            ledger.update(&agents).unwrap();
            agents[0].learn(&ledger, 1e-2, CostMode::Vector).unwrap();
        }
        let average = agents[0].average_probabilities();
        assert!((average.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(agents[0].cumulative_probabilities().len(), 2);
    }

    #[test]
    fn test_reset_restores_uniform_weights() {
        let mut ledger = city(3);
        let mut rng = ChaCha8Rng::seed_from_u64(12);
        let mut agents = spawn(2, &mut ledger, &mut rng);
        for _ in 0..5 {
            for agent in agents.iter_mut() {
                agent
                    .act(&mut ledger, &mut rng, RouteFallback::Unrestricted)
                    .unwrap();
            }
            ledger.update(&agents).unwrap();
            for agent in agents.iter_mut() {
                agent.learn(&ledger, 0.1, CostMode::Vector).unwrap();
            }
        }

        agents[0].reset(&mut ledger, &mut rng).unwrap();
        assert!(agents[0].weights().iter().all(|&w| w == 1.0));
        assert!(agents[0]
            .probabilities()
            .iter()
            .all(|&p| (p - 1.0 / 3.0).abs() < 1e-12));
        assert_eq!(agents[0].learn_steps(), 0);
        assert!(ledger.contains(agents[0].id, agents[0].zone()));
        assert_eq!(ledger.total_population(), 2);
    }

    #[test]
    fn test_equality_is_by_identity() {
        let mut ledger = city(2);
        let mut rng = ChaCha8Rng::seed_from_u64(13);
        let a = Agent::new(AgentId(3), 0.1, 0.5, &mut ledger, &mut rng).unwrap();
        let mut b = a.clone();
        b.endowment = 0.9;
        assert_eq!(a, b);

        let c = Agent::new(AgentId(4), 0.1, 0.5, &mut ledger, &mut rng).unwrap();
        assert_ne!(a, c);
    }
}
