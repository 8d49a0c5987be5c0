//! ZoneLedger - the city's per-zone aggregate state
//!
//! The ledger owns the static zone attributes, the pairwise distance matrix
//! and amenity densities, plus the live inhabitant sets. Once per timestep
//! `update` recomputes population, endowment threshold, upkeep and community
//! score for every zone from the current inhabitant sets.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::city::zone::Zone;
use crate::core::error::{Result, SimError};
use crate::core::types::{AgentId, ZoneIndex};
use crate::data::inputs::CityInputs;

/// Tolerance for the symmetry check on the distance matrix
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// What the ledger needs to know about an inhabitant
pub trait Resident {
    fn endowment(&self) -> f64;
    fn zone(&self) -> ZoneIndex;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneLedger {
    /// Zone capacity
    rho: usize,
    zones: Vec<Zone>,
    /// Row-major n x n normalized distances
    distances: Vec<f64>,
    amenity_density: Vec<f64>,
    /// Observed income per zone, resolved from the external id
    expected_income: Vec<Option<f64>>,

    // Live state
    inhabitants: Vec<BTreeSet<AgentId>>,
    thresholds: Vec<f64>,
    community: Vec<f64>,
    upkeep: Vec<bool>,
    population_history: Vec<Vec<usize>>,
    community_history: Vec<Vec<f64>>,
}

impl ZoneLedger {
    /// Build a ledger, validating every upstream input once
    pub fn new(inputs: &CityInputs, rho: usize) -> Result<Self> {
        let n = inputs.zones.len();
        if n == 0 {
            return Err(SimError::InvalidInput("zone list is empty".into()));
        }
        if rho == 0 {
            return Err(SimError::InvalidConfig("rho must be positive".into()));
        }

        if inputs.distances.len() != n || inputs.distances.iter().any(|row| row.len() != n) {
            return Err(SimError::InvalidInput(format!(
                "distance matrix must be {}x{}",
                n, n
            )));
        }
        for (i, row) in inputs.distances.iter().enumerate() {
            for (j, &d) in row.iter().enumerate() {
                if !d.is_finite() || !(0.0..=1.0).contains(&d) {
                    return Err(SimError::InvalidInput(format!(
                        "distance[{}][{}] = {} is not a normalized finite value",
                        i, j, d
                    )));
                }
                if (d - inputs.distances[j][i]).abs() > SYMMETRY_TOLERANCE {
                    return Err(SimError::InvalidInput(format!(
                        "distance matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
            if row[i] != 0.0 {
                return Err(SimError::InvalidInput(format!(
                    "distance[{}][{}] must be zero",
                    i, i
                )));
            }
        }

        if inputs.amenity_density.len() != n {
            return Err(SimError::InvalidInput(format!(
                "{} amenity densities for {} zones",
                inputs.amenity_density.len(),
                n
            )));
        }
        if let Some((i, d)) = inputs
            .amenity_density
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || !(0.0..=1.0).contains(*d))
        {
            return Err(SimError::InvalidInput(format!(
                "amenity density of zone {} ({}) is outside [0, 1]",
                i, d
            )));
        }

        let zones: Vec<Zone> = inputs
            .zones
            .iter()
            .enumerate()
            .map(|(i, record)| Zone::from_record(i, record))
            .collect();

        let expected_income = zones
            .iter()
            .map(|z| {
                inputs
                    .expected_income
                    .get(&z.external_id)
                    .copied()
                    .filter(|income| income.is_finite())
            })
            .collect();

        Ok(Self {
            rho,
            zones,
            distances: inputs.distances.iter().flatten().copied().collect(),
            amenity_density: inputs.amenity_density.clone(),
            expected_income,
            inhabitants: vec![BTreeSet::new(); n],
            thresholds: vec![0.0; n],
            community: vec![0.0; n],
            upkeep: vec![false; n],
            population_history: vec![Vec::new(); n],
            community_history: vec![Vec::new(); n],
        })
    }

    /// Check that every per-zone table matches the zone count.
    ///
    /// Construction guarantees this; deserialized ledgers must be checked.
    pub fn validate(&self) -> Result<()> {
        let n = self.n();
        if n == 0 {
            return Err(SimError::InvalidInput("ledger has no zones".into()));
        }
        if self.rho == 0 {
            return Err(SimError::InvalidInput("ledger rho must be positive".into()));
        }
        if self.distances.len() != n * n {
            return Err(SimError::InvalidInput(format!(
                "ledger holds {} distances for {} zones",
                self.distances.len(),
                n
            )));
        }
        if self.distances.iter().any(|d| !d.is_finite() || !(0.0..=1.0).contains(d)) {
            return Err(SimError::InvalidInput(
                "ledger distances must be normalized finite values".into(),
            ));
        }

        let lengths = [
            ("amenity densities", self.amenity_density.len()),
            ("expected incomes", self.expected_income.len()),
            ("inhabitant sets", self.inhabitants.len()),
            ("thresholds", self.thresholds.len()),
            ("community scores", self.community.len()),
            ("upkeep flags", self.upkeep.len()),
            ("population histories", self.population_history.len()),
            ("community histories", self.community_history.len()),
        ];
        if let Some((name, len)) = lengths.iter().find(|(_, len)| *len != n) {
            return Err(SimError::InvalidInput(format!(
                "ledger holds {} {} for {} zones",
                len, name, n
            )));
        }
        Ok(())
    }

    /// Number of zones
    pub fn n(&self) -> usize {
        self.zones.len()
    }

    pub fn rho(&self) -> usize {
        self.rho
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, z: ZoneIndex) -> Option<&Zone> {
        self.zones.get(z)
    }

    /// Register an agent as inhabitant of zone `z`
    pub fn join(&mut self, agent: AgentId, z: ZoneIndex) -> bool {
        self.inhabitants[z].insert(agent)
    }

    /// Remove an agent from zone `z`; false if it was not there
    pub fn leave(&mut self, agent: AgentId, z: ZoneIndex) -> bool {
        self.inhabitants[z].remove(&agent)
    }

    pub fn contains(&self, agent: AgentId, z: ZoneIndex) -> bool {
        self.inhabitants[z].contains(&agent)
    }

    pub fn inhabitants(&self, z: ZoneIndex) -> impl Iterator<Item = AgentId> + '_ {
        self.inhabitants[z].iter().copied()
    }

    pub fn population(&self, z: ZoneIndex) -> usize {
        self.inhabitants[z].len()
    }

    pub fn total_population(&self) -> usize {
        self.inhabitants.iter().map(BTreeSet::len).sum()
    }

    pub fn distance(&self, from: ZoneIndex, to: ZoneIndex) -> f64 {
        self.distances[from * self.n() + to]
    }

    pub fn amenity_density(&self, z: ZoneIndex) -> f64 {
        self.amenity_density[z]
    }

    pub fn expected_income(&self, z: ZoneIndex) -> Option<f64> {
        self.expected_income[z]
    }

    /// Endowment required to be admitted to zone `z`
    pub fn threshold(&self, z: ZoneIndex) -> f64 {
        self.thresholds[z]
    }

    pub fn upkeep(&self, z: ZoneIndex) -> bool {
        self.upkeep[z]
    }

    pub fn community_score(&self, z: ZoneIndex) -> f64 {
        self.community[z]
    }

    pub fn special_district(&self, z: ZoneIndex) -> bool {
        self.zones[z].special_district
    }

    pub fn population_history(&self, z: ZoneIndex) -> &[usize] {
        &self.population_history[z]
    }

    pub fn community_history(&self, z: ZoneIndex) -> &[f64] {
        &self.community_history[z]
    }

    /// Recompute every zone's aggregates from its current inhabitants.
    ///
    /// Must run exactly once per timestep, after all agents acted and
    /// before any agent learns. `residents` is the agent arena indexed by
    /// `AgentId`.
    pub fn update<R: Resident>(&mut self, residents: &[R]) -> Result<()> {
        for z in 0..self.n() {
            let pop = self.inhabitants[z].len();
            self.population_history[z].push(pop);

            let community = if pop == 0 {
                self.thresholds[z] = 0.0;
                self.upkeep[z] = false;
                0.0
            } else {
                let mut endowments = Vec::with_capacity(pop);
                let mut weighted = 0.0;
                let mut total_weight = 0.0;

                for id in &self.inhabitants[z] {
                    let resident = residents.get(id.index()).ok_or_else(|| {
                        SimError::InvalidInput(format!("{} is not in the agent arena", id))
                    })?;
                    let endowment = resident.endowment();
                    // Closer inhabitants count more; weight vanishes at distance 1
                    let weight = (1.0 - self.distance(z, resident.zone())).powi(2);
                    weighted += weight * endowment;
                    total_weight += weight;
                    endowments.push(endowment);
                }

                self.thresholds[z] = admission_threshold(&mut endowments, self.rho);
                self.upkeep[z] = true;

                if total_weight > 0.0 {
                    weighted / total_weight
                } else {
                    endowments.iter().sum::<f64>() / pop as f64
                }
            };

            self.community[z] = community;
            self.community_history[z].push(community);
        }

        Ok(())
    }

    /// Clear all live state and history, keeping the static attributes
    pub fn reset(&mut self) {
        let n = self.n();
        self.inhabitants = vec![BTreeSet::new(); n];
        self.thresholds = vec![0.0; n];
        self.community = vec![0.0; n];
        self.upkeep = vec![false; n];
        self.population_history = vec![Vec::new(); n];
        self.community_history = vec![Vec::new(); n];
    }
}

/// The `rho`-th largest endowment, or 0 while the zone is below capacity.
///
/// Uses selection rather than a full sort; ties resolve in selection order.
pub fn admission_threshold(endowments: &mut [f64], rho: usize) -> f64 {
    if rho == 0 || endowments.len() < rho {
        return 0.0;
    }
    let (_, nth, _) = endowments.select_nth_unstable_by_key(rho - 1, |e| Reverse(OrderedFloat(*e)));
    *nth
}
