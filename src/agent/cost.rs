//! Relocation cost
//!
//! `cost(z) = 1 - affordability * upkeep * special_district * location
//!            * community * accessibility`
//!
//! Every factor lies in [0, 1], so the cost does too. The location factor is
//! `1 - distance(origin, z)`: shorter moves are cheaper, the same closeness
//! convention the ledger uses to weight its community score.

use crate::city::ledger::ZoneLedger;
use crate::core::types::ZoneIndex;

/// The parts of an agent's state the cost depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostProfile {
    pub endowment: f64,
    pub alpha: f64,
    /// Zone the agent occupied before its latest move
    pub origin: ZoneIndex,
}

/// The individual multiplicands of the cost of one zone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostTerms {
    pub affordability: f64,
    pub upkeep: f64,
    pub special_district: f64,
    pub location: f64,
    pub community: f64,
    pub accessibility: f64,
}

impl CostTerms {
    /// Evaluate every term for zone `z` against the post-update ledger
    pub fn evaluate(profile: &CostProfile, ledger: &ZoneLedger, z: ZoneIndex) -> Self {
        let indicator = |flag: bool| if flag { 1.0 } else { 0.0 };

        Self {
            affordability: indicator(profile.endowment >= ledger.threshold(z)),
            upkeep: indicator(ledger.upkeep(z)),
            special_district: indicator(ledger.special_district(z)),
            location: 1.0 - ledger.distance(profile.origin, z),
            community: (-profile.alpha * (profile.endowment - ledger.community_score(z)).abs())
                .exp(),
            accessibility: (-(1.0 - profile.alpha) * ledger.amenity_density(z)).exp(),
        }
    }

    pub fn product(&self) -> f64 {
        self.affordability
            * self.upkeep
            * self.special_district
            * self.location
            * self.community
            * self.accessibility
    }

    pub fn cost(&self) -> f64 {
        1.0 - self.product()
    }
}

/// Cost of zone `z`
pub fn zone_cost(profile: &CostProfile, ledger: &ZoneLedger, z: ZoneIndex) -> f64 {
    CostTerms::evaluate(profile, ledger, z).cost()
}

/// Cost of every zone, in zone order
pub fn cost_vector(profile: &CostProfile, ledger: &ZoneLedger) -> Vec<f64> {
    (0..ledger.n()).map(|z| zone_cost(profile, ledger, z)).collect()
}
