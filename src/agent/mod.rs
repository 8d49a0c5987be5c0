//! Learning agents and the relocation cost they learn from

pub mod cost;
pub mod learner;

pub use cost::{cost_vector, zone_cost, CostProfile, CostTerms};
pub use learner::Agent;
