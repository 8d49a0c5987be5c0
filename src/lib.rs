//! Neighborhood Change - residential relocation with learning agents
//!
//! Agents repeatedly choose among city zones with a multiplicative-weights
//! rule; the zone ledger aggregates population, community composition and
//! affordability each timestep and feeds them back into agents' costs.

pub mod agent;
pub mod city;
pub mod core;
pub mod data;
pub mod simulation;

pub use crate::agent::Agent;
pub use crate::city::{ZoneLedger, ZoneSummary};
pub use crate::core::{Result, SimError, SimulationConfig};
pub use crate::data::CityInputs;
pub use crate::simulation::{Checkpoint, Simulation, SimulationOutput};
