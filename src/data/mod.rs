//! External inputs consumed by the simulation core
//!
//! Zone lists, distance matrices and amenity densities are produced by
//! upstream tooling; this module only loads and normalizes them.

pub mod inputs;
pub mod synthetic;

pub use inputs::{amenity_densities, normalize_distances, CityInputs, EmpiricalIncome, ZoneRecord};
