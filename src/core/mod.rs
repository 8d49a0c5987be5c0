pub mod config;
pub mod error;
pub mod types;

pub use config::{
    CostMode, EndowmentSource, ExperimentConfig, RouteFallback, SimulationConfig,
};
pub use error::{Result, SimError};
pub use types::{AgentId, Timestep, ZoneIndex};
