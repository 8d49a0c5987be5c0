use thiserror::Error;

use crate::core::types::AgentId;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    #[error("Degenerate weight vector for {agent}: sum = {sum}")]
    DegenerateWeights { agent: AgentId, sum: f64 },

    #[error("Route constraint for {agent} carries no probability mass")]
    EmptyRouteMass { agent: AgentId },

    #[error("Sampling error: {0}")]
    Sampling(#[from] rand::distributions::WeightedError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
