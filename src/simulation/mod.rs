//! Simulation driver
//!
//! Builds agents and the zone ledger from a configuration and city inputs,
//! runs the act / update / learn loop, and captures checkpoints at
//! benchmark timesteps.

pub mod checkpoint;
pub mod driver;
pub mod endowment;
pub mod output;
pub mod sweep;

pub use checkpoint::{Checkpoint, CheckpointSink, JsonDirectorySink, NullSink};
pub use driver::Simulation;
pub use endowment::{draw_endowments, empirical_endowments, lorenz_endowments};
pub use output::{SimulationOutput, SimulationStats};
pub use sweep::{best_fit, run_sweep, run_sweep_in_memory, run_sweep_with, SweepResult};
