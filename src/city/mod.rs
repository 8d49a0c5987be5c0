//! City layer - zones and the per-timestep zone ledger

pub mod ledger;
pub mod report;
pub mod zone;

pub use ledger::{admission_threshold, Resident, ZoneLedger};
pub use report::ZoneSummary;
pub use zone::Zone;
