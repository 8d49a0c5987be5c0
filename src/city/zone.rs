//! Zone - a residential location agents can occupy

use serde::{Deserialize, Serialize};

use crate::core::types::ZoneIndex;
use crate::data::inputs::ZoneRecord;

/// Static zone attributes, immutable once the ledger is built
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub index: ZoneIndex,
    pub lon: f64,
    pub lat: f64,
    pub name: String,
    /// Inside the privileged subset of zones (e.g. a transit corridor)
    pub special_district: bool,
    pub external_id: String,
}

impl Zone {
    pub fn from_record(index: ZoneIndex, record: &ZoneRecord) -> Self {
        Self {
            index,
            lon: record.lon,
            lat: record.lat,
            name: record.name.clone(),
            special_district: record.special_district,
            external_id: record.external_id.clone(),
        }
    }
}
