//! Read-only projection of the ledger for reporting and calibration

use serde::{Deserialize, Serialize};

use crate::city::ledger::{Resident, ZoneLedger};
use crate::core::error::{Result, SimError};
use crate::core::types::ZoneIndex;

/// Per-zone record written next to every checkpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSummary {
    pub id: String,
    pub name: String,
    pub population: usize,
    /// Mean endowment of current inhabitants, 0 when empty
    pub avg_endowment: f64,
    /// Min-max scaled over inhabited zones with reference income;
    /// `None` for zones without reference data
    pub normalized_endowment: Option<f64>,
    pub expected_income: Option<f64>,
    pub special_district: bool,
    pub amenity_density: f64,
}

impl ZoneLedger {
    /// Mean endowment of the current inhabitants of `z`
    pub fn average_endowment<R: Resident>(&self, z: ZoneIndex, residents: &[R]) -> Result<f64> {
        let pop = self.population(z);
        if pop == 0 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for id in self.inhabitants(z) {
            total += residents
                .get(id.index())
                .map(Resident::endowment)
                .ok_or_else(|| SimError::InvalidInput(format!("{} is not in the agent arena", id)))?;
        }
        Ok(total / pop as f64)
    }

    /// Summaries for every zone
    pub fn get_data<R: Resident>(&self, residents: &[R]) -> Result<Vec<ZoneSummary>> {
        let averages = (0..self.n())
            .map(|z| self.average_endowment(z, residents))
            .collect::<Result<Vec<f64>>>()?;

        // Only inhabited zones with reference data take part in the scaling
        let scaled: Vec<f64> = (0..self.n())
            .filter(|&z| self.expected_income(z).is_some() && averages[z] != 0.0)
            .map(|z| averages[z])
            .collect();
        let min = scaled.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let summaries = self
            .zones()
            .iter()
            .enumerate()
            .map(|(z, zone)| {
                let normalized_endowment = self.expected_income(z).map(|_| {
                    if averages[z] == 0.0 || max <= min {
                        0.0
                    } else {
                        (averages[z] - min) / (max - min)
                    }
                });

                ZoneSummary {
                    id: zone.external_id.clone(),
                    name: zone.name.clone(),
                    population: self.population(z),
                    avg_endowment: averages[z],
                    normalized_endowment,
                    expected_income: self.expected_income(z),
                    special_district: zone.special_district,
                    amenity_density: self.amenity_density(z),
                }
            })
            .collect();

        Ok(summaries)
    }

    /// Total absolute gap between simulated and observed income.
    ///
    /// `None` when no zone carries reference income.
    pub fn calibration_error<R: Resident>(&self, residents: &[R]) -> Result<Option<f64>> {
        let summaries = self.get_data(residents)?;
        let gaps: Vec<f64> = summaries
            .iter()
            .filter_map(|s| Some((s.normalized_endowment? - s.expected_income?).abs()))
            .collect();

        Ok(if gaps.is_empty() {
            None
        } else {
            Some(gaps.iter().sum())
        })
    }
}
