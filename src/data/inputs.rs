//! City inputs and the numeric normalization applied to raw ETL output

use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};
use crate::core::types::ZoneIndex;

/// Static description of one zone as delivered by upstream tooling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub lon: f64,
    pub lat: f64,
    pub name: String,
    #[serde(default)]
    pub special_district: bool,
    pub external_id: String,
}

/// Census-style income table used to draw empirical endowments
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalIncome {
    pub incomes: Vec<f64>,
    pub populations: Vec<f64>,
}

impl EmpiricalIncome {
    /// Incomes normalized by their maximum, paired with population weights.
    ///
    /// Rows with a non-finite or non-positive income or population are dropped.
    pub fn normalized(&self) -> Result<(Vec<f64>, Vec<f64>)> {
        if self.incomes.len() != self.populations.len() {
            return Err(SimError::InvalidInput(format!(
                "empirical income has {} incomes but {} populations",
                self.incomes.len(),
                self.populations.len()
            )));
        }

        let (incomes, populations): (Vec<f64>, Vec<f64>) = self
            .incomes
            .iter()
            .zip(&self.populations)
            .filter(|(i, p)| i.is_finite() && p.is_finite() && **i > 0.0 && **p > 0.0)
            .map(|(&i, &p)| (i, p))
            .unzip();

        let max_income = incomes.iter().copied().fold(0.0_f64, f64::max);
        if incomes.is_empty() || max_income <= 0.0 {
            return Err(SimError::InvalidInput(
                "empirical income table has no usable rows".into(),
            ));
        }

        Ok((incomes.iter().map(|i| i / max_income).collect(), populations))
    }
}

/// Everything the core needs from the outside world
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CityInputs {
    pub zones: Vec<ZoneRecord>,
    /// Symmetric n x n matrix normalized to [0, 1]
    pub distances: Vec<Vec<f64>>,
    /// Per-zone amenity density normalized to [0, 1]
    pub amenity_density: Vec<f64>,
    /// External id -> observed income, used only for calibration
    #[serde(default)]
    pub expected_income: AHashMap<String, f64>,
    #[serde(default)]
    pub empirical_income: Option<EmpiricalIncome>,
    /// Agent id -> zones the agent may choose among
    #[serde(default)]
    pub routes: AHashMap<u32, Vec<ZoneIndex>>,
}

impl CityInputs {
    /// Load inputs from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }
}

/// Normalize a raw network-distance matrix into [0, 1].
///
/// Infinite entries (disconnected pairs) take the maximum finite distance
/// before the matrix is divided by its maximum.
pub fn normalize_distances(raw: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    if raw.iter().flatten().any(|d| d.is_nan()) {
        return Err(SimError::InvalidInput("distance matrix contains NaN".into()));
    }

    let finite_max = raw
        .iter()
        .flatten()
        .copied()
        .filter(|d| d.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !finite_max.is_finite() {
        return Err(SimError::InvalidInput(
            "distance matrix has no finite entries".into(),
        ));
    }

    let mut matrix: Vec<Vec<f64>> = raw
        .iter()
        .map(|row| {
            row.iter()
                .map(|&d| if d.is_infinite() { finite_max } else { d })
                .collect()
        })
        .collect();

    if finite_max > 0.0 {
        for d in matrix.iter_mut().flatten() {
            *d /= finite_max;
        }
    }

    Ok(matrix)
}

/// Amenity counts per unit area, normalized by the densest zone
pub fn amenity_densities(counts: &[f64], areas: &[f64]) -> Result<Vec<f64>> {
    if counts.len() != areas.len() {
        return Err(SimError::InvalidInput(format!(
            "{} amenity counts for {} zone areas",
            counts.len(),
            areas.len()
        )));
    }

    let mut density: Vec<f64> = counts
        .iter()
        .zip(areas)
        .map(|(&count, &area)| if area > 0.0 { count / area } else { 0.0 })
        .collect();

    let max = density.iter().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for d in density.iter_mut() {
            *d /= max;
        }
    }

    Ok(density)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_distances_scales_by_max() {
        let raw = vec![vec![0.0, 2.0], vec![2.0, 0.0]];
        let matrix = normalize_distances(&raw).unwrap();
        assert_eq!(matrix, vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_normalize_distances_caps_disconnected_pairs() {
        let raw = vec![
            vec![0.0, 4.0, f64::INFINITY],
            vec![4.0, 0.0, 2.0],
            vec![f64::INFINITY, 2.0, 0.0],
        ];
        let matrix = normalize_distances(&raw).unwrap();
        assert_eq!(matrix[0][2], 1.0);
        assert_eq!(matrix[1][2], 0.5);
    }

    #[test]
    fn test_normalize_distances_rejects_nan() {
        let raw = vec![vec![0.0, f64::NAN], vec![f64::NAN, 0.0]];
        assert!(matches!(
            normalize_distances(&raw),
            Err(SimError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_amenity_densities() {
        let density = amenity_densities(&[10.0, 5.0, 3.0], &[1.0, 1.0, 0.0]).unwrap();
        assert_eq!(density, vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_amenity_densities_length_mismatch() {
        assert!(amenity_densities(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_empirical_income_drops_invalid_rows() {
        let table = EmpiricalIncome {
            incomes: vec![50_000.0, f64::NAN, 100_000.0, 20_000.0],
            populations: vec![10.0, 5.0, 30.0, 0.0],
        };
        let (incomes, populations) = table.normalized().unwrap();
        assert_eq!(incomes, vec![0.5, 1.0]);
        assert_eq!(populations, vec![10.0, 30.0]);
    }

    #[test]
    fn test_empirical_income_without_rows() {
        let table = EmpiricalIncome::default();
        assert!(table.normalized().is_err());
    }

    #[test]
    fn test_inputs_json_defaults() {
        let json = r#"{
            "zones": [{"lon": -84.3, "lat": 33.7, "name": "Midtown", "external_id": "13121"}],
            "distances": [[0.0]],
            "amenity_density": [1.0]
        }"#;
        let inputs: CityInputs = serde_json::from_str(json).unwrap();
        assert_eq!(inputs.zone_count(), 1);
        assert!(!inputs.zones[0].special_district);
        assert!(inputs.routes.is_empty());
        assert!(inputs.empirical_income.is_none());
    }
}
