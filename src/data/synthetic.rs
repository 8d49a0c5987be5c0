//! Deterministic synthetic cities for demos, benchmarks and tests

use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::core::error::{Result, SimError};
use crate::data::inputs::{normalize_distances, CityInputs, EmpiricalIncome, ZoneRecord};

/// Fraction of synthetic zones flagged as inside the special district
const SPECIAL_DISTRICT_SHARE: f64 = 0.7;

impl CityInputs {
    /// Generate a random city of `n_zones` zones on the unit square.
    ///
    /// Distances are straight-line and normalized; amenity densities, the
    /// special-district flag and expected incomes are drawn uniformly.
    pub fn synthetic(n_zones: usize, seed: u64) -> Result<Self> {
        if n_zones == 0 {
            return Err(SimError::InvalidInput(
                "a synthetic city needs at least one zone".into(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let points: Vec<(f64, f64)> = (0..n_zones).map(|_| (rng.gen(), rng.gen())).collect();

        let raw: Vec<Vec<f64>> = points
            .iter()
            .map(|&(ax, ay)| {
                points
                    .iter()
                    .map(|&(bx, by)| ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
                    .collect()
            })
            .collect();
        let distances = normalize_distances(&raw)?;

        let zones: Vec<ZoneRecord> = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| ZoneRecord {
                lon: x,
                lat: y,
                name: format!("Zone {}", i),
                special_district: rng.gen_bool(SPECIAL_DISTRICT_SHARE),
                external_id: format!("Z{:04}", i),
            })
            .collect();

        let mut amenity_density: Vec<f64> = (0..n_zones).map(|_| rng.gen()).collect();
        let max = amenity_density.iter().copied().fold(0.0_f64, f64::max);
        if max > 0.0 {
            amenity_density.iter_mut().for_each(|d| *d /= max);
        }

        let expected_income: AHashMap<String, f64> = zones
            .iter()
            .map(|z| (z.external_id.clone(), rng.gen::<f64>()))
            .collect();

        let empirical_income = EmpiricalIncome {
            incomes: (0..n_zones).map(|_| rng.gen_range(20_000.0..150_000.0)).collect(),
            populations: (0..n_zones).map(|_| rng.gen_range(500.0..5_000.0)).collect(),
        };

        Ok(Self {
            zones,
            distances,
            amenity_density,
            expected_income,
            empirical_income: Some(empirical_income),
            routes: AHashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_city_shape() {
        let inputs = CityInputs::synthetic(6, 42).unwrap();
        assert_eq!(inputs.zone_count(), 6);
        assert_eq!(inputs.distances.len(), 6);
        assert!(inputs.distances.iter().all(|row| row.len() == 6));
        assert_eq!(inputs.amenity_density.len(), 6);
        assert_eq!(inputs.expected_income.len(), 6);
    }

    #[test]
    fn test_synthetic_distances_normalized_and_symmetric() {
        let inputs = CityInputs::synthetic(8, 7).unwrap();
        let max = inputs
            .distances
            .iter()
            .flatten()
            .copied()
            .fold(0.0_f64, f64::max);
        assert!((max - 1.0).abs() < 1e-12);
        for i in 0..8 {
            assert_eq!(inputs.distances[i][i], 0.0);
            for j in 0..8 {
                assert_eq!(inputs.distances[i][j], inputs.distances[j][i]);
            }
        }
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let a = CityInputs::synthetic(5, 99).unwrap();
        let b = CityInputs::synthetic(5, 99).unwrap();
        assert_eq!(a.zones, b.zones);
        assert_eq!(a.distances, b.distances);
    }

    #[test]
    fn test_synthetic_rejects_empty_city() {
        assert!(CityInputs::synthetic(0, 1).is_err());
    }
}
