//! Endowment distributions
//!
//! Agents receive a fixed endowment at creation, either from a synthetic
//! Lorenz curve or from a population-weighted empirical income table.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::core::config::EndowmentSource;
use crate::core::error::{Result, SimError};
use crate::data::inputs::{CityInputs, EmpiricalIncome};

/// Successive differences of `L(x) = 1 - (1 - x)^tau` over `num_agents + 1`
/// evenly spaced points. The endowments sum to 1 and increase with the
/// agent index; smaller `tau` means more inequality.
pub fn lorenz_endowments(num_agents: usize, tau: f64) -> Vec<f64> {
    let lorenz = |x: f64| 1.0 - (1.0 - x).powf(tau);
    let points: Vec<f64> = (0..=num_agents)
        .map(|i| lorenz(i as f64 / num_agents as f64))
        .collect();
    points.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Draw `num_agents` normalized incomes with probability proportional to
/// each row's population
pub fn empirical_endowments<R: Rng>(
    table: &EmpiricalIncome,
    num_agents: usize,
    rng: &mut R,
) -> Result<Vec<f64>> {
    let (incomes, populations) = table.normalized()?;
    let dist = WeightedIndex::new(&populations)?;
    Ok((0..num_agents).map(|_| incomes[dist.sample(rng)]).collect())
}

/// Endowments for a run according to the configured source
pub fn draw_endowments<R: Rng>(
    source: EndowmentSource,
    num_agents: usize,
    inputs: &CityInputs,
    rng: &mut R,
) -> Result<Vec<f64>> {
    match source {
        EndowmentSource::Lorenz { tau } => Ok(lorenz_endowments(num_agents, tau)),
        EndowmentSource::Empirical => {
            let table = inputs.empirical_income.as_ref().ok_or_else(|| {
                SimError::InvalidInput(
                    "empirical endowments requested but no income table supplied".into(),
                )
            })?;
            empirical_endowments(table, num_agents, rng)
        }
    }
}
