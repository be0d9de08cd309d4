//! Time window, site subset and scenario realization of one problem.

use crate::data::ModelData;
use crate::error::{DataError, DataResult};
use crate::finance::annualization_weight;
use crate::keys::Timestep;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One branch of a stochastic stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Realization {
    pub name: String,
    pub probability: f64,
    /// Transform factor in `[-1, 1]` applied to the uncertain supply series
    pub factor: f64,
}

impl Realization {
    pub fn new(name: impl Into<String>, probability: f64, factor: f64) -> Self {
        Self {
            name: name.into(),
            probability,
            factor,
        }
    }
}

/// What part of the model data a problem covers.
///
/// `timesteps[0]` is the initial state index; only the remaining steps are
/// modelled. The annualization weight is computed from `weight_steps`
/// when set, so the blocks of one decomposed run all share the weight of
/// the whole horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    timesteps: Vec<Timestep>,
    pub sites: Option<BTreeSet<String>>,
    pub realization: Option<Realization>,
    weight_steps: Option<usize>,
    pub label: String,
}

impl Scope {
    pub fn new(timesteps: impl IntoIterator<Item = Timestep>) -> DataResult<Self> {
        let mut steps: Vec<Timestep> = timesteps.into_iter().collect();
        steps.sort_unstable();
        steps.dedup();
        if steps.len() < 2 {
            return Err(DataError::InvalidScope(format!(
                "need an initial and at least one modelled timestep, got {steps:?}"
            )));
        }
        let label = format!("t{}-t{}", steps[0], steps[steps.len() - 1]);
        Ok(Self {
            timesteps: steps,
            sites: None,
            realization: None,
            weight_steps: None,
            label,
        })
    }

    /// Every timestep from `first` to `last`, both included.
    pub fn range(first: Timestep, last: Timestep) -> DataResult<Self> {
        Self::new(first..=last)
    }

    /// The full time index of the data.
    pub fn full(data: &ModelData) -> DataResult<Self> {
        Self::new(data.timesteps())
    }

    pub fn with_sites(mut self, sites: BTreeSet<String>) -> Self {
        self.sites = Some(sites);
        self
    }

    pub fn with_realization(mut self, realization: Realization) -> Self {
        self.realization = Some(realization);
        self
    }

    pub fn with_weight_steps(mut self, steps: usize) -> Self {
        self.weight_steps = Some(steps);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// `T`, including the initial state index.
    pub fn timesteps(&self) -> &[Timestep] {
        &self.timesteps
    }

    /// `Tm = T \ {first}`.
    pub fn modelled(&self) -> &[Timestep] {
        &self.timesteps[1..]
    }

    pub fn first(&self) -> Timestep {
        self.timesteps[0]
    }

    pub fn last(&self) -> Timestep {
        self.timesteps[self.timesteps.len() - 1]
    }

    /// Predecessor of `t` within `T`.
    pub fn previous(&self, t: Timestep) -> Option<Timestep> {
        match self.timesteps.binary_search(&t) {
            Ok(pos) if pos > 0 => Some(self.timesteps[pos - 1]),
            _ => None,
        }
    }

    pub fn contains_site(&self, site: &str) -> bool {
        self.sites.as_ref().map_or(true, |s| s.contains(site))
    }

    /// `8760 / (steps · dt)`, see [`annualization_weight`].
    pub fn weight(&self, dt: f64) -> f64 {
        annualization_weight(self.weight_steps.unwrap_or(self.modelled().len()), dt)
    }

    /// Slice `data` to this scope's sites and apply its realization to the
    /// series of `uncertain` (when both are present).
    pub fn slice(&self, data: &ModelData, uncertain: Option<&str>) -> ModelData {
        let mut sliced = match &self.sites {
            Some(sites) => data.slice_sites(sites),
            None => data.clone(),
        };
        if let (Some(realization), Some(commodity)) = (&self.realization, uncertain) {
            sliced.apply_supim_factor(commodity, realization.factor);
        }
        sliced
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)?;
        if let Some(r) = &self.realization {
            write!(f, "[{}]", r.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modelled_excludes_first() {
        let scope = Scope::new([3, 1, 2, 0, 2]).unwrap();
        assert_eq!(scope.timesteps(), &[0, 1, 2, 3]);
        assert_eq!(scope.modelled(), &[1, 2, 3]);
        assert_eq!(scope.previous(2), Some(1));
        assert_eq!(scope.previous(0), None);
    }

    #[test]
    fn test_single_step_scope_rejected() {
        assert!(matches!(Scope::new([4]), Err(DataError::InvalidScope(_))));
    }

    #[test]
    fn test_weight_uses_horizon_override() {
        let block = Scope::range(4, 6).unwrap();
        assert!((block.weight(1.0) - 4380.0).abs() < 1e-9);
        let block = block.with_weight_steps(6);
        assert!((block.weight(1.0) - 1460.0).abs() < 1e-9);
    }
}
