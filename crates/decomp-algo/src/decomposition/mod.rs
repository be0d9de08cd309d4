//! Decomposition runs.
//!
//! [`decompose`] picks the coupling policy for the configured method and
//! drives it to convergence: a [`Coordinator`] state machine for the
//! Benders methods (time-horizon, regional) and a forward/backward loop
//! for SDDP. Both share the [`ConvergenceTracker`] and report one
//! [`IterationRecord`] per iteration.

mod convergence;
mod coordinator;
mod sddp;

pub use convergence::{BendersObservation, ConvergenceTracker, IterationRecord};
pub use coordinator::{Coordinator, Phase};
pub use sddp::StochasticRunner;

pub use crate::coupling::Method;

use crate::coupling::{CouplingError, CouplingPolicy, Cut, Regional, Stochastic, TimeHorizon};
use crate::model::{BuildError, CapacityValue, InstanceSpec, ModelBuilder, ProblemInstance};
use crate::pool::{PoolError, WorkerPool};
use crate::solver::{LpBackend, LpError, SolverSettings};
use decomp_core::{ModelData, Realization, Scope, Timestep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DecompositionError {
    #[error("{instance} failed to solve: {status}")]
    SolverFailed { instance: String, status: String },

    #[error(
        "iteration {iteration}: upper bound {upper_bound} lies below lower bound {lower_bound}; a cut cut off the optimum"
    )]
    BoundsCrossed {
        iteration: usize,
        lower_bound: f64,
        upper_bound: f64,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Coupling(#[from] CouplingError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeHorizonConfig {
    pub support_steps: Vec<Timestep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionalConfig {
    /// Region name → site names; unlisted sites form their own region
    pub regions: BTreeMap<String, Vec<String>>,
    /// Region name → data directory of a region modelled in its own file
    pub coupled_files: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealizationConfig {
    pub probability: f64,
    #[serde(default)]
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SddpConfig {
    pub support_steps: Vec<Timestep>,
    pub realizations: BTreeMap<String, RealizationConfig>,
    pub uncertain_commodity: String,
}

impl Default for SddpConfig {
    fn default() -> Self {
        Self {
            support_steps: Vec::new(),
            realizations: BTreeMap::new(),
            uncertain_commodity: "Wind".to_string(),
        }
    }
}

impl SddpConfig {
    pub fn realizations(&self) -> Vec<Realization> {
        self.realizations
            .iter()
            .map(|(name, r)| Realization::new(name.clone(), r.probability, r.factor))
            .collect()
    }
}

/// Run configuration, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    pub method: Method,
    pub max_iterations: usize,
    /// Relative gap tolerance
    pub tolerance: f64,
    /// Coupling slack below which a sub produces no cut
    pub lambda_epsilon: f64,
    pub parallel: bool,
    /// Worker threads; 0 uses one per CPU
    pub threads: usize,
    pub readable_cuts: bool,
    pub stop_on_stable_capacity: bool,
    /// SDDP upper-bound window
    pub window: usize,
    /// SDDP objective weight of the coupling slack
    pub lambda_penalty: f64,
    pub seed: u64,
    /// Directory locked for the duration of a parallel run
    pub run_dir: Option<PathBuf>,
    pub solver: SolverSettings,
    pub time_horizon: TimeHorizonConfig,
    pub regional: RegionalConfig,
    pub sddp: SddpConfig,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            method: Method::TimeHorizon,
            max_iterations: 100,
            tolerance: 1e-6,
            lambda_epsilon: 1e-6,
            parallel: false,
            threads: 0,
            readable_cuts: false,
            stop_on_stable_capacity: true,
            window: 10,
            lambda_penalty: 1e6,
            seed: 0,
            run_dir: None,
            solver: SolverSettings::default(),
            time_horizon: TimeHorizonConfig::default(),
            regional: RegionalConfig::default(),
            sddp: SddpConfig::default(),
        }
    }
}

impl DecompositionConfig {
    pub fn validate(&self) -> Result<(), DecompositionError> {
        if self.max_iterations == 0 {
            return Err(DecompositionError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(DecompositionError::Config(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.method == Method::Sddp && self.window == 0 {
            return Err(DecompositionError::Config(
                "window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Converged,
    IterationLimitReached,
}

/// Outcome of a decomposition run.
#[derive(Debug, Clone, Serialize)]
pub struct DecompositionResult {
    pub method: Method,
    pub status: RunStatus,
    pub records: Vec<IterationRecord>,
    /// Final master capacities
    pub capacities: Vec<CapacityValue>,
    /// Best upper bound (SDDP: mean of the window)
    pub total_cost: f64,
    pub lower_bound: f64,
    pub cuts: Vec<Cut>,
    /// Coupling slack of every sub at the end of the run
    pub residual_lambda: BTreeMap<String, f64>,
    /// SDDP: length of the upper-bound window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<usize>,
}

impl DecompositionResult {
    pub fn iterations(&self) -> usize {
        self.records.len()
    }

    pub fn converged(&self) -> bool {
        self.status == RunStatus::Converged
    }

    pub fn gap(&self) -> f64 {
        self.records.last().map_or(f64::INFINITY, |r| r.gap)
    }
}

pub(crate) fn build_master(
    policy: &dyn CouplingPolicy,
) -> Result<ProblemInstance, DecompositionError> {
    let spec = policy.master_spec()?;
    Ok(ModelBuilder::new(spec).build(|ctx, stage| policy.extra_master_constructs(ctx, stage))?)
}

pub(crate) fn build_sub(
    policy: &dyn CouplingPolicy,
    spec: InstanceSpec,
) -> Result<ProblemInstance, DecompositionError> {
    Ok(ModelBuilder::new(spec).build(|ctx, stage| policy.extra_sub_constructs(ctx, stage))?)
}

fn solve_failed(instance: &ProblemInstance, error: LpError) -> DecompositionError {
    DecompositionError::SolverFailed {
        instance: instance.identity(),
        status: error.to_string(),
    }
}

pub(crate) fn solve_one(
    instance: &mut ProblemInstance,
    backend: &dyn LpBackend,
    settings: &SolverSettings,
) -> Result<(), DecompositionError> {
    let outcome = instance.solve(backend, settings).map(|_| ());
    outcome.map_err(|e| solve_failed(instance, e))
}

/// Run `task` on every instance, on the pool when one is given. The first
/// failure (by position) is reported.
pub(crate) fn solve_all<F>(
    instances: &mut [ProblemInstance],
    pool: Option<&WorkerPool>,
    task: F,
) -> Result<(), DecompositionError>
where
    F: Fn(&mut ProblemInstance) -> Result<(), LpError> + Sync,
{
    let Some(pool) = pool else {
        for instance in instances.iter_mut() {
            if let Err(e) = task(instance) {
                return Err(solve_failed(instance, e));
            }
        }
        return Ok(());
    };
    let results = pool.run_batch(instances, &task)?;
    for (id, result) in results {
        if let Err(e) = result {
            return Err(solve_failed(&instances[id], e));
        }
    }
    Ok(())
}

/// Build and solve the whole model as one problem.
pub fn solve_normal(
    data: &ModelData,
    backend: &dyn LpBackend,
    settings: &SolverSettings,
) -> Result<ProblemInstance, DecompositionError> {
    data.validate().map_err(BuildError::from)?;
    let scope = Scope::full(data).map_err(BuildError::from)?;
    let mut instance = ModelBuilder::new(InstanceSpec::normal(data, scope)).build_plain()?;
    solve_one(&mut instance, backend, settings)?;
    info!(
        objective = instance.objective().unwrap_or(f64::NAN),
        vars = instance.program.num_vars(),
        constraints = instance.program.num_constraints(),
        "normal problem solved"
    );
    Ok(instance)
}

/// Run the configured decomposition. `coupled` holds the data of regions
/// configured with their own directory, keyed by region name.
pub fn decompose(
    data: &ModelData,
    config: &DecompositionConfig,
    coupled: BTreeMap<String, ModelData>,
    backend: &dyn LpBackend,
) -> Result<DecompositionResult, DecompositionError> {
    config.validate()?;
    data.validate().map_err(BuildError::from)?;
    if !backend.supports_duals() {
        return Err(DecompositionError::Config(format!(
            "backend '{}' does not return duals, which cuts need",
            backend.name()
        )));
    }
    let pool = if config.parallel {
        let pool = WorkerPool::new(config.threads)?;
        let pool = match &config.run_dir {
            Some(dir) => pool.with_run_dir(dir)?,
            None => pool,
        };
        debug!(threads = pool.threads(), "worker pool started");
        Some(pool)
    } else {
        None
    };

    info!(method = %config.method, "starting decomposition");
    match config.method {
        Method::TimeHorizon => {
            let policy = TimeHorizon::new(data, &config.time_horizon.support_steps)?;
            Coordinator::new(&policy, config, backend, pool.as_ref()).run()
        }
        Method::Regional => {
            let policy = Regional::new(data, &config.regional.regions, coupled)?;
            Coordinator::new(&policy, config, backend, pool.as_ref()).run()
        }
        Method::Sddp => {
            let policy = Stochastic::new(
                data,
                &config.sddp.support_steps,
                config.sddp.realizations(),
                config.sddp.uncertain_commodity.clone(),
                config.lambda_penalty,
            )?;
            StochasticRunner::new(&policy, config, backend, pool.as_ref()).run()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DecompositionConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.window, 10);
        assert!(config.stop_on_stable_capacity);
        assert_eq!(config.sddp.uncertain_commodity, "Wind");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = DecompositionConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DecompositionError::Config(_))));
    }

    #[test]
    fn test_config_from_json_fills_defaults() {
        let config: DecompositionConfig = serde_json::from_str(
            r#"{"method": "sddp", "sddp": {"realizations": {"low": {"probability": 0.5, "factor": -0.5}, "high": {"probability": 0.5}}}}"#,
        )
        .unwrap();
        assert_eq!(config.method, Method::Sddp);
        let realizations = config.sddp.realizations();
        assert_eq!(realizations.len(), 2);
        assert_eq!(realizations[0].name, "high");
        assert_eq!(realizations[0].factor, 0.0);
        assert_eq!(config.tolerance, 1e-6);
    }

    #[test]
    fn test_unknown_method_rejected() {
        let parsed: Result<DecompositionConfig, _> =
            serde_json::from_str(r#"{"method": "dantzig-wolfe"}"#);
        assert!(parsed.is_err());
    }
}
