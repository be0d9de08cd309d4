//! SDDP forward/backward loop.
//!
//! Each iteration samples one realization per stage and walks it forward
//! from the master, which gives a trial point per stage and one sample of
//! the total cost. The backward pass then solves every realization of a
//! stage at the trial point of its sampled parent and adds the expected
//! cut to all problems of the parent stage, last stage first. The master
//! is re-solved at the end of the iteration and its objective is the
//! lower bound. Forward-pass samples count realized cost only; a window
//! holding a pass that needed coupling slack never stops the run.

use super::coordinator::report_residuals;
use super::{
    build_master, build_sub, solve_all, solve_one, ConvergenceTracker, DecompositionConfig,
    DecompositionError, DecompositionResult, RunStatus,
};
use crate::coupling::{CouplingPolicy, Cut, Stochastic};
use crate::model::{ProblemInstance, ETA};
use crate::pool::WorkerPool;
use crate::solver::LpBackend;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct StochasticRunner<'a> {
    policy: &'a Stochastic,
    config: &'a DecompositionConfig,
    backend: &'a dyn LpBackend,
    pool: Option<&'a WorkerPool>,
}

impl<'a> StochasticRunner<'a> {
    pub fn new(
        policy: &'a Stochastic,
        config: &'a DecompositionConfig,
        backend: &'a dyn LpBackend,
        pool: Option<&'a WorkerPool>,
    ) -> Self {
        Self {
            policy,
            config,
            backend,
            pool,
        }
    }

    fn build_stages(&self) -> Result<Vec<Vec<ProblemInstance>>, DecompositionError> {
        let mut stages = Vec::new();
        for group in self.policy.stage_specs()? {
            let built = group
                .into_iter()
                .map(|spec| build_sub(self.policy, spec))
                .collect::<Result<Vec<_>, _>>()?;
            stages.push(built);
        }
        Ok(stages)
    }

    pub fn run(self) -> Result<DecompositionResult, DecompositionError> {
        let settings = &self.config.solver;
        let mut master = build_master(self.policy)?;
        let mut stages = self.build_stages()?;
        debug!(
            stages = stages.len() + 1,
            realizations = self.policy.realizations().len(),
            "stages built"
        );

        let probabilities: Vec<f64> = self
            .policy
            .realizations()
            .iter()
            .map(|r| r.probability)
            .collect();
        let sampler = WeightedIndex::new(&probabilities)
            .map_err(|e| DecompositionError::Config(format!("realization weights: {e}")))?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut tracker = ConvergenceTracker::sddp(
            self.config.tolerance,
            self.config.window,
            self.config.lambda_epsilon,
        );
        let mut cuts: Vec<Cut> = Vec::new();
        let mut status = RunStatus::IterationLimitReached;
        let mut iteration = 0;

        solve_one(&mut master, self.backend, settings)?;
        while iteration < self.config.max_iterations {
            iteration += 1;

            // forward pass
            let mut sampled = Vec::with_capacity(stages.len());
            let mut forward_cost = master.realized_cost();
            let mut lambda_max: f64 = 0.0;
            for k in 0..stages.len() {
                let (done, rest) = stages.split_at_mut(k);
                let parent = match k {
                    0 => &master,
                    _ => &done[k - 1][sampled[k - 1]],
                };
                for sub in rest[0].iter_mut() {
                    self.policy.sync_master_to_sub(parent, sub)?;
                }
                let j = sampler.sample(&mut rng);
                let sub = &mut rest[0][j];
                solve_one(sub, self.backend, settings)?;
                // the slack penalty is not a cost of the system
                forward_cost += sub.realized_cost();
                lambda_max = lambda_max.max(sub.lambda());
                debug!(iteration, stage = k + 1, realization = %sub.name, "sampled");
                sampled.push(j);
            }

            // backward pass
            for k in (0..stages.len()).rev() {
                let backend = self.backend;
                solve_all(&mut stages[k], self.pool, |sub| {
                    sub.solve(backend, settings).map(|_| ())
                })?;
                let parent = match k {
                    0 => &master,
                    _ => &stages[k - 1][sampled[k - 1]],
                };
                let cut = self.policy.aggregate_cut(
                    k + 1,
                    &stages[k],
                    parent,
                    iteration,
                    self.config.lambda_epsilon,
                )?;
                let Some(cut) = cut else {
                    debug!(iteration, stage = k + 1, "cut skipped");
                    continue;
                };
                let cut = if self.config.readable_cuts {
                    cut.readable(ETA)
                } else {
                    cut
                };
                match k {
                    0 => {
                        cut.add_to(&mut master)?;
                    }
                    _ => {
                        for instance in stages[k - 1].iter_mut() {
                            cut.add_to(instance)?;
                        }
                    }
                }
                cuts.push(cut);
            }

            solve_one(&mut master, self.backend, settings)?;
            let master_objective = master.objective().unwrap_or(f64::NAN);
            let (record, converged) = tracker.observe_sddp(
                iteration,
                master_objective,
                master.eta_total(),
                lambda_max,
                forward_cost,
            );
            info!(
                iteration = record.iteration,
                future_cost = record.eta_or_future_cost,
                lower_bound = record.lower_bound,
                upper_bound = record.upper_bound,
                latest = forward_cost,
                stddev = record.upper_bound_stddev.unwrap_or(0.0),
                gap = record.gap,
                "iteration"
            );
            // a single stage is solved exactly by the master alone
            if converged || stages.is_empty() {
                status = RunStatus::Converged;
                break;
            }
        }

        let residual_lambda: BTreeMap<String, f64> = stages
            .iter()
            .flatten()
            .map(|s| (s.name.clone(), s.lambda()))
            .collect();
        report_residuals(&residual_lambda, status, self.config.lambda_epsilon);

        let lower_bound = tracker.last().map_or(f64::NEG_INFINITY, |r| r.lower_bound);
        let total_cost = tracker.upper_bound();
        info!(
            status = ?status,
            iterations = iteration,
            total_cost,
            cuts = cuts.len(),
            "decomposition finished"
        );
        Ok(DecompositionResult {
            method: self.policy.method(),
            status,
            records: tracker.into_records(),
            capacities: master.capacities(),
            total_cost,
            lower_bound,
            cuts,
            residual_lambda,
            window: Some(self.config.window),
        })
    }
}
