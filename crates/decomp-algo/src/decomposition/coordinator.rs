//! Benders coordinator.
//!
//! One iteration walks
//!
//! ```text
//! SolveMaster → SyncSubs → SolveSubs → GenerateCuts → CheckConvergence
//! ```
//!
//! and loops back to `SolveMaster` until the tracker reports convergence
//! or the iteration cap is hit. Cuts are appended here, on the
//! coordinating thread, after every sub of the iteration has returned.
//!
//! Subs are solved in two passes (see
//! [`ProblemInstance::solve_two_pass`]): a sub that cannot meet the master
//! point without coupling slack yields a feasibility cut, the others a
//! cost cut on their future-cost variable. Only an iteration in which
//! every sub met the master point produces an upper bound.

use super::{
    build_master, build_sub, solve_all, solve_one, BendersObservation, ConvergenceTracker,
    DecompositionConfig, DecompositionError, DecompositionResult, RunStatus,
};
use crate::coupling::{CouplingPolicy, Cut};
use crate::model::{ProblemInstance, SubPass, ETA};
use crate::pool::WorkerPool;
use crate::solver::LpBackend;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    BuildMaster,
    SolveMaster,
    SyncSubs,
    SolveSubs,
    GenerateCuts,
    CheckConvergence,
    Converged,
    IterationLimitReached,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Converged | Phase::IterationLimitReached)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub struct Coordinator<'a> {
    policy: &'a dyn CouplingPolicy,
    config: &'a DecompositionConfig,
    backend: &'a dyn LpBackend,
    pool: Option<&'a WorkerPool>,
    phase: Phase,
    iteration: usize,
    master: Option<ProblemInstance>,
    subs: Vec<ProblemInstance>,
    tracker: ConvergenceTracker,
    cuts: Vec<Cut>,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        policy: &'a dyn CouplingPolicy,
        config: &'a DecompositionConfig,
        backend: &'a dyn LpBackend,
        pool: Option<&'a WorkerPool>,
    ) -> Self {
        Self {
            policy,
            config,
            backend,
            pool,
            phase: Phase::Init,
            iteration: 0,
            master: None,
            subs: Vec::new(),
            tracker: ConvergenceTracker::benders(
                config.tolerance,
                config.stop_on_stable_capacity,
            ),
            cuts: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn master(&self) -> Option<&ProblemInstance> {
        self.master.as_ref()
    }

    pub fn subs(&self) -> &[ProblemInstance] {
        &self.subs
    }

    fn master_mut(&mut self) -> Result<&mut ProblemInstance, DecompositionError> {
        self.master.as_mut().ok_or_else(|| {
            DecompositionError::Config(format!("no master in phase {}", self.phase))
        })
    }

    /// Run the current phase and move to the next one.
    pub fn step(&mut self) -> Result<Phase, DecompositionError> {
        let config = self.config;
        let settings = &config.solver;
        self.phase = match self.phase {
            Phase::Init => {
                let specs = self.policy.sub_specs()?;
                self.subs = specs
                    .into_iter()
                    .map(|spec| build_sub(self.policy, spec))
                    .collect::<Result<_, _>>()?;
                debug!(subs = self.subs.len(), "subs built");
                Phase::BuildMaster
            }
            Phase::BuildMaster => {
                self.master = Some(build_master(self.policy)?);
                Phase::SolveMaster
            }
            Phase::SolveMaster => {
                self.iteration += 1;
                let backend = self.backend;
                solve_one(self.master_mut()?, backend, settings)?;
                Phase::SyncSubs
            }
            Phase::SyncSubs => {
                let master = self.master.as_ref().ok_or_else(|| {
                    DecompositionError::Config("no master to sync from".to_string())
                })?;
                for sub in self.subs.iter_mut() {
                    self.policy.sync_master_to_sub(master, sub)?;
                }
                Phase::SolveSubs
            }
            Phase::SolveSubs => {
                let backend = self.backend;
                let epsilon = config.lambda_epsilon;
                solve_all(&mut self.subs, self.pool, |sub| {
                    sub.solve_two_pass(backend, settings, epsilon)
                })?;
                Phase::GenerateCuts
            }
            Phase::GenerateCuts => {
                self.generate_cuts()?;
                Phase::CheckConvergence
            }
            Phase::CheckConvergence => self.check_convergence()?,
            terminal => terminal,
        };
        Ok(self.phase)
    }

    fn generate_cuts(&mut self) -> Result<(), DecompositionError> {
        let master = self.master.as_ref().ok_or_else(|| {
            DecompositionError::Config("no master to cut".to_string())
        })?;
        let mut new_cuts = Vec::new();
        for sub in &self.subs {
            match self.policy.generate_cut(
                sub,
                master,
                self.iteration,
                self.config.lambda_epsilon,
            )? {
                Some(cut) if self.config.readable_cuts => new_cuts.push(cut.readable(ETA)),
                Some(cut) => new_cuts.push(cut),
                None => debug!(
                    sub = %sub.name,
                    pass = ?sub.pass,
                    lambda = sub.lambda(),
                    "cut skipped"
                ),
            }
        }
        let master = self.master_mut()?;
        for cut in &new_cuts {
            cut.add_to(master)?;
        }
        debug!(iteration = self.iteration, cuts = new_cuts.len(), "cuts added");
        self.cuts.extend(new_cuts);
        Ok(())
    }

    fn check_convergence(&mut self) -> Result<Phase, DecompositionError> {
        let master = self.master.as_ref().ok_or_else(|| {
            DecompositionError::Config("no master to check".to_string())
        })?;
        let master_objective = master.objective().unwrap_or(f64::NAN);
        let eta = master.eta_total();
        let sub_costs: f64 = self.subs.iter().map(|s| s.realized_cost()).sum();
        let extra = self.policy.upper_bound_extra(master, &self.subs);
        let lambda_max = self.subs.iter().map(|s| s.lambda()).fold(0.0, f64::max);
        let feasible = self
            .subs
            .iter()
            .all(|s| s.pass == SubPass::Cost && s.lambda() <= self.config.lambda_epsilon);
        let obs = BendersObservation {
            master_objective,
            eta,
            lambda_max,
            feasible,
            upper_bound_candidate: if feasible {
                master_objective - eta + sub_costs + extra
            } else {
                f64::INFINITY
            },
            decisions: handed_down(master, &self.subs),
        };
        let (record, converged) = self.tracker.observe_benders(self.iteration, obs)?;
        info!(
            iteration = record.iteration,
            eta = record.eta_or_future_cost,
            lambda = record.lambda_max,
            lower_bound = record.lower_bound,
            upper_bound = record.upper_bound,
            gap = record.gap,
            master = record.master_objective,
            feasible,
            "iteration"
        );
        Ok(if converged {
            Phase::Converged
        } else if self.iteration >= self.config.max_iterations {
            Phase::IterationLimitReached
        } else {
            Phase::SolveMaster
        })
    }

    /// Step until a terminal phase and collect the result.
    pub fn run(mut self) -> Result<DecompositionResult, DecompositionError> {
        while !self.phase.is_terminal() {
            self.step()?;
        }
        self.finish()
    }

    fn finish(self) -> Result<DecompositionResult, DecompositionError> {
        let status = match self.phase {
            Phase::Converged => RunStatus::Converged,
            _ => RunStatus::IterationLimitReached,
        };
        let master = self.master.ok_or_else(|| {
            DecompositionError::Config("run finished without a master".to_string())
        })?;
        let residual_lambda: BTreeMap<String, f64> = self
            .subs
            .iter()
            .map(|s| (s.name.clone(), s.lambda()))
            .collect();
        report_residuals(&residual_lambda, status, self.config.lambda_epsilon);

        let lower_bound = self.tracker.last().map_or(f64::NEG_INFINITY, |r| r.lower_bound);
        let total_cost = self.tracker.upper_bound();
        info!(
            status = ?status,
            iterations = self.iteration,
            total_cost,
            cuts = self.cuts.len(),
            "decomposition finished"
        );
        Ok(DecompositionResult {
            method: self.policy.method(),
            status,
            records: self.tracker.into_records(),
            capacities: master.capacities(),
            total_cost,
            lower_bound,
            cuts: self.cuts,
            residual_lambda,
            window: None,
        })
    }
}

/// Master values of every coupling source of every sub, in sub and link
/// order. Sources a sub names but the master lacks are skipped.
fn handed_down(master: &ProblemInstance, subs: &[ProblemInstance]) -> Vec<f64> {
    subs.iter()
        .flat_map(|sub| sub.links.iter())
        .flat_map(|link| link.sources.iter())
        .filter_map(|(source, _)| master.link_value(source))
        .collect()
}

/// A converged run with coupling slack left means the master allocation
/// and the subs still disagree.
pub(crate) fn report_residuals(residuals: &BTreeMap<String, f64>, status: RunStatus, eps: f64) {
    if status != RunStatus::Converged {
        return;
    }
    for (sub, lambda) in residuals {
        if *lambda > eps {
            warn!(sub = %sub, lambda, "converged with residual coupling slack");
        }
    }
}
