//! Multi-stage stochastic decomposition (SDDP).
//!
//! Support steps cut the horizon into stages. Stage 0 is the master: it
//! invests and operates its own window. Every later stage has one sub per
//! realization of the uncertain supply commodity, operating its window with
//! capacities, storage content and cumulative commodity use handed down by
//! its parent. Subs pay their own operation, the expected cost of the
//! stages after them (`eta`) and a penalty on any coupling slack.

use super::{
    consumption, limited_commodities, link_capacities, value_function_cut, Cut, CouplingError,
    CouplingPolicy, Method,
};
use crate::lp::{IndexKey, LinExpr};
use crate::model::{
    BuildContext, BuildError, BuildStage, Family, InstanceSpec, LinkKey, ObjectiveKind,
    ProblemInstance, Role, VarPlan, E_CO_STATE, E_STO_CON, ETA,
};
use decomp_core::{CommodityType, ModelData, Realization, Scope, Timestep, CO2};
use std::collections::BTreeSet;

/// Realization used when none are configured.
pub const DEFAULT_REALIZATION: &str = "mid";

pub struct Stochastic {
    data: ModelData,
    support: Vec<Timestep>,
    timesteps: Vec<Timestep>,
    realizations: Vec<Realization>,
    uncertain: String,
    lambda_penalty: f64,
}

impl Stochastic {
    pub fn new(
        data: &ModelData,
        support_steps: &[Timestep],
        realizations: Vec<Realization>,
        uncertain: impl Into<String>,
        lambda_penalty: f64,
    ) -> Result<Self, CouplingError> {
        let full = Scope::full(data)?;
        let timesteps = full.timesteps().to_vec();
        let mut support: BTreeSet<Timestep> = BTreeSet::new();
        for &t in support_steps {
            if timesteps.binary_search(&t).is_err() {
                return Err(CouplingError::SupportSteps(format!(
                    "timestep {t} is not part of the time index {}..={}",
                    full.first(),
                    full.last()
                )));
            }
            support.insert(t);
        }
        support.insert(full.first());
        support.insert(full.last());

        let realizations = if realizations.is_empty() {
            vec![Realization::new(DEFAULT_REALIZATION, 1.0, 0.0)]
        } else {
            realizations
        };
        let mut total = 0.0;
        for r in &realizations {
            if !(0.0..=1.0).contains(&r.probability) {
                return Err(CouplingError::Realizations(format!(
                    "probability of '{}' is {}, expected a value in [0, 1]",
                    r.name, r.probability
                )));
            }
            if !(-1.0..=1.0).contains(&r.factor) {
                return Err(CouplingError::Realizations(format!(
                    "factor of '{}' is {}, expected a value in [-1, 1]",
                    r.name, r.factor
                )));
            }
            total += r.probability;
        }
        if (total - 1.0).abs() > 1e-6 {
            return Err(CouplingError::Realizations(format!(
                "probabilities sum to {total}, expected 1"
            )));
        }
        if lambda_penalty <= 0.0 {
            return Err(CouplingError::Realizations(format!(
                "lambda penalty must be positive, got {lambda_penalty}"
            )));
        }

        Ok(Self {
            data: data.clone(),
            support: support.into_iter().collect(),
            timesteps,
            realizations,
            uncertain: uncertain.into(),
            lambda_penalty,
        })
    }

    /// Number of stages, the master's included.
    pub fn stage_count(&self) -> usize {
        self.support.len() - 1
    }

    pub fn realizations(&self) -> &[Realization] {
        &self.realizations
    }

    pub fn support_steps(&self) -> &[Timestep] {
        &self.support
    }

    /// Stage index of a problem covering `scope`.
    pub fn stage_of(&self, scope: &Scope) -> usize {
        self.support
            .iter()
            .position(|s| *s == scope.first())
            .unwrap_or(0)
    }

    /// The parent-side variable estimating the expected cost of `stage`
    /// and everything after it.
    pub fn stage_eta(&self, stage: usize) -> LinkKey {
        LinkKey::new(ETA, IndexKey::step(self.support[stage]))
    }

    fn has_future(&self, stage: usize) -> bool {
        stage + 1 < self.stage_count()
    }

    fn stage_scope(&self, stage: usize) -> Result<Scope, CouplingError> {
        let (a, b) = (self.support[stage], self.support[stage + 1]);
        let steps = self.timesteps.iter().copied().filter(|t| *t >= a && *t <= b);
        Ok(Scope::new(steps)?
            .with_weight_steps(self.timesteps.len() - 1)
            .with_label(format!("stage{stage}")))
    }

    /// Subs grouped by stage, stage 1 first; each group holds one problem
    /// per realization in configuration order.
    pub fn stage_specs(&self) -> Result<Vec<Vec<InstanceSpec>>, CouplingError> {
        let last = self.stage_count() - 1;
        let mut stages = Vec::new();
        for stage in 1..self.stage_count() {
            let mut group = Vec::new();
            for realization in &self.realizations {
                let scope = self.stage_scope(stage)?.with_realization(realization.clone());
                let data = scope.slice(&self.data, Some(&self.uncertain));
                group.push(InstanceSpec {
                    name: format!("stage{stage}-{}", realization.name),
                    role: Role::Sub,
                    scope,
                    data,
                    plan: VarPlan {
                        final_storage: stage == last,
                        bound_last_state: true,
                        objective: ObjectiveKind::PenalizedCost(self.lambda_penalty),
                        ..VarPlan::linked_operation()
                    },
                });
            }
            stages.push(group);
        }
        Ok(stages)
    }

    /// Expected cut for the parents of `stage` from the solved
    /// realizations of that stage, or `None` if the parent's current point
    /// already satisfies it within `epsilon`.
    pub fn aggregate_cut(
        &self,
        stage: usize,
        solved: &[ProblemInstance],
        parent: &ProblemInstance,
        iteration: usize,
        epsilon: f64,
    ) -> Result<Option<Cut>, CouplingError> {
        let mut parts = Vec::with_capacity(solved.len());
        for (sub, realization) in solved.iter().zip(&self.realizations) {
            parts.push((realization.probability, value_function_cut(sub, iteration)?));
        }
        let mut cut = Cut::expectation(&parts, format!("stage{stage}"), iteration);
        cut.coefficients.push((self.stage_eta(stage), -1.0));
        if cut.violation(parent)? <= epsilon {
            return Ok(None);
        }
        Ok(Some(cut))
    }

    fn declare_stage(&self, ctx: &mut BuildContext<'_>, stage: usize) -> Result<(), BuildError> {
        let scope = ctx.scope;
        for (key, _) in limited_commodities(ctx.data)? {
            if !scope.contains_site(&key.site) {
                continue;
            }
            for &t in scope.timesteps() {
                let ikey = IndexKey::from(&key).at(t);
                let id = match key.kind {
                    CommodityType::Stock => ctx.program.add_nonneg(E_CO_STATE, ikey),
                    _ => ctx.program.add_free(E_CO_STATE, ikey),
                };
                ctx.vars.e_co_state.insert((t, key.clone()), id);
            }
        }
        if self.has_future(stage) {
            let eta = self.stage_eta(stage + 1);
            let id = ctx.program.add_nonneg(ETA, eta.key);
            ctx.vars.eta.insert(format!("stage{}", stage + 1), id);
        }
        Ok(())
    }

    fn constrain_stage(&self, ctx: &mut BuildContext<'_>, stage: usize) -> Result<(), BuildError> {
        let scope = ctx.scope;
        let data = ctx.data;
        let (first, last) = (scope.first(), scope.last());
        let dt = ctx.dt();
        let weight = ctx.weight();
        let limited = limited_commodities(data)?;

        // cumulative use
        for (key, _) in &limited {
            for &t in scope.modelled() {
                let (Some(&now), Some(prev)) = (
                    ctx.vars.e_co_state.get(&(t, key.clone())),
                    scope.previous(t),
                ) else {
                    continue;
                };
                let Some(&before) = ctx.vars.e_co_state.get(&(prev, key.clone())) else {
                    continue;
                };
                let used = consumption(ctx, key, t) * dt;
                ctx.program.eq(
                    Family::ComState,
                    IndexKey::from(key).at(t),
                    now,
                    LinExpr::from(before) + used,
                );
            }
        }

        if stage == 0 {
            for (key, _) in &limited {
                if let Some(&start) = ctx.vars.e_co_state.get(&(first, key.clone())) {
                    ctx.program
                        .eq(Family::ComState, IndexKey::from(key).at(first), start, 0.0);
                }
            }
        } else {
            let lambda = ctx.lambda();
            link_capacities(ctx, |_| true);

            for key in data.storages.keys() {
                let Some(&start) = ctx.vars.e_sto_con.get(&(first, key.clone())) else {
                    continue;
                };
                let ikey = IndexKey::from(key).at(first);
                let p = ctx.link(
                    "e_sto_con_res",
                    ikey.clone(),
                    vec![(LinkKey::new(E_STO_CON, ikey.clone()), 1.0)],
                );
                ctx.program.le(
                    Family::SubStorageStart,
                    ikey,
                    start,
                    LinExpr::param(p, 1.0) + lambda,
                );
            }
            for (key, _) in &limited {
                let Some(&start) = ctx.vars.e_co_state.get(&(first, key.clone())) else {
                    continue;
                };
                let ikey = IndexKey::from(key).at(first);
                let p = ctx.link(
                    "e_co_stock_state_res",
                    ikey.clone(),
                    vec![(LinkKey::new(E_CO_STATE, ikey.clone()), 1.0)],
                );
                ctx.program.ge(
                    Family::SubComState,
                    ikey,
                    start,
                    LinExpr::param(p, 1.0) - lambda,
                );
            }
        }

        // horizon totals, checked at the end of every stage
        let mut co2 = LinExpr::new();
        for (key, max) in &limited {
            let Some(&end) = ctx.vars.e_co_state.get(&(last, key.clone())) else {
                continue;
            };
            if key.kind == CommodityType::Env && key.commodity == CO2 {
                co2 += weight * end;
            }
            if max.is_finite() {
                ctx.program
                    .le(Family::ComTotal, IndexKey::from(key), weight * end, *max);
            }
        }
        let limit = data.co2_limit()?;
        if limit.is_finite() && limit >= 0.0 && !co2.has_no_vars() {
            ctx.program
                .le(Family::ResGlobalCo2Limit, IndexKey::step(last), co2, limit);
        }
        Ok(())
    }
}

impl CouplingPolicy for Stochastic {
    fn method(&self) -> Method {
        Method::Sddp
    }

    fn master_spec(&self) -> Result<InstanceSpec, CouplingError> {
        let scope = self.stage_scope(0)?.with_label("master");
        Ok(InstanceSpec {
            name: "master".to_string(),
            role: Role::Master,
            data: self.data.clone(),
            scope,
            plan: VarPlan {
                final_storage: self.stage_count() == 1,
                scope_totals: false,
                global_co2: false,
                ..VarPlan::normal()
            },
        })
    }

    fn sub_specs(&self) -> Result<Vec<InstanceSpec>, CouplingError> {
        Ok(self.stage_specs()?.into_iter().flatten().collect())
    }

    fn extra_master_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError> {
        match stage {
            BuildStage::Declare => self.declare_stage(ctx, 0),
            BuildStage::Constrain => self.constrain_stage(ctx, 0),
        }
    }

    fn extra_sub_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError> {
        let index = self.stage_of(ctx.scope);
        match stage {
            BuildStage::Declare => self.declare_stage(ctx, index),
            BuildStage::Constrain => self.constrain_stage(ctx, index),
        }
    }

    /// Single-realization cut; the runner aggregates these per stage with
    /// [`Stochastic::aggregate_cut`].
    fn generate_cut(
        &self,
        sub: &ProblemInstance,
        _parent: &ProblemInstance,
        iteration: usize,
        _epsilon: f64,
    ) -> Result<Option<Cut>, CouplingError> {
        value_function_cut(sub, iteration).map(Some)
    }

    fn upper_bound_extra(&self, _master: &ProblemInstance, _subs: &[ProblemInstance]) -> f64 {
        0.0
    }
}
