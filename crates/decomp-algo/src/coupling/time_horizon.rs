//! Time-horizon decomposition.
//!
//! The master decides capacities, storage contents at the support steps,
//! per-block budgets of limited commodities and per-block future costs.
//! Sub `k` operates the system between support steps `s_{k-1}` and `s_k`
//! with capacities, boundary storage contents and budget copied from the
//! master; its operating cost is priced in the master by the future-cost
//! variable at `s_k`.

use super::{consumption, limited_commodities, link_capacities, CouplingError, CouplingPolicy, Method};
use crate::lp::{IndexKey, LinExpr};
use crate::model::{
    BuildContext, BuildError, BuildStage, Family, InstanceSpec, LinkKey, ProblemInstance, Role,
    VarPlan, BUDGET, CAP_STO_C, E_STO_CON, ETA,
};
use decomp_core::{CommodityType, ModelData, Scope, Timestep, CO2};
use std::collections::BTreeSet;

pub struct TimeHorizon {
    data: ModelData,
    support: Vec<Timestep>,
    timesteps: Vec<Timestep>,
}

impl TimeHorizon {
    /// Support steps must be part of the time index; the first and last
    /// index are always added.
    pub fn new(data: &ModelData, support_steps: &[Timestep]) -> Result<Self, CouplingError> {
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
        Ok(Self {
            data: data.clone(),
            support: support.into_iter().collect(),
            timesteps,
        })
    }

    pub fn support_steps(&self) -> &[Timestep] {
        &self.support
    }

    fn weight_steps(&self) -> usize {
        self.timesteps.len() - 1
    }

    fn blocks(&self) -> impl Iterator<Item = (Timestep, Timestep)> + '_ {
        self.support.windows(2).map(|w| (w[0], w[1]))
    }

    /// Number of modelled steps in `(a, b]`.
    fn block_length(&self, a: Timestep, b: Timestep) -> usize {
        self.timesteps.iter().filter(|t| **t > a && **t <= b).count()
    }

    fn declare_master(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let data = ctx.data;
        for key in data.storages.keys() {
            for &s in &self.support {
                let id = ctx.program.add_nonneg(E_STO_CON, IndexKey::from(key).at(s));
                ctx.vars.e_sto_con.insert((s, key.clone()), id);
            }
        }
        for &s in &self.support[1..] {
            let id = ctx.program.add_nonneg(ETA, IndexKey::step(s));
            ctx.vars.eta.insert(format!("t{s}"), id);
        }
        for (key, _) in limited_commodities(data)? {
            for &s in &self.support[1..] {
                let ikey = IndexKey::from(&key).at(s);
                // emissions may be negative, purchases may not
                let id = match key.kind {
                    CommodityType::Stock => ctx.program.add_nonneg(BUDGET, ikey.clone()),
                    _ => ctx.program.add_free(BUDGET, ikey.clone()),
                };
                ctx.vars.budget.insert(ikey, id);
            }
        }
        Ok(())
    }

    fn constrain_master(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let data = ctx.data;
        let dt = ctx.dt();

        // reachable storage content between consecutive support steps
        for (a, b) in self.blocks() {
            let delta = self.block_length(a, b);
            for (key, sto) in &data.storages {
                let (Some(&start), Some(&end), Some(&power)) = (
                    ctx.vars.e_sto_con.get(&(a, key.clone())),
                    ctx.vars.e_sto_con.get(&(b, key.clone())),
                    ctx.vars.cap_sto_p.get(key),
                ) else {
                    continue;
                };
                let retained = (1.0 - sto.discharge).powf(delta as f64 * dt);
                let reach: f64 = (1..=delta)
                    .map(|i| dt * (1.0 - sto.discharge).powf((delta - i) as f64 * dt))
                    .sum();
                let ikey = IndexKey::from(key).at(b);
                ctx.program.le(
                    Family::ResStorageStateUpper,
                    ikey.clone(),
                    end,
                    retained * start + (reach * sto.eff_in) * power,
                );
                if sto.eff_out > 0.0 {
                    ctx.program.ge(
                        Family::ResStorageStateLower,
                        ikey,
                        end,
                        retained * start - (reach / sto.eff_out) * power,
                    );
                }
            }
        }

        let co2_limit = data.co2_limit()?;
        let mut global = LinExpr::new();
        for (key, max) in limited_commodities(data)? {
            let mut total = LinExpr::new();
            for &s in &self.support[1..] {
                if let Some(&b) = ctx.vars.budget.get(&IndexKey::from(&key).at(s)) {
                    total += b;
                }
            }
            if key.kind == CommodityType::Env && key.commodity == CO2 {
                global += total.clone();
            }
            if max.is_finite() {
                ctx.program
                    .le(Family::ResBudgetTotal, IndexKey::from(&key), total, max);
            }
        }
        if co2_limit.is_finite() && co2_limit >= 0.0 && !global.has_no_vars() {
            ctx.program
                .le(Family::ResGlobalBudget, IndexKey::new(), global, co2_limit);
        }
        Ok(())
    }

    fn constrain_sub(&self, ctx: &mut BuildContext<'_>) -> Result<(), BuildError> {
        let data = ctx.data;
        let (a, b) = (ctx.scope.first(), ctx.scope.last());
        let lambda = ctx.lambda();

        // energy capacity is tied from both sides so content bounds hold
        link_capacities(ctx, |name| name == CAP_STO_C);

        for key in data.storages.keys() {
            let (Some(&start), Some(&end)) = (
                ctx.vars.e_sto_con.get(&(a, key.clone())),
                ctx.vars.e_sto_con.get(&(b, key.clone())),
            ) else {
                continue;
            };
            let start_key = IndexKey::from(key).at(a);
            let p = ctx.link(
                "e_sto_con_res",
                start_key.clone(),
                vec![(LinkKey::new(E_STO_CON, start_key.clone()), 1.0)],
            );
            ctx.program.le(
                Family::SubStorageStart,
                start_key,
                start,
                LinExpr::param(p, 1.0) + lambda,
            );
            let end_key = IndexKey::from(key).at(b);
            let p = ctx.link(
                "e_sto_con_res",
                end_key.clone(),
                vec![(LinkKey::new(E_STO_CON, end_key.clone()), 1.0)],
            );
            ctx.program.ge(
                Family::SubStorageEnd,
                end_key,
                end,
                LinExpr::param(p, 1.0) - lambda,
            );
        }

        let scale = ctx.weight() * ctx.dt();
        for (key, _) in limited_commodities(data)? {
            let mut used = LinExpr::new();
            for &t in ctx.scope.modelled() {
                used += consumption(ctx, &key, t);
            }
            if used.has_no_vars() {
                continue;
            }
            let ikey = IndexKey::from(&key).at(b);
            let p = ctx.link(
                "budget_res",
                ikey.clone(),
                vec![(LinkKey::new(BUDGET, ikey.clone()), 1.0)],
            );
            ctx.program.le(
                Family::SubBudget,
                ikey,
                used * scale,
                LinExpr::param(p, 1.0) + lambda,
            );
        }
        Ok(())
    }
}

impl CouplingPolicy for TimeHorizon {
    fn method(&self) -> Method {
        Method::TimeHorizon
    }

    fn master_spec(&self) -> Result<InstanceSpec, CouplingError> {
        let scope = Scope::new(self.support.iter().copied())?
            .with_weight_steps(self.weight_steps())
            .with_label("master");
        Ok(InstanceSpec {
            name: "master".to_string(),
            role: Role::Master,
            scope,
            data: self.data.clone(),
            plan: VarPlan::investment_only(),
        })
    }

    fn sub_specs(&self) -> Result<Vec<InstanceSpec>, CouplingError> {
        let mut specs = Vec::new();
        for (a, b) in self.blocks() {
            let steps = self.timesteps.iter().copied().filter(|t| *t >= a && *t <= b);
            let scope = Scope::new(steps)?.with_weight_steps(self.weight_steps());
            specs.push(InstanceSpec {
                name: scope.label.clone(),
                role: Role::Sub,
                scope,
                data: self.data.clone(),
                plan: VarPlan::linked_operation(),
            });
        }
        Ok(specs)
    }

    fn extra_master_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError> {
        match stage {
            BuildStage::Declare => self.declare_master(ctx),
            BuildStage::Constrain => self.constrain_master(ctx),
        }
    }

    fn eta_link(&self, sub: &ProblemInstance) -> Option<LinkKey> {
        Some(LinkKey::new(ETA, IndexKey::step(sub.scope.last())))
    }

    fn extra_sub_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError> {
        match stage {
            BuildStage::Declare => Ok(()),
            BuildStage::Constrain => self.constrain_sub(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decomp_core::{ComKey, Commodity, Site, CO2_LIMIT, TIMESTEP_LENGTH};

    fn data() -> ModelData {
        let mut data = ModelData::new();
        data.global.insert(CO2_LIMIT.to_string(), f64::INFINITY);
        data.global.insert(TIMESTEP_LENGTH.to_string(), 1.0);
        data.sites.insert("Mid".into(), Site::default());
        data.commodities.insert(
            ComKey::new("Mid", "Elec", CommodityType::Demand),
            Commodity::default(),
        );
        let series = (0..=6).map(|t| (t, 1.0)).collect();
        data.demand.insert(("Mid".into(), "Elec".into()), series);
        data
    }

    #[test]
    fn test_support_steps_include_horizon_ends() {
        let policy = TimeHorizon::new(&data(), &[3]).unwrap();
        assert_eq!(policy.support_steps(), &[0, 3, 6]);
        let subs = policy.sub_specs().unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].scope.timesteps(), &[3, 4, 5, 6]);
        assert_eq!(subs[1].name, "t3-t6");
    }

    #[test]
    fn test_unknown_support_step_rejected() {
        assert!(matches!(
            TimeHorizon::new(&data(), &[9]),
            Err(CouplingError::SupportSteps(_))
        ));
    }

    #[test]
    fn test_blocks_share_horizon_weight() {
        let policy = TimeHorizon::new(&data(), &[2]).unwrap();
        let subs = policy.sub_specs().unwrap();
        let master = policy.master_spec().unwrap();
        let w = subs[0].scope.weight(1.0);
        assert!((w - 8760.0 / 6.0).abs() < 1e-9);
        assert!((subs[1].scope.weight(1.0) - w).abs() < 1e-9);
        assert_eq!(master.scope.timesteps(), &[0, 2, 6]);
    }
}
