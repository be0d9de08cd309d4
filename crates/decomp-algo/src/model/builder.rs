//! Generic problem builder.
//!
//! [`ModelBuilder`] turns an [`InstanceSpec`] (data slice, scope, role and
//! variable plan) into a [`ProblemInstance`]. The build runs in a fixed
//! order:
//!
//! 1. declare the variables the plan asks for,
//! 2. let the extension declare its own variables and parameters,
//! 3. run every shared rule of the registry,
//! 4. define one cost variable per cost type,
//! 5. let the extension add its coupling constraints,
//! 6. set the objective.
//!
//! Decomposition policies plug in through the extension closure, so the
//! builder itself knows nothing about masters, subs or cuts.

use super::costs;
use super::rules::SHARED_RULES;
use super::vars::*;
use super::{Family, ProblemInstance, Role, SubPass};
use crate::lp::{IndexKey, LinExpr, LinearProgram, ParamId, VarId};
use decomp_core::{CommodityType, DataError, Direction, ModelData, Scope, Timestep, TraKey};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("unknown cost type '{0}'")]
    UnknownCostType(String),

    #[error("{family} needs variable {variable} which '{instance}' does not declare")]
    MissingVariable {
        instance: String,
        family: Family,
        variable: String,
    },

    #[error("scope {0} selects no site of the model")]
    EmptyScope(String),

    #[error("coupling setup failed: {0}")]
    Coupling(String),
}

/// Extension points of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    /// Variables and parameters; runs before the shared rules
    Declare,
    /// Constraints; runs after costs are defined
    Constrain,
}

/// Everything needed to build one problem.
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub name: String,
    pub role: Role,
    pub scope: Scope,
    pub data: ModelData,
    pub plan: VarPlan,
}

impl InstanceSpec {
    /// A standalone problem over `scope`.
    pub fn normal(data: &ModelData, scope: Scope) -> Self {
        let sliced = scope.slice(data, None);
        Self {
            name: "normal".to_string(),
            role: Role::Normal,
            scope,
            data: sliced,
            plan: VarPlan::normal(),
        }
    }
}

/// Mutable state of a build in progress.
pub struct BuildContext<'a> {
    pub name: &'a str,
    pub role: Role,
    pub scope: &'a Scope,
    pub data: &'a ModelData,
    pub plan: &'a VarPlan,
    pub program: LinearProgram,
    pub vars: ModelVars,
    pub links: Vec<ParamLink>,
    pub(crate) balance: BTreeMap<(Timestep, String, String), LinExpr>,
    pub(crate) sites: Vec<String>,
    weight: f64,
    dt: f64,
}

impl<'a> BuildContext<'a> {
    fn new(
        name: &'a str,
        role: Role,
        scope: &'a Scope,
        data: &'a ModelData,
        plan: &'a VarPlan,
    ) -> Result<Self, BuildError> {
        let sites: Vec<String> = data
            .sites
            .keys()
            .filter(|s| scope.contains_site(s))
            .cloned()
            .collect();
        if sites.is_empty() {
            return Err(BuildError::EmptyScope(scope.to_string()));
        }
        let dt = data.dt();
        Ok(Self {
            name,
            role,
            scope,
            data,
            plan,
            program: LinearProgram::new(),
            vars: ModelVars::default(),
            links: Vec::new(),
            balance: BTreeMap::new(),
            sites,
            weight: scope.weight(dt),
            dt,
        })
    }

    /// Annualization weight of this problem.
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Sites of the data slice that lie inside the scope.
    pub fn sites(&self) -> &[String] {
        &self.sites
    }

    /// Net consumption of `commodity` at `site` in step `t`:
    /// process input minus output, plus transmission export minus import,
    /// plus storage charge minus discharge. Empty when nothing touches it.
    pub fn balance(&self, t: Timestep, site: &str, commodity: &str) -> LinExpr {
        balance_of(&self.balance, t, site, commodity)
    }

    /// Declare the coupling slack `Lambda ≥ 0` (once).
    pub fn lambda(&mut self) -> VarId {
        if let Some(id) = self.vars.lambda {
            return id;
        }
        let id = self.program.add_nonneg(LAMBDA, IndexKey::new());
        self.vars.lambda = Some(id);
        id
    }

    /// Declare a coupling parameter copying `Σ coef · source`.
    pub fn link(
        &mut self,
        name: &'static str,
        key: IndexKey,
        sources: Vec<(LinkKey, f64)>,
    ) -> ParamId {
        let param = self.program.add_param(name, key, 0.0);
        self.links.push(ParamLink { param, sources });
        param
    }

    /// Declare transmission flow variables for the modelled steps.
    pub fn declare_flows(&mut self, key: &TraKey, input: bool, output: bool) {
        for &t in self.scope.modelled() {
            if input {
                let id = self.program.add_nonneg(E_TRA_IN, IndexKey::from(key).at(t));
                self.vars.e_tra_in.insert((t, key.clone()), id);
            }
            if output {
                let id = self.program.add_nonneg(E_TRA_OUT, IndexKey::from(key).at(t));
                self.vars.e_tra_out.insert((t, key.clone()), id);
            }
        }
    }

    pub(crate) fn missing(&self, family: Family, variable: impl Into<String>) -> BuildError {
        BuildError::MissingVariable {
            instance: self.name.to_string(),
            family,
            variable: variable.into(),
        }
    }

    fn declare_plan_vars(&mut self) -> Result<(), BuildError> {
        let data = self.data;
        let scope = self.scope;
        let plan = self.plan;
        let tm = scope.modelled();

        for key in data.processes.keys().filter(|k| scope.contains_site(&k.site)) {
            let ikey = IndexKey::from(key);
            if plan.process != CapacityMode::Absent {
                let cap = self.program.add_nonneg(CAP_PRO, ikey.clone());
                self.vars.cap_pro.insert(key.clone(), cap);
            }
            if plan.process == CapacityMode::Invest {
                let new = self.program.add_nonneg(CAP_PRO_NEW, ikey.clone());
                self.vars.cap_pro_new.insert(key.clone(), new);
            }
            if !plan.operations {
                continue;
            }
            let inputs = data.process_ratios(&key.process, Direction::In);
            let outputs = data.process_ratios(&key.process, Direction::Out);
            for &t in tm {
                let tau = self.program.add_nonneg(TAU_PRO, ikey.clone().at(t));
                self.vars.tau_pro.insert((t, key.clone()), tau);
                for (com, _) in &inputs {
                    let id = self
                        .program
                        .add_nonneg(E_PRO_IN, ikey.clone().at(t).name(com));
                    self.vars.e_pro_in.insert((t, key.clone(), com.clone()), id);
                }
                for (com, _) in &outputs {
                    let id = self
                        .program
                        .add_nonneg(E_PRO_OUT, ikey.clone().at(t).name(com));
                    self.vars.e_pro_out.insert((t, key.clone(), com.clone()), id);
                }
            }
        }

        for key in data.transmissions.keys() {
            let inside_in = scope.contains_site(&key.site_in);
            let inside_out = scope.contains_site(&key.site_out);
            if inside_in && inside_out && plan.transmission != CapacityMode::Absent {
                let cap = self.program.add_nonneg(CAP_TRA, IndexKey::from(key));
                self.vars.cap_tra.insert(key.clone(), cap);
                if plan.transmission == CapacityMode::Invest {
                    let new = self.program.add_nonneg(CAP_TRA_NEW, IndexKey::from(key));
                    self.vars.cap_tra_new.insert(key.clone(), new);
                }
            }
            if plan.operations {
                self.declare_flows(key, inside_in, inside_out);
            }
        }

        for key in data.storages.keys().filter(|k| scope.contains_site(&k.site)) {
            let ikey = IndexKey::from(key);
            if plan.storage != CapacityMode::Absent {
                let c = self.program.add_nonneg(CAP_STO_C, ikey.clone());
                let p = self.program.add_nonneg(CAP_STO_P, ikey.clone());
                self.vars.cap_sto_c.insert(key.clone(), c);
                self.vars.cap_sto_p.insert(key.clone(), p);
            }
            if plan.storage == CapacityMode::Invest {
                let c = self.program.add_nonneg(CAP_STO_C_NEW, ikey.clone());
                let p = self.program.add_nonneg(CAP_STO_P_NEW, ikey.clone());
                self.vars.cap_sto_c_new.insert(key.clone(), c);
                self.vars.cap_sto_p_new.insert(key.clone(), p);
            }
            if !plan.operations {
                continue;
            }
            for &t in tm {
                let i = self.program.add_nonneg(E_STO_IN, ikey.clone().at(t));
                let o = self.program.add_nonneg(E_STO_OUT, ikey.clone().at(t));
                self.vars.e_sto_in.insert((t, key.clone()), i);
                self.vars.e_sto_out.insert((t, key.clone()), o);
            }
            for &t in scope.timesteps() {
                let c = self.program.add_nonneg(E_STO_CON, ikey.clone().at(t));
                self.vars.e_sto_con.insert((t, key.clone()), c);
            }
        }

        if plan.operations {
            for key in data
                .commodities
                .keys()
                .filter(|k| k.kind == CommodityType::Stock && scope.contains_site(&k.site))
            {
                for &t in tm {
                    let id = self.program.add_nonneg(E_CO_STOCK, IndexKey::from(key).at(t));
                    self.vars.e_co_stock.insert((t, key.clone()), id);
                }
            }
        }

        for cost_type in self.role.cost_types() {
            let id = self
                .program
                .add_free(COSTS, IndexKey::from(cost_type.as_str()));
            self.vars.costs.insert(*cost_type, id);
        }
        Ok(())
    }

    /// Collect every flow touching a `(t, site, commodity)` vertex.
    fn index_balances(&mut self) {
        let mut balance: BTreeMap<(Timestep, String, String), LinExpr> = BTreeMap::new();
        let mut add = |t: Timestep, site: &str, com: &str, var: VarId, sign: f64| {
            balance
                .entry((t, site.to_string(), com.to_string()))
                .or_default()
                .add_term(var, sign);
        };
        for ((t, pro, com), v) in &self.vars.e_pro_in {
            add(*t, &pro.site, com, *v, 1.0);
        }
        for ((t, pro, com), v) in &self.vars.e_pro_out {
            add(*t, &pro.site, com, *v, -1.0);
        }
        for ((t, tra), v) in &self.vars.e_tra_in {
            add(*t, &tra.site_in, &tra.commodity, *v, 1.0);
        }
        for ((t, tra), v) in &self.vars.e_tra_out {
            add(*t, &tra.site_out, &tra.commodity, *v, -1.0);
        }
        for ((t, sto), v) in &self.vars.e_sto_in {
            add(*t, &sto.site, &sto.commodity, *v, 1.0);
        }
        for ((t, sto), v) in &self.vars.e_sto_out {
            add(*t, &sto.site, &sto.commodity, *v, -1.0);
        }
        self.balance = balance;
    }

    fn set_objective(&mut self) -> Result<(), BuildError> {
        let total: LinExpr = self.vars.costs.values().map(|v| LinExpr::from(*v)).sum();
        let objective = match self.plan.objective {
            ObjectiveKind::TotalCost => total,
            ObjectiveKind::Lambda => match self.vars.lambda {
                Some(l) => LinExpr::from(l),
                None => return Err(self.missing(Family::DefCosts, LAMBDA)),
            },
            ObjectiveKind::PenalizedCost(penalty) => match self.vars.lambda {
                Some(l) => total + penalty * l,
                None => total,
            },
        };
        self.program.set_objective(objective);
        Ok(())
    }
}

pub(crate) fn balance_of(
    balance: &BTreeMap<(Timestep, String, String), LinExpr>,
    t: Timestep,
    site: &str,
    commodity: &str,
) -> LinExpr {
    balance
        .get(&(t, site.to_string(), commodity.to_string()))
        .cloned()
        .unwrap_or_default()
}

/// Builds one [`ProblemInstance`] from an [`InstanceSpec`].
pub struct ModelBuilder {
    spec: InstanceSpec,
}

impl ModelBuilder {
    pub fn new(spec: InstanceSpec) -> Self {
        Self { spec }
    }

    /// Build with the shared rules only.
    pub fn build_plain(self) -> Result<ProblemInstance, BuildError> {
        self.build(|_, _| Ok(()))
    }

    /// Build, calling `extend` at each [`BuildStage`].
    pub fn build<F>(self, extend: F) -> Result<ProblemInstance, BuildError>
    where
        F: Fn(&mut BuildContext<'_>, BuildStage) -> Result<(), BuildError>,
    {
        let InstanceSpec {
            name,
            role,
            scope,
            data,
            plan,
        } = self.spec;
        data.co2_limit()?;

        let (program, vars, links) = {
            let mut ctx = BuildContext::new(&name, role, &scope, &data, &plan)?;
            ctx.declare_plan_vars()?;
            extend(&mut ctx, BuildStage::Declare)?;
            ctx.index_balances();
            for (family, rule) in SHARED_RULES {
                let rows = rule(&mut ctx)?;
                if rows > 0 {
                    debug!(instance = %name, family = %family, rows, "constraint family built");
                }
            }
            costs::define_costs(&mut ctx)?;
            extend(&mut ctx, BuildStage::Constrain)?;
            ctx.set_objective()?;
            (ctx.program, ctx.vars, ctx.links)
        };

        debug!(
            instance = %name,
            role = %role,
            vars = program.num_vars(),
            constraints = program.num_constraints(),
            params = program.params().len(),
            "problem built"
        );

        Ok(ProblemInstance {
            name,
            role,
            scope,
            data,
            plan,
            program,
            vars,
            links,
            solution: None,
            pass: SubPass::default(),
        })
    }
}
