//! Coupling policies.
//!
//! A policy turns one model into a master and a set of subs for a specific
//! decomposition method. It decides which part of the model each problem
//! covers, adds the linking variables, parameters and constraints through
//! the builder's extension stages, copies master decisions into sub
//! parameters, and turns sub duals into cuts.
//!
//! | Method | Sub covers | Cut |
//! |--------|------------|-----|
//! | [`TimeHorizon`] | a block between two support steps | feasibility or cost, one per sub |
//! | [`Regional`] | a region (or a coupled data file) | feasibility or cost, one per sub |
//! | [`Stochastic`] | one stage under one realization | probability-weighted, one per stage |
//!
//! ## Benders cuts
//!
//! `Λ` relaxes only the physical coupling rows of a sub (capacities,
//! boundary storage, budgets, border flows). A Benders sub is first solved
//! for minimum `Λ`. Its optimal value is a convex function of the coupling
//! parameters `p`, so at the current master point `x*`
//!
//! ```text
//! Λ(x) ≥ Λ* + Σ_k g_k (x_k − x*_k),   g_k = ∂Λ/∂x_k
//! ```
//!
//! and requiring `Λ(x) ≤ 0` yields the feasibility cut
//! `Σ g_k x_k ≤ Σ g_k x*_k − Λ*`. When `Λ* ≤ ε` the sub is solved again for
//! minimum cost `Q` with `Λ ≤ ε`, and its value function bounds the
//! master's future cost of that sub from below:
//!
//! ```text
//! eta ≥ Q* + Σ_k g_k (x_k − x*_k),   g_k = ∂Q/∂x_k
//! ```
//!
//! The gradient comes from duals: a parameter `p_j` entering row `i` with
//! coefficient `c_ij` has `∂opt/∂p_j = −Σ_i dual_i · c_ij`.

mod regional;
mod sddp;
mod time_horizon;

pub use regional::Regional;
pub use sddp::Stochastic;
pub use time_horizon::TimeHorizon;

use crate::lp::{ConstraintId, IndexKey, LinExpr};
use crate::model::{
    BuildContext, BuildError, BuildStage, Family, InstanceSpec, LinkKey, ProblemInstance, SubPass,
    CAP_PRO, CAP_PRO_NEW, CAP_STO_C, CAP_STO_C_NEW, CAP_STO_P, CAP_STO_P_NEW, CAP_TRA, CAP_TRA_NEW,
};
use decomp_core::{ComKey, CommodityType, DataError, ModelData, CO2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Coefficients smaller than this are dropped from cuts.
const COEF_EPS: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum CouplingError {
    #[error("{0} has not been solved")]
    Unsolved(String),

    #[error("{0} carries no dual values; solve it with a backend that returns duals")]
    NoDuals(String),

    #[error("coupling source {link} does not exist in {instance}")]
    MissingSource { instance: String, link: String },

    #[error("invalid support steps: {0}")]
    SupportSteps(String),

    #[error("invalid region configuration: {0}")]
    Region(String),

    #[error("invalid realizations: {0}")]
    Realizations(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// Decomposition method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    #[serde(alias = "divide-timesteps")]
    TimeHorizon,
    Regional,
    Sddp,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::TimeHorizon => "time-horizon",
            Method::Regional => "regional",
            Method::Sddp => "sddp",
        }
    }

    /// Methods whose bounds move monotonically.
    pub fn is_benders(&self) -> bool {
        !matches!(self, Method::Sddp)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "time-horizon" | "divide-timesteps" => Ok(Method::TimeHorizon),
            "regional" => Ok(Method::Regional),
            "sddp" => Ok(Method::Sddp),
            other => Err(format!(
                "unknown decomposition method '{other}' (expected time-horizon, regional or sddp)"
            )),
        }
    }
}

/// A linear inequality `Σ coef · x ≤ rhs` over variables addressed by
/// [`LinkKey`], so it can be added to any problem declaring them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cut {
    /// Name of the problem (or stage) whose duals produced the cut
    pub source: String,
    pub iteration: usize,
    pub coefficients: Vec<(LinkKey, f64)>,
    pub rhs: f64,
    /// Coupling slack of the source when the cut was generated
    pub lambda: f64,
}

impl Cut {
    /// Left-hand side expressed in `target`'s variables.
    pub fn expression(&self, target: &ProblemInstance) -> Result<LinExpr, CouplingError> {
        let mut expr = LinExpr::new();
        for (link, coef) in &self.coefficients {
            let var = target.program.find_var(link.var, &link.key).ok_or_else(|| {
                CouplingError::MissingSource {
                    instance: target.identity(),
                    link: link.to_string(),
                }
            })?;
            expr.add_term(var, *coef);
        }
        Ok(expr)
    }

    /// Append the cut to `target`. Cuts are permanent.
    pub fn add_to(&self, target: &mut ProblemInstance) -> Result<ConstraintId, CouplingError> {
        let expr = self.expression(target)?;
        let key = IndexKey::new()
            .name(&self.source)
            .name(format!("iteration {}", self.iteration));
        Ok(target.program.le(Family::Cut, key, expr, self.rhs))
    }

    /// `lhs − rhs` at `target`'s current solution; positive means the
    /// current point violates the cut.
    pub fn violation(&self, target: &ProblemInstance) -> Result<f64, CouplingError> {
        let mut lhs = 0.0;
        for (link, coef) in &self.coefficients {
            let value = target
                .link_value(link)
                .ok_or_else(|| CouplingError::Unsolved(target.identity()))?;
            lhs += coef * value;
        }
        Ok(lhs - self.rhs)
    }

    /// Divide by the magnitude of the future-cost coefficient, so the cut
    /// reads as `eta ≥ ...`. Cuts without an eta term are left unchanged.
    pub fn readable(mut self, eta_var: &str) -> Self {
        let scale = self
            .coefficients
            .iter()
            .find(|(link, coef)| link.var == eta_var && coef.abs() > COEF_EPS)
            .map(|(_, coef)| coef.abs());
        if let Some(scale) = scale {
            for (_, coef) in self.coefficients.iter_mut() {
                *coef /= scale;
            }
            self.rhs /= scale;
        }
        self
    }

    /// Probability-weighted sum of per-realization cuts.
    pub fn expectation(
        parts: &[(f64, Cut)],
        source: impl Into<String>,
        iteration: usize,
    ) -> Self {
        let mut coefficients: BTreeMap<LinkKey, f64> = BTreeMap::new();
        let mut rhs = 0.0;
        let mut lambda: f64 = 0.0;
        for (probability, cut) in parts {
            for (link, coef) in &cut.coefficients {
                *coefficients.entry(link.clone()).or_insert(0.0) += probability * coef;
            }
            rhs += probability * cut.rhs;
            lambda = lambda.max(cut.lambda);
        }
        Self {
            source: source.into(),
            iteration,
            coefficients: coefficients
                .into_iter()
                .filter(|(_, c)| c.abs() > COEF_EPS)
                .collect(),
            rhs,
            lambda,
        }
    }
}

/// The extension points every decomposition method provides.
pub trait CouplingPolicy: Send + Sync {
    fn method(&self) -> Method;

    fn master_spec(&self) -> Result<InstanceSpec, CouplingError>;

    fn sub_specs(&self) -> Result<Vec<InstanceSpec>, CouplingError>;

    fn extra_master_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError>;

    fn extra_sub_constructs(
        &self,
        ctx: &mut BuildContext<'_>,
        stage: BuildStage,
    ) -> Result<(), BuildError>;

    /// Copy the solved master values into the sub's coupling parameters.
    fn sync_master_to_sub(
        &self,
        master: &ProblemInstance,
        sub: &mut ProblemInstance,
    ) -> Result<(), CouplingError> {
        sync_links(master, sub)
    }

    /// Master future-cost variable standing for `sub`'s cost, if any.
    fn eta_link(&self, _sub: &ProblemInstance) -> Option<LinkKey> {
        None
    }

    /// Cut from one solved sub, `None` when the sub needs none: a
    /// feasibility cut after a slack pass, a cost cut after a cost pass.
    fn generate_cut(
        &self,
        sub: &ProblemInstance,
        master: &ProblemInstance,
        iteration: usize,
        epsilon: f64,
    ) -> Result<Option<Cut>, CouplingError> {
        match (sub.pass, self.eta_link(sub)) {
            (SubPass::Cost, Some(eta)) => optimality_cut(sub, master, eta, iteration, epsilon),
            (SubPass::Cost, None) => Ok(None),
            (SubPass::Feasibility, _) => benders_cut(sub, iteration, epsilon),
        }
    }

    /// Cost of the capacity the subs used beyond what the master bought.
    fn upper_bound_extra(&self, master: &ProblemInstance, subs: &[ProblemInstance]) -> f64 {
        capacity_excess_cost(master, subs)
    }
}

/// Set every coupling parameter of `child` from `parent`'s solution.
pub fn sync_links(parent: &ProblemInstance, child: &mut ProblemInstance) -> Result<(), CouplingError> {
    if parent.solution.is_none() {
        return Err(CouplingError::Unsolved(parent.identity()));
    }
    let mut values = Vec::with_capacity(child.links.len());
    for link in &child.links {
        let mut value = 0.0;
        for (source, coef) in &link.sources {
            let x = parent
                .link_value(source)
                .ok_or_else(|| CouplingError::MissingSource {
                    instance: parent.identity(),
                    link: source.to_string(),
                })?;
            value += coef * x;
        }
        values.push((link.param, value));
    }
    for (param, value) in values {
        child.program.set_param(param, value);
    }
    Ok(())
}

/// Objective gradient with respect to the linked master variables and
/// the current value of `Σ g_k x*_k`.
pub fn link_gradient(
    sub: &ProblemInstance,
) -> Result<(BTreeMap<LinkKey, f64>, f64), CouplingError> {
    let solution = sub
        .solution
        .as_ref()
        .ok_or_else(|| CouplingError::Unsolved(sub.identity()))?;
    let duals = solution
        .duals
        .as_ref()
        .ok_or_else(|| CouplingError::NoDuals(sub.identity()))?;

    let mut param_grad = vec![0.0; sub.program.params().len()];
    for (constraint, dual) in sub.program.constraints().iter().zip(duals) {
        if *dual == 0.0 {
            continue;
        }
        for (param, coef) in constraint.expr.merged_params() {
            param_grad[param.0] -= dual * coef;
        }
    }

    let mut gradient: BTreeMap<LinkKey, f64> = BTreeMap::new();
    let mut at_point = 0.0;
    for link in &sub.links {
        let g = param_grad[link.param.0];
        if g.abs() <= COEF_EPS {
            continue;
        }
        at_point += g * sub.program.param_value(link.param);
        for (source, coef) in &link.sources {
            *gradient.entry(source.clone()).or_insert(0.0) += g * coef;
        }
    }
    gradient.retain(|_, g| g.abs() > COEF_EPS);
    Ok((gradient, at_point))
}

/// Benders cut forcing the sub's coupling slack to zero; skipped when the
/// slack is already negligible.
pub fn benders_cut(
    sub: &ProblemInstance,
    iteration: usize,
    epsilon: f64,
) -> Result<Option<Cut>, CouplingError> {
    let lambda = sub.lambda();
    if lambda < epsilon {
        return Ok(None);
    }
    let (gradient, at_point) = link_gradient(sub)?;
    if gradient.is_empty() {
        return Ok(None);
    }
    Ok(Some(Cut {
        source: sub.name.clone(),
        iteration,
        coefficients: gradient.into_iter().collect(),
        rhs: at_point - lambda,
        lambda,
    }))
}

/// Linearization of a sub's optimal value at the current parent point:
/// `Σ g_k x_k − Q ≤ Σ g_k x*_k − Q*`, without the `Q` term.
pub fn value_function_cut(sub: &ProblemInstance, iteration: usize) -> Result<Cut, CouplingError> {
    let objective = sub
        .objective()
        .ok_or_else(|| CouplingError::Unsolved(sub.identity()))?;
    let (gradient, at_point) = link_gradient(sub)?;
    Ok(Cut {
        source: sub.name.clone(),
        iteration,
        coefficients: gradient.into_iter().collect(),
        rhs: at_point - objective,
        lambda: sub.lambda(),
    })
}

/// Cost cut `eta ≥ Q* + Σ g_k (x_k − x*_k)` from a sub solved for cost,
/// skipped when `parent`'s current point violates it by no more than
/// `epsilon · max(1, |Q*|)`.
pub fn optimality_cut(
    sub: &ProblemInstance,
    parent: &ProblemInstance,
    eta: LinkKey,
    iteration: usize,
    epsilon: f64,
) -> Result<Option<Cut>, CouplingError> {
    let objective = sub
        .objective()
        .ok_or_else(|| CouplingError::Unsolved(sub.identity()))?;
    let mut cut = value_function_cut(sub, iteration)?;
    cut.coefficients.push((eta, -1.0));
    let scale = objective.abs().max(1.0);
    if cut.violation(parent)? <= epsilon * scale {
        return Ok(None);
    }
    Ok(Some(cut))
}

/// Capacity totals of a sub tied to master values. Upper bounds always;
/// lower bounds for the variables `floor` selects.
pub(crate) fn link_capacities(
    ctx: &mut BuildContext<'_>,
    floor: impl Fn(&'static str) -> bool,
) {
    let lambda = ctx.lambda();
    let mut linked = Vec::new();
    for (key, var) in &ctx.vars.cap_pro {
        if !ctx.vars.cap_pro_new.contains_key(key) {
            linked.push((CAP_PRO, IndexKey::from(key), *var));
        }
    }
    for (key, var) in &ctx.vars.cap_tra {
        if !ctx.vars.cap_tra_new.contains_key(key) {
            linked.push((CAP_TRA, IndexKey::from(key), *var));
        }
    }
    for (key, var) in &ctx.vars.cap_sto_c {
        if !ctx.vars.cap_sto_c_new.contains_key(key) {
            linked.push((CAP_STO_C, IndexKey::from(key), *var));
        }
    }
    for (key, var) in &ctx.vars.cap_sto_p {
        if !ctx.vars.cap_sto_p_new.contains_key(key) {
            linked.push((CAP_STO_P, IndexKey::from(key), *var));
        }
    }
    for (name, key, var) in linked {
        let param = ctx.link(
            "cap_res",
            key.clone().name(name),
            vec![(LinkKey::new(name, key.clone()), 1.0)],
        );
        let row_key = key.name(name);
        ctx.program.le(
            Family::SubCapacity,
            row_key.clone(),
            var,
            LinExpr::param(param, 1.0) + lambda,
        );
        if floor(name) {
            ctx.program.ge(
                Family::SubCapacityFloor,
                row_key,
                var,
                LinExpr::param(param, 1.0) - lambda,
            );
        }
    }
}

/// Commodities whose consumption over the horizon is limited: stock and
/// environmental commodities with a finite `max`, and CO2 when the global
/// cap is finite. Returns each key with its own limit (∞ when only the
/// global cap applies).
pub(crate) fn limited_commodities(data: &ModelData) -> Result<Vec<(ComKey, f64)>, DataError> {
    let co2_limit = data.co2_limit()?;
    let global = co2_limit.is_finite() && co2_limit >= 0.0;
    Ok(data
        .commodities
        .iter()
        .filter(|(key, com)| match key.kind {
            CommodityType::Stock => com.max.is_finite(),
            CommodityType::Env => com.max.is_finite() || (global && key.commodity == CO2),
            _ => false,
        })
        .map(|(key, com)| (key.clone(), com.max))
        .collect())
}

/// Consumption of a limited commodity in step `t`: stock purchase or
/// emission (negative balance).
pub(crate) fn consumption(ctx: &BuildContext<'_>, key: &ComKey, t: decomp_core::Timestep) -> LinExpr {
    match key.kind {
        CommodityType::Stock => ctx
            .vars
            .e_co_stock
            .get(&(t, key.clone()))
            .map(|v| LinExpr::from(*v))
            .unwrap_or_default(),
        _ => -ctx.balance(t, &key.site, &key.commodity),
    }
}

/// For every master capacity, the largest amount any sub used beyond it,
/// priced at annualized investment plus fixed cost.
pub fn capacity_excess_cost(master: &ProblemInstance, subs: &[ProblemInstance]) -> f64 {
    let data = &master.data;
    let mut priced: Vec<(LinkKey, f64, f64)> = Vec::new();
    let mv = &master.vars;
    for (key, var) in &mv.cap_pro {
        if mv.cap_pro_new.contains_key(key) {
            let p = &data.processes[key];
            priced.push((
                LinkKey::new(CAP_PRO, IndexKey::from(key)),
                master.value(*var).unwrap_or(0.0),
                p.inv_cost * p.annuity() + p.fix_cost,
            ));
        }
    }
    for (key, var) in &mv.cap_tra {
        if mv.cap_tra_new.contains_key(key) {
            let t = &data.transmissions[key];
            priced.push((
                LinkKey::new(CAP_TRA, IndexKey::from(key)),
                master.value(*var).unwrap_or(0.0),
                t.inv_cost * t.annuity() + t.fix_cost,
            ));
        }
    }
    for (key, var) in &mv.cap_sto_c {
        if mv.cap_sto_c_new.contains_key(key) {
            let s = &data.storages[key];
            priced.push((
                LinkKey::new(CAP_STO_C, IndexKey::from(key)),
                master.value(*var).unwrap_or(0.0),
                s.inv_cost_c * s.annuity() + s.fix_cost_c,
            ));
        }
    }
    for (key, var) in &mv.cap_sto_p {
        if mv.cap_sto_p_new.contains_key(key) {
            let s = &data.storages[key];
            priced.push((
                LinkKey::new(CAP_STO_P, IndexKey::from(key)),
                master.value(*var).unwrap_or(0.0),
                s.inv_cost_p * s.annuity() + s.fix_cost_p,
            ));
        }
    }

    let mut extra = 0.0;
    for (link, bought, unit_cost) in priced {
        let excess = subs
            .iter()
            .filter(|sub| {
                // only subs holding a linked copy of the capacity
                let new_var = match link.var {
                    CAP_PRO => CAP_PRO_NEW,
                    CAP_TRA => CAP_TRA_NEW,
                    CAP_STO_C => CAP_STO_C_NEW,
                    _ => CAP_STO_P_NEW,
                };
                sub.program.find_var(new_var, &link.key).is_none()
            })
            .filter_map(|sub| sub.link_value(&link))
            .map(|used| (used - bought).max(0.0))
            .fold(0.0, f64::max);
        extra += excess * unit_cost;
    }
    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ETA;

    fn cut(coefficients: Vec<(LinkKey, f64)>, rhs: f64) -> Cut {
        Cut {
            source: "sub".into(),
            iteration: 1,
            coefficients,
            rhs,
            lambda: 1.0,
        }
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("divide-timesteps".parse::<Method>(), Ok(Method::TimeHorizon));
        assert_eq!("Regional".parse::<Method>(), Ok(Method::Regional));
        assert_eq!("time_horizon".parse::<Method>(), Ok(Method::TimeHorizon));
        assert!("dantzig-wolfe".parse::<Method>().is_err());
        assert!(!Method::Sddp.is_benders());
    }

    #[test]
    fn test_readable_cut_normalizes_eta() {
        let eta = LinkKey::new(ETA, IndexKey::step(3));
        let cap = LinkKey::new(CAP_PRO, IndexKey::from("x"));
        let c = cut(vec![(eta.clone(), -4.0), (cap.clone(), -8.0)], -20.0).readable(ETA);
        assert_eq!(c.coefficients, vec![(eta, -1.0), (cap, -2.0)]);
        assert!((c.rhs + 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_readable_cut_without_eta_is_unchanged() {
        let cap = LinkKey::new(CAP_PRO, IndexKey::from("x"));
        let c = cut(vec![(cap, -8.0)], -20.0);
        assert_eq!(c.clone().readable(ETA), c);
    }

    #[test]
    fn test_expectation_weights_parts() {
        let cap = LinkKey::new(CAP_PRO, IndexKey::from("x"));
        let low = cut(vec![(cap.clone(), -2.0)], -10.0);
        let high = cut(vec![(cap.clone(), -6.0)], -30.0);
        let mean = Cut::expectation(&[(0.25, low), (0.75, high)], "stage 1", 2);
        assert_eq!(mean.coefficients.len(), 1);
        assert!((mean.coefficients[0].1 + 5.0).abs() < 1e-12);
        assert!((mean.rhs + 25.0).abs() < 1e-12);
        assert_eq!(mean.source, "stage 1");
    }
}
