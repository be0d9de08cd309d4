//! Problem model: roles, cost types, the generic builder and the
//! [`ProblemInstance`] it produces.

mod builder;
mod costs;
mod family;
mod rules;
mod vars;

pub use builder::{BuildContext, BuildError, BuildStage, InstanceSpec, ModelBuilder};
pub use costs::cost_expression;
pub use family::Family;
pub use rules::shared_rule;
pub use vars::*;

use crate::lp::{DualMap, IndexKey, LinExpr, LinearProgram, LpSolution, VarId};
use crate::solver::{LpBackend, LpError, SolverSettings};
use decomp_core::{ModelData, Scope};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Role of a problem within a (possibly decomposed) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Normal,
    Master,
    Sub,
    /// A regional sub described by its own data directory
    SubWithCoupledFile,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Normal => "normal",
            Role::Master => "master",
            Role::Sub => "sub",
            Role::SubWithCoupledFile => "sub-with-coupled-file",
        }
    }

    /// Cost types that get a `costs` variable. Future costs only exist
    /// on decomposed roles.
    pub fn cost_types(&self) -> &'static [CostType] {
        match self {
            Role::Normal => &CostType::OPERATIONAL_AND_CAPITAL,
            _ => &CostType::ALL,
        }
    }

    pub fn is_sub(&self) -> bool {
        matches!(self, Role::Sub | Role::SubWithCoupledFile)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CostType {
    Invest,
    Fixed,
    Variable,
    Fuel,
    Environmental,
    FutureCosts,
}

impl CostType {
    pub const ALL: [CostType; 6] = [
        CostType::Invest,
        CostType::Fixed,
        CostType::Variable,
        CostType::Fuel,
        CostType::Environmental,
        CostType::FutureCosts,
    ];

    const OPERATIONAL_AND_CAPITAL: [CostType; 5] = [
        CostType::Invest,
        CostType::Fixed,
        CostType::Variable,
        CostType::Fuel,
        CostType::Environmental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostType::Invest => "Invest",
            CostType::Fixed => "Fixed",
            CostType::Variable => "Variable",
            CostType::Fuel => "Fuel",
            CostType::Environmental => "Environmental",
            CostType::FutureCosts => "Future costs",
        }
    }
}

impl fmt::Display for CostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Invest" => Ok(CostType::Invest),
            "Fixed" => Ok(CostType::Fixed),
            "Variable" => Ok(CostType::Variable),
            "Fuel" => Ok(CostType::Fuel),
            "Environmental" => Ok(CostType::Environmental),
            "Future costs" | "FutureCosts" => Ok(CostType::FutureCosts),
            other => Err(BuildError::UnknownCostType(other.to_string())),
        }
    }
}

/// One solved capacity total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacityValue {
    pub variable: &'static str,
    pub key: IndexKey,
    pub value: f64,
}

/// Which objective a coupled sub was last solved with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubPass {
    /// Minimize the coupling slack `Λ`
    #[default]
    Feasibility,
    /// Minimize cost with `Λ ≤ ε`
    Cost,
}

/// One concrete linear program of a run.
#[derive(Debug, Clone)]
pub struct ProblemInstance {
    pub name: String,
    pub role: Role,
    pub scope: Scope,
    pub data: ModelData,
    pub plan: VarPlan,
    pub program: LinearProgram,
    pub vars: ModelVars,
    pub links: Vec<ParamLink>,
    pub solution: Option<LpSolution>,
    pub pass: SubPass,
}

impl ProblemInstance {
    /// Role, name and scope, used to name a failing problem.
    pub fn identity(&self) -> String {
        format!("{} '{}' ({})", self.role, self.name, self.scope)
    }

    pub fn solve(
        &mut self,
        backend: &dyn LpBackend,
        settings: &SolverSettings,
    ) -> Result<&LpSolution, LpError> {
        let solution = backend.solve(&self.program, settings)?;
        Ok(self.solution.insert(solution))
    }

    /// Solve a coupled sub in up to two passes. The first minimizes `Λ`
    /// with `Λ` free; when that leaves `Λ ≤ epsilon`, `Λ` is capped at
    /// `epsilon` and the sub is solved again for minimum cost. Instances
    /// without a coupling slack are solved once as built.
    pub fn solve_two_pass(
        &mut self,
        backend: &dyn LpBackend,
        settings: &SolverSettings,
        epsilon: f64,
    ) -> Result<(), LpError> {
        let Some(lambda) = self.vars.lambda else {
            return self.solve(backend, settings).map(|_| ());
        };
        self.pass = SubPass::Feasibility;
        self.program.set_upper(lambda, f64::INFINITY);
        self.program.set_objective(LinExpr::from(lambda));
        let slack = self.solve(backend, settings)?.value(lambda);
        if slack > epsilon {
            return Ok(());
        }

        self.pass = SubPass::Cost;
        self.program.set_upper(lambda, epsilon.max(0.0));
        self.program.set_objective(self.cost_total());
        self.solve(backend, settings).map(|_| ())
    }

    /// Sum of all cost variables.
    pub fn cost_total(&self) -> LinExpr {
        self.vars.costs.values().map(|v| LinExpr::from(*v)).sum()
    }

    pub fn objective(&self) -> Option<f64> {
        self.solution.as_ref().map(|s| s.objective)
    }

    pub fn value(&self, var: VarId) -> Option<f64> {
        self.solution.as_ref().map(|s| s.value(var))
    }

    /// Solved value of a variable addressed by name and key.
    pub fn link_value(&self, link: &LinkKey) -> Option<f64> {
        let var = self.program.find_var(link.var, &link.key)?;
        self.value(var)
    }

    /// Solved coupling slack, zero when the problem has none.
    pub fn lambda(&self) -> f64 {
        self.vars
            .lambda
            .and_then(|l| self.value(l))
            .unwrap_or(0.0)
    }

    pub fn costs(&self) -> BTreeMap<CostType, f64> {
        self.vars
            .costs
            .iter()
            .filter_map(|(ct, v)| self.value(*v).map(|x| (*ct, x)))
            .collect()
    }

    /// All solved costs except the future-cost placeholder.
    pub fn realized_cost(&self) -> f64 {
        self.costs()
            .into_iter()
            .filter(|(ct, _)| *ct != CostType::FutureCosts)
            .map(|(_, v)| v)
            .sum()
    }

    /// Solved future-cost placeholders summed.
    pub fn eta_total(&self) -> f64 {
        self.vars.eta.values().filter_map(|v| self.value(*v)).sum()
    }

    pub fn capacities(&self) -> Vec<CapacityValue> {
        self.vars
            .capacity_vars()
            .into_iter()
            .filter_map(|(variable, key, var)| {
                self.value(var).map(|value| CapacityValue {
                    variable,
                    key,
                    value,
                })
            })
            .collect()
    }

    pub fn duals(&self) -> Option<DualMap> {
        DualMap::from_solution(&self.program, self.solution.as_ref()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_type_parse() {
        assert_eq!("Fuel".parse::<CostType>().unwrap(), CostType::Fuel);
        assert_eq!("Future costs".parse::<CostType>().unwrap(), CostType::FutureCosts);
        assert!(matches!(
            "fuel ".parse::<CostType>(),
            Err(BuildError::UnknownCostType(_))
        ));
    }

    #[test]
    fn test_future_costs_only_on_decomposed_roles() {
        assert!(!Role::Normal.cost_types().contains(&CostType::FutureCosts));
        assert!(Role::Sub.cost_types().contains(&CostType::FutureCosts));
        assert!(Role::SubWithCoupledFile.is_sub());
        assert!(!Role::Master.is_sub());
    }
}
