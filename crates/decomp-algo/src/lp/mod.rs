//! Solver-independent linear programs.
//!
//! A [`LinearProgram`] is a flat list of bounded variables, constraints
//! tagged with the family that produced them, and mutable parameters that
//! may only appear on constraint right-hand sides. Tagging every row with
//! `(family, index key)` keeps provenance traceable: dual values come back
//! keyed the same way (see [`DualMap`]).

mod expr;
mod solution;

pub use expr::LinExpr;
pub use solution::{DualMap, LpSolution};

use crate::model::Family;
use decomp_core::{ComKey, ProKey, StoKey, Timestep, TraKey};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(pub usize);

/// Explicit index tuple of a variable or constraint: an optional timestep
/// followed by names taken from the table keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct IndexKey {
    pub t: Option<Timestep>,
    pub names: Vec<String>,
}

impl IndexKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(t: Timestep) -> Self {
        Self {
            t: Some(t),
            names: Vec::new(),
        }
    }

    pub fn at(mut self, t: Timestep) -> Self {
        self.t = Some(t);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut first = true;
        if let Some(t) = self.t {
            write!(f, "t={t}")?;
            first = false;
        }
        for name in &self.names {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        f.write_str("]")
    }
}

impl From<&str> for IndexKey {
    fn from(name: &str) -> Self {
        IndexKey::new().name(name)
    }
}

impl From<&ComKey> for IndexKey {
    fn from(k: &ComKey) -> Self {
        IndexKey::new()
            .name(&k.site)
            .name(&k.commodity)
            .name(k.kind.as_str())
    }
}

impl From<&ProKey> for IndexKey {
    fn from(k: &ProKey) -> Self {
        IndexKey::new().name(&k.site).name(&k.process)
    }
}

impl From<&TraKey> for IndexKey {
    fn from(k: &TraKey) -> Self {
        IndexKey::new()
            .name(&k.site_in)
            .name(&k.site_out)
            .name(&k.transmission)
            .name(&k.commodity)
    }
}

impl From<&StoKey> for IndexKey {
    fn from(k: &StoKey) -> Self {
        IndexKey::new()
            .name(&k.site)
            .name(&k.storage)
            .name(&k.commodity)
    }
}

/// Relation between a constraint body and its right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: &'static str,
    pub key: IndexKey,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: &'static str,
    pub key: IndexKey,
    pub value: f64,
}

/// `expr ⋈ 0`, stored as the difference of the two sides it was built from.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub family: Family,
    pub key: IndexKey,
    pub expr: LinExpr,
    pub sense: Sense,
}

/// One lowered row `Σ a·x ⋈ rhs` with parameters evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub coeffs: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    vars: Vec<Variable>,
    params: Vec<Parameter>,
    constraints: Vec<Constraint>,
    objective: LinExpr,
    index: HashMap<(Family, IndexKey), ConstraintId>,
    var_index: HashMap<(&'static str, IndexKey), VarId>,
}

impl LinearProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_var(&mut self, name: &'static str, key: IndexKey, lower: f64, upper: f64) -> VarId {
        let id = VarId(self.vars.len());
        self.var_index.insert((name, key.clone()), id);
        self.vars.push(Variable {
            name,
            key,
            lower,
            upper,
        });
        id
    }

    /// Look a variable up by the name and key it was declared with.
    pub fn find_var(&self, name: &'static str, key: &IndexKey) -> Option<VarId> {
        self.var_index.get(&(name, key.clone())).copied()
    }

    /// Non-negative, unbounded above.
    pub fn add_nonneg(&mut self, name: &'static str, key: IndexKey) -> VarId {
        self.add_var(name, key, 0.0, f64::INFINITY)
    }

    pub fn add_free(&mut self, name: &'static str, key: IndexKey) -> VarId {
        self.add_var(name, key, f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn add_param(&mut self, name: &'static str, key: IndexKey, value: f64) -> ParamId {
        self.params.push(Parameter { name, key, value });
        ParamId(self.params.len() - 1)
    }

    /// Move a variable's upper bound; the lower bound is kept.
    pub fn set_upper(&mut self, id: VarId, upper: f64) {
        self.vars[id.0].upper = upper;
    }

    pub fn set_param(&mut self, id: ParamId, value: f64) {
        self.params[id.0].value = value;
    }

    pub fn param_value(&self, id: ParamId) -> f64 {
        self.params[id.0].value
    }

    /// Add `lhs ⋈ rhs`. A later constraint with the same family and key
    /// replaces the index entry; families are expected to use unique keys.
    pub fn add_constraint(
        &mut self,
        family: Family,
        key: IndexKey,
        lhs: LinExpr,
        sense: Sense,
        rhs: LinExpr,
    ) -> ConstraintId {
        let id = ConstraintId(self.constraints.len());
        self.index.insert((family, key.clone()), id);
        self.constraints.push(Constraint {
            family,
            key,
            expr: lhs - rhs,
            sense,
        });
        id
    }

    pub fn le(
        &mut self,
        family: Family,
        key: IndexKey,
        lhs: impl Into<LinExpr>,
        rhs: impl Into<LinExpr>,
    ) -> ConstraintId {
        self.add_constraint(family, key, lhs.into(), Sense::Le, rhs.into())
    }

    pub fn ge(
        &mut self,
        family: Family,
        key: IndexKey,
        lhs: impl Into<LinExpr>,
        rhs: impl Into<LinExpr>,
    ) -> ConstraintId {
        self.add_constraint(family, key, lhs.into(), Sense::Ge, rhs.into())
    }

    pub fn eq(
        &mut self,
        family: Family,
        key: IndexKey,
        lhs: impl Into<LinExpr>,
        rhs: impl Into<LinExpr>,
    ) -> ConstraintId {
        self.add_constraint(family, key, lhs.into(), Sense::Eq, rhs.into())
    }

    pub fn set_objective(&mut self, objective: LinExpr) {
        self.objective = objective;
    }

    pub fn objective(&self) -> &LinExpr {
        &self.objective
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn param_values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn constraint_id(&self, family: Family, key: &IndexKey) -> Option<ConstraintId> {
        self.index.get(&(family, key.clone())).copied()
    }

    pub fn family_count(&self, family: Family) -> usize {
        self.constraints.iter().filter(|c| c.family == family).count()
    }

    /// Lower constraint `id` to `Σ a·x ⋈ rhs` with current parameter values.
    pub fn row(&self, id: ConstraintId, param_values: &[f64]) -> Row {
        let c = &self.constraints[id.0];
        Row {
            coeffs: c
                .expr
                .merged_terms()
                .into_iter()
                .map(|(v, a)| (v.0, a))
                .collect(),
            sense: c.sense,
            rhs: -c.expr.fixed_part(param_values),
        }
    }

    /// Objective coefficients per variable index and the constant offset.
    pub fn objective_coefficients(&self) -> (Vec<f64>, f64) {
        let mut q = vec![0.0; self.vars.len()];
        for (v, c) in self.objective.merged_terms() {
            q[v.0] += c;
        }
        (q, self.objective.fixed_part(&self.param_values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lowering_moves_params_to_rhs() {
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg("x", IndexKey::new());
        let p = lp.add_param("p", IndexKey::new(), 7.0);
        // x ≤ p + 1
        let id = lp.le(
            Family::SubCapacity,
            IndexKey::from("x"),
            x,
            LinExpr::param(p, 1.0) + 1.0,
        );
        let row = lp.row(id, &lp.param_values());
        assert_eq!(row.coeffs, vec![(0, 1.0)]);
        assert_eq!(row.sense, Sense::Le);
        assert!((row.rhs - 8.0).abs() < 1e-12);
        assert_eq!(lp.constraint_id(Family::SubCapacity, &IndexKey::from("x")), Some(id));
        assert_eq!(lp.find_var("x", &IndexKey::new()), Some(x));
        assert_eq!(lp.find_var("y", &IndexKey::new()), None);
    }

    #[test]
    fn test_set_upper_keeps_lower_bound() {
        let mut lp = LinearProgram::new();
        let x = lp.add_nonneg("x", IndexKey::new());
        lp.set_upper(x, 1e-6);
        assert_eq!(lp.variables()[x.0].lower, 0.0);
        assert_eq!(lp.variables()[x.0].upper, 1e-6);
        lp.set_upper(x, f64::INFINITY);
        assert!(lp.variables()[x.0].upper.is_infinite());
    }

    #[test]
    fn test_index_key_display() {
        let key = IndexKey::from(&ProKey::new("Mid", "Gas plant")).at(4);
        assert_eq!(key.to_string(), "[t=4, Mid, Gas plant]");
    }
}
