use super::{ConstraintId, IndexKey, LinExpr, LinearProgram, VarId};
use crate::model::Family;
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of one successful solve.
///
/// `duals[i]` is `∂ objective / ∂ rhs` of constraint `i` written as
/// `body ⋈ rhs`; non-positive for binding `≤` rows and non-negative for
/// binding `≥` rows of a minimization.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LpSolution {
    pub objective: f64,
    pub values: Vec<f64>,
    pub duals: Option<Vec<f64>>,
    pub iterations: u32,
    pub solve_time_ms: u128,
}

impl LpSolution {
    pub fn value(&self, var: VarId) -> f64 {
        self.values[var.0]
    }

    pub fn dual(&self, id: ConstraintId) -> Option<f64> {
        self.duals.as_ref().map(|d| d[id.0])
    }

    pub fn evaluate(&self, expr: &LinExpr, param_values: &[f64]) -> f64 {
        expr.evaluate(&self.values, param_values)
    }
}

/// Sparse dual values keyed by `(family, index key)`.
///
/// A constraint the builder skipped (infinite limit, inactive rule) has no
/// entry at all: absence means "structurally skipped", never zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DualMap {
    entries: BTreeMap<Family, BTreeMap<IndexKey, f64>>,
}

impl DualMap {
    /// `None` when the solution carries no duals.
    pub fn from_solution(program: &LinearProgram, solution: &LpSolution) -> Option<Self> {
        let duals = solution.duals.as_ref()?;
        let mut entries: BTreeMap<Family, BTreeMap<IndexKey, f64>> = BTreeMap::new();
        for (constraint, dual) in program.constraints().iter().zip(duals) {
            entries
                .entry(constraint.family)
                .or_default()
                .insert(constraint.key.clone(), *dual);
        }
        Some(Self { entries })
    }

    pub fn get(&self, family: Family, key: &IndexKey) -> Option<f64> {
        self.entries.get(&family).and_then(|m| m.get(key)).copied()
    }

    pub fn family(&self, family: Family) -> impl Iterator<Item = (&IndexKey, f64)> {
        self.entries
            .get(&family)
            .into_iter()
            .flat_map(|m| m.iter().map(|(k, v)| (k, *v)))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
