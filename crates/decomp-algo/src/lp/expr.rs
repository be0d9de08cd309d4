//! Affine expressions over variables and mutable parameters.

use super::{ParamId, VarId};
use std::collections::BTreeMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// `Σ a·x + Σ b·p + c` where `x` are decision variables and `p` are
/// parameters whose values are fixed at solve time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    terms: Vec<(VarId, f64)>,
    params: Vec<(ParamId, f64)>,
    constant: f64,
}

impl LinExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        Self {
            constant: value,
            ..Self::default()
        }
    }

    pub fn term(var: VarId, coef: f64) -> Self {
        Self {
            terms: vec![(var, coef)],
            ..Self::default()
        }
    }

    pub fn param(param: ParamId, coef: f64) -> Self {
        Self {
            params: vec![(param, coef)],
            ..Self::default()
        }
    }

    pub fn add_term(&mut self, var: VarId, coef: f64) -> &mut Self {
        if coef != 0.0 {
            self.terms.push((var, coef));
        }
        self
    }

    pub fn add_param(&mut self, param: ParamId, coef: f64) -> &mut Self {
        if coef != 0.0 {
            self.params.push((param, coef));
        }
        self
    }

    pub fn add_constant(&mut self, value: f64) -> &mut Self {
        self.constant += value;
        self
    }

    pub fn terms(&self) -> &[(VarId, f64)] {
        &self.terms
    }

    pub fn params(&self) -> &[(ParamId, f64)] {
        &self.params
    }

    pub fn constant_part(&self) -> f64 {
        self.constant
    }

    /// True when the expression references no variable.
    pub fn has_no_vars(&self) -> bool {
        self.merged_terms().is_empty()
    }

    /// Variable coefficients with duplicates combined and zeros dropped.
    pub fn merged_terms(&self) -> BTreeMap<VarId, f64> {
        let mut merged = BTreeMap::new();
        for &(var, coef) in &self.terms {
            *merged.entry(var).or_insert(0.0) += coef;
        }
        merged.retain(|_, c| *c != 0.0);
        merged
    }

    /// Parameter coefficients with duplicates combined.
    pub fn merged_params(&self) -> BTreeMap<ParamId, f64> {
        let mut merged = BTreeMap::new();
        for &(param, coef) in &self.params {
            *merged.entry(param).or_insert(0.0) += coef;
        }
        merged.retain(|_, c| *c != 0.0);
        merged
    }

    /// Constant plus parameter contribution.
    pub fn fixed_part(&self, param_values: &[f64]) -> f64 {
        self.constant
            + self
                .params
                .iter()
                .map(|(p, c)| c * param_values[p.0])
                .sum::<f64>()
    }

    pub fn evaluate(&self, values: &[f64], param_values: &[f64]) -> f64 {
        self.terms.iter().map(|(v, c)| c * values[v.0]).sum::<f64>() + self.fixed_part(param_values)
    }

    pub fn scale(&mut self, factor: f64) {
        for (_, c) in self.terms.iter_mut() {
            *c *= factor;
        }
        for (_, c) in self.params.iter_mut() {
            *c *= factor;
        }
        self.constant *= factor;
    }
}

impl From<VarId> for LinExpr {
    fn from(var: VarId) -> Self {
        LinExpr::term(var, 1.0)
    }
}

impl From<f64> for LinExpr {
    fn from(value: f64) -> Self {
        LinExpr::constant(value)
    }
}

impl AddAssign for LinExpr {
    fn add_assign(&mut self, rhs: LinExpr) {
        self.terms.extend(rhs.terms);
        self.params.extend(rhs.params);
        self.constant += rhs.constant;
    }
}

impl AddAssign<VarId> for LinExpr {
    fn add_assign(&mut self, rhs: VarId) {
        self.terms.push((rhs, 1.0));
    }
}

impl AddAssign<f64> for LinExpr {
    fn add_assign(&mut self, rhs: f64) {
        self.constant += rhs;
    }
}

impl SubAssign for LinExpr {
    fn sub_assign(&mut self, rhs: LinExpr) {
        *self += -rhs;
    }
}

impl SubAssign<VarId> for LinExpr {
    fn sub_assign(&mut self, rhs: VarId) {
        self.terms.push((rhs, -1.0));
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;

    fn neg(mut self) -> LinExpr {
        self.scale(-1.0);
        self
    }
}

impl Add for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: LinExpr) -> LinExpr {
        self += rhs;
        self
    }
}

impl Add<VarId> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: VarId) -> LinExpr {
        self += rhs;
        self
    }
}

impl Add<f64> for LinExpr {
    type Output = LinExpr;

    fn add(mut self, rhs: f64) -> LinExpr {
        self += rhs;
        self
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: LinExpr) -> LinExpr {
        self -= rhs;
        self
    }
}

impl Sub<VarId> for LinExpr {
    type Output = LinExpr;

    fn sub(mut self, rhs: VarId) -> LinExpr {
        self -= rhs;
        self
    }
}

impl Mul<f64> for LinExpr {
    type Output = LinExpr;

    fn mul(mut self, rhs: f64) -> LinExpr {
        self.scale(rhs);
        self
    }
}

impl Mul<VarId> for f64 {
    type Output = LinExpr;

    fn mul(self, rhs: VarId) -> LinExpr {
        LinExpr::term(rhs, self)
    }
}

impl Sum for LinExpr {
    fn sum<I: Iterator<Item = LinExpr>>(iter: I) -> LinExpr {
        iter.fold(LinExpr::new(), |acc, e| acc + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_evaluate() {
        let (x, y) = (VarId(0), VarId(1));
        let e = 2.0 * x + LinExpr::from(y) - x + 3.0;
        let merged = e.merged_terms();
        assert_eq!(merged[&x], 1.0);
        assert_eq!(merged[&y], 1.0);
        assert!((e.evaluate(&[4.0, 5.0], &[]) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_params_enter_fixed_part() {
        let mut e = LinExpr::term(VarId(0), 1.0);
        e.add_param(ParamId(0), -2.0).add_constant(1.0);
        assert!((e.fixed_part(&[10.0]) + 19.0).abs() < 1e-12);
        assert!(!e.has_no_vars());
        assert!(LinExpr::constant(4.0).has_no_vars());
    }

    #[test]
    fn test_cancelled_terms_vanish() {
        let x = VarId(3);
        let e = LinExpr::from(x) - x;
        assert!(e.has_no_vars());
    }
}
