//! `good_lp` backend.
//!
//! Builds the program through `good_lp`'s modelling layer and solves it
//! with the bundled Clarabel interface. Only primal values come back, so
//! this backend serves plain solves where no cut is generated.

use super::{LpBackend, LpError, SolverSettings};
use crate::lp::{ConstraintId, LinearProgram, LpSolution, Sense};
use good_lp::solvers::clarabel::clarabel;
use good_lp::{
    constraint, variable, variables, Expression, ResolutionError, Solution, SolverModel, Variable,
};
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
pub struct GoodLpBackend;

impl GoodLpBackend {
    pub fn new() -> Self {
        Self
    }
}

impl LpBackend for GoodLpBackend {
    fn name(&self) -> &'static str {
        "good-lp"
    }

    fn supports_duals(&self) -> bool {
        false
    }

    fn solve(
        &self,
        program: &LinearProgram,
        _settings: &SolverSettings,
    ) -> Result<LpSolution, LpError> {
        let start = Instant::now();
        let params = program.param_values();

        let mut vars = variables!();
        let handles: Vec<Variable> = program
            .variables()
            .iter()
            .map(|v| {
                let mut def = variable();
                if v.lower.is_finite() {
                    def = def.min(v.lower);
                }
                if v.upper.is_finite() {
                    def = def.max(v.upper);
                }
                vars.add(def)
            })
            .collect();

        let (q, offset) = program.objective_coefficients();
        let mut objective = Expression::from(0.0);
        for (j, c) in q.iter().enumerate() {
            if *c != 0.0 {
                objective += *c * handles[j];
            }
        }

        let mut model = vars.minimise(objective).using(clarabel);

        for (idx, c) in program.constraints().iter().enumerate() {
            let row = program.row(ConstraintId(idx), &params);
            if row.coeffs.is_empty() {
                let holds = match row.sense {
                    Sense::Le => row.rhs >= -1e-9,
                    Sense::Ge => row.rhs <= 1e-9,
                    Sense::Eq => row.rhs.abs() <= 1e-9,
                };
                if !holds {
                    return Err(LpError::Inconsistent(format!("{}{}", c.family, c.key)));
                }
                continue;
            }
            let mut body = Expression::from(0.0);
            for (j, a) in row.coeffs {
                body += a * handles[j];
            }
            let rhs = row.rhs;
            model = match row.sense {
                Sense::Le => model.with(constraint!(body <= rhs)),
                Sense::Ge => model.with(constraint!(body >= rhs)),
                Sense::Eq => model.with(constraint!(body == rhs)),
            };
        }

        let solution = model.solve().map_err(|e| match e {
            ResolutionError::Infeasible => LpError::Infeasible,
            ResolutionError::Unbounded => LpError::Unbounded,
            other => LpError::Failed(format!("{other:?}")),
        })?;

        let values: Vec<f64> = handles.iter().map(|v| solution.value(*v)).collect();
        let objective = q.iter().zip(&values).map(|(c, x)| c * x).sum::<f64>() + offset;

        Ok(LpSolution {
            objective,
            values,
            duals: None,
            iterations: 0,
            solve_time_ms: start.elapsed().as_millis(),
        })
    }
}
