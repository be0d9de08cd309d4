//! Direct Clarabel backend with dual recovery.
//!
//! Clarabel solves
//!
//! ```text
//! minimize    ½x'Px + q'x
//! subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! A linear program maps onto this with `P = 0`, equality rows in a zero
//! cone and every inequality (including finite variable bounds) in one
//! nonnegative cone as `a'x ≤ b`. Rows of `≥` constraints are negated.
//!
//! At the optimum `∂ objective / ∂ b = -z`, so the dual of a `≤` or `=`
//! row is `-z` and the dual of a negated `≥` row is `+z`.

use super::{LpBackend, LpError, SolverSettings};
use crate::lp::{ConstraintId, LinearProgram, LpSolution, Sense};
use clarabel::{
    algebra::CscMatrix,
    solver::{
        DefaultSettingsBuilder, DefaultSolution, DefaultSolver, IPSolver, SolverStatus,
        SupportedConeT,
    },
};
use std::time::Instant;
use tracing::debug;

/// Rows whose constant part differs from zero by less than this are
/// treated as satisfied when they contain no variable.
const EMPTY_ROW_TOL: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelBackend;

impl ClarabelBackend {
    pub fn new() -> Self {
        Self
    }
}

/// A row ready for the conic form plus where its dual goes.
struct ConicRow {
    coeffs: Vec<(usize, f64)>,
    rhs: f64,
    /// `(constraint index, sign applied to z)`; `None` for bound rows
    origin: Option<(usize, f64)>,
}

impl LpBackend for ClarabelBackend {
    fn name(&self) -> &'static str {
        "clarabel"
    }

    fn supports_duals(&self) -> bool {
        true
    }

    fn solve(
        &self,
        program: &LinearProgram,
        settings: &SolverSettings,
    ) -> Result<LpSolution, LpError> {
        let start = Instant::now();
        let n_var = program.num_vars();
        let params = program.param_values();

        // === Rows ===
        let mut eq_rows = Vec::new();
        let mut ineq_rows = Vec::new();
        for (idx, constraint) in program.constraints().iter().enumerate() {
            let row = program.row(ConstraintId(idx), &params);
            if row.coeffs.is_empty() {
                let holds = match row.sense {
                    Sense::Le => row.rhs >= -EMPTY_ROW_TOL,
                    Sense::Ge => row.rhs <= EMPTY_ROW_TOL,
                    Sense::Eq => row.rhs.abs() <= EMPTY_ROW_TOL,
                };
                if !holds {
                    return Err(LpError::Inconsistent(format!(
                        "{}{}",
                        constraint.family, constraint.key
                    )));
                }
                continue;
            }
            match row.sense {
                Sense::Eq => eq_rows.push(ConicRow {
                    coeffs: row.coeffs,
                    rhs: row.rhs,
                    origin: Some((idx, -1.0)),
                }),
                Sense::Le => ineq_rows.push(ConicRow {
                    coeffs: row.coeffs,
                    rhs: row.rhs,
                    origin: Some((idx, -1.0)),
                }),
                Sense::Ge => ineq_rows.push(ConicRow {
                    coeffs: row.coeffs.into_iter().map(|(j, a)| (j, -a)).collect(),
                    rhs: -row.rhs,
                    origin: Some((idx, 1.0)),
                }),
            }
        }
        for (j, var) in program.variables().iter().enumerate() {
            if var.lower.is_finite() && var.lower == var.upper {
                eq_rows.push(ConicRow {
                    coeffs: vec![(j, 1.0)],
                    rhs: var.lower,
                    origin: None,
                });
                continue;
            }
            if var.lower.is_finite() {
                ineq_rows.push(ConicRow {
                    coeffs: vec![(j, -1.0)],
                    rhs: -var.lower,
                    origin: None,
                });
            }
            if var.upper.is_finite() {
                ineq_rows.push(ConicRow {
                    coeffs: vec![(j, 1.0)],
                    rhs: var.upper,
                    origin: None,
                });
            }
        }

        // === CSC assembly ===
        let n_eq = eq_rows.len();
        let n_ineq = ineq_rows.len();
        let mut columns: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n_var];
        let mut rhs = Vec::with_capacity(n_eq + n_ineq);
        for (r, row) in eq_rows.iter().chain(ineq_rows.iter()).enumerate() {
            for &(j, a) in &row.coeffs {
                columns[j].push((r, a));
            }
            rhs.push(row.rhs);
        }
        let mut col_ptr = Vec::with_capacity(n_var + 1);
        let mut row_idx = Vec::new();
        let mut values = Vec::new();
        for column in columns.iter_mut() {
            col_ptr.push(row_idx.len());
            column.sort_by_key(|(r, _)| *r);
            for &(r, a) in column.iter() {
                row_idx.push(r);
                values.push(a);
            }
        }
        col_ptr.push(row_idx.len());

        let a_mat = CscMatrix::new(n_eq + n_ineq, n_var, col_ptr, row_idx, values);
        let p_mat = CscMatrix::new(n_var, n_var, vec![0; n_var + 1], Vec::new(), Vec::new());
        let (q, offset) = program.objective_coefficients();

        let mut cones = Vec::new();
        if n_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(n_eq));
        }
        if n_ineq > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(n_ineq));
        }

        // === Solve ===
        let mut sol = run_clarabel(&p_mat, &q, &a_mat, &rhs, &cones, settings, false)?;
        if stalled(sol.status) {
            debug!(status = ?sol.status, "retrying with relaxed tolerances");
            sol = run_clarabel(&p_mat, &q, &a_mat, &rhs, &cones, &settings.relaxed(), true)?;
        }
        match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                return Err(LpError::Infeasible)
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                return Err(LpError::Unbounded)
            }
            other => return Err(LpError::Failed(format!("{other:?}"))),
        }

        // === Extract ===
        let mut duals = vec![0.0; program.num_constraints()];
        for (r, row) in eq_rows.iter().chain(ineq_rows.iter()).enumerate() {
            if let Some((idx, sign)) = row.origin {
                duals[idx] = sign * sol.z[r];
            }
        }
        let objective = q
            .iter()
            .zip(sol.x.iter())
            .map(|(c, x)| c * x)
            .sum::<f64>()
            + offset;

        Ok(LpSolution {
            objective,
            values: sol.x.clone(),
            duals: Some(duals),
            iterations: sol.iterations,
            solve_time_ms: start.elapsed().as_millis(),
        })
    }
}

/// Statuses worth a second attempt: the solver gave up without a
/// certificate either way.
fn stalled(status: SolverStatus) -> bool {
    matches!(
        status,
        SolverStatus::InsufficientProgress
            | SolverStatus::NumericalError
            | SolverStatus::MaxIterations
    )
}

fn run_clarabel(
    p_mat: &CscMatrix<f64>,
    q: &[f64],
    a_mat: &CscMatrix<f64>,
    rhs: &[f64],
    cones: &[SupportedConeT<f64>],
    settings: &SolverSettings,
    retry: bool,
) -> Result<DefaultSolution<f64>, LpError> {
    let mut builder = DefaultSettingsBuilder::default();
    builder
        .verbose(settings.verbose)
        .max_iter(settings.max_iter)
        .tol_gap_abs(settings.tol_gap_abs)
        .tol_gap_rel(settings.tol_gap_rel)
        .tol_feas(settings.tol_feas);
    if retry {
        // badly scaled rows (MWh next to €) need more equilibration
        builder.equilibrate_max_iter(50).iterative_refinement_max_iter(20);
    }
    let clarabel_settings = builder
        .build()
        .map_err(|e| LpError::Setup(format!("Clarabel settings error: {e:?}")))?;

    let mut solver = DefaultSolver::new(p_mat, q, a_mat, rhs, cones, clarabel_settings)
        .map_err(|e| LpError::Setup(format!("Clarabel initialization failed: {e:?}")))?;
    solver.solve();
    Ok(solver.solution)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_stalled_statuses_are_retried() {
        assert!(stalled(SolverStatus::InsufficientProgress));
        assert!(stalled(SolverStatus::NumericalError));
        assert!(stalled(SolverStatus::MaxIterations));
        assert!(!stalled(SolverStatus::Solved));
        assert!(!stalled(SolverStatus::PrimalInfeasible));
        assert!(!stalled(SolverStatus::AlmostDualInfeasible));
    }
}
