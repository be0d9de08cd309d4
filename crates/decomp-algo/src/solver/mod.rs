//! Solver boundary.
//!
//! Everything above this module talks to an [`LpBackend`]: hand it a
//! [`LinearProgram`], get back primal values, optional duals and the
//! objective, or an [`LpError`] describing why there is no solution.
//!
//! | Backend | Duals | Used for |
//! |---------|-------|----------|
//! | [`ClarabelBackend`] | yes | decomposition masters and subs |
//! | [`GoodLpBackend`] | no | plain (normal) solves through `good_lp` |

mod clarabel_backend;
#[cfg(feature = "solver-clarabel")]
mod good_lp_backend;

pub use clarabel_backend::ClarabelBackend;
#[cfg(feature = "solver-clarabel")]
pub use good_lp_backend::GoodLpBackend;

use crate::lp::{LinearProgram, LpSolution};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Settings shared by all backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Interior-point iteration cap
    pub max_iter: u32,
    /// Absolute duality gap tolerance
    pub tol_gap_abs: f64,
    /// Relative duality gap tolerance
    pub tol_gap_rel: f64,
    /// Primal/dual feasibility tolerance
    pub tol_feas: f64,
    /// Print solver progress
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 200,
            tol_gap_abs: 1e-8,
            tol_gap_rel: 1e-8,
            tol_feas: 1e-8,
            verbose: false,
        }
    }
}

impl SolverSettings {
    /// Settings for a second attempt after the solver stalled: four times
    /// the iterations and tolerances a hundred times looser.
    pub fn relaxed(&self) -> Self {
        Self {
            max_iter: self.max_iter.saturating_mul(4),
            tol_gap_abs: self.tol_gap_abs * 1e2,
            tol_gap_rel: self.tol_gap_rel * 1e2,
            tol_feas: self.tol_feas * 1e2,
            verbose: self.verbose,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LpError {
    #[error("problem is infeasible")]
    Infeasible,

    #[error("problem is unbounded")]
    Unbounded,

    #[error("solver stopped with status {0}")]
    Failed(String),

    #[error("solver setup failed: {0}")]
    Setup(String),

    #[error("backend '{0}' does not return dual values")]
    DualsUnavailable(&'static str),

    /// A constraint without variables whose constant part is violated.
    #[error("constraint {0} has no variables and cannot hold")]
    Inconsistent(String),
}

/// A linear programming engine.
pub trait LpBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_duals(&self) -> bool;

    fn solve(
        &self,
        program: &LinearProgram,
        settings: &SolverSettings,
    ) -> Result<LpSolution, LpError>;
}

/// Backend selection as it appears in configuration files and flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    Clarabel,
    #[cfg(feature = "solver-clarabel")]
    GoodLp,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Clarabel => "clarabel",
            #[cfg(feature = "solver-clarabel")]
            BackendKind::GoodLp => "good-lp",
        }
    }

    pub fn build(&self) -> Arc<dyn LpBackend> {
        match self {
            BackendKind::Clarabel => Arc::new(ClarabelBackend::new()),
            #[cfg(feature = "solver-clarabel")]
            BackendKind::GoodLp => Arc::new(GoodLpBackend::new()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clarabel" => Ok(BackendKind::Clarabel),
            #[cfg(feature = "solver-clarabel")]
            "good-lp" | "good_lp" | "goodlp" => Ok(BackendKind::GoodLp),
            other => Err(format!("unknown LP backend '{other}'")),
        }
    }
}
