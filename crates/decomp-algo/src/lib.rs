//! # decomp-algo: Decomposition of Capacity-Expansion Models
//!
//! Builds the linear program of an energy-system capacity-expansion model
//! and solves it either whole or split into a master problem and a set of
//! sub problems coordinated by cuts.
//!
//! ## Methods
//!
//! | Method | Master decides | Subs cover | Termination |
//! |--------|----------------|------------|-------------|
//! | [`Method::TimeHorizon`] | capacities, storage at support steps, budgets | blocks between support steps | gap or stable capacities |
//! | [`Method::Regional`] | transmission, cross-region flows, CO2 budgets | regions | gap or stable capacities |
//! | [`Method::Sddp`] | capacities and the first stage | later stages × realizations | window of sampled costs |
//!
//! ### Architecture
//!
//! - **[`model::ModelBuilder`]**: one generic builder for every role, with a
//!   registry of constraint families and two extension stages
//! - **[`coupling::CouplingPolicy`]**: the method-specific part (which
//!   problems exist, how they link, how cuts are formed)
//! - **[`Coordinator`]**: the Benders state machine; SDDP runs in
//!   [`StochasticRunner`]
//! - **[`ConvergenceTracker`]**: bounds, gap and termination
//! - **[`pool::WorkerPool`]**: parallel sub solves with a barrier per iteration
//!
//! ## Example
//!
//! ```ignore
//! use decomp_algo::{decompose, solver::ClarabelBackend, DecompositionConfig};
//!
//! let data = decomp_io::load_model_dir("data/mimo")?;
//! let config = DecompositionConfig::default();
//! let result = decompose(&data, &config, Default::default(), &ClarabelBackend::new())?;
//! println!("{} after {} iterations", result.total_cost, result.iterations());
//! ```

pub mod coupling;
pub mod decomposition;
pub mod lp;
pub mod model;
pub mod pool;
pub mod report;
pub mod solver;

pub use coupling::{Cut, CouplingError, CouplingPolicy, Regional, Stochastic, TimeHorizon};
pub use decomposition::{
    decompose, solve_normal, ConvergenceTracker, Coordinator, DecompositionConfig,
    DecompositionError, DecompositionResult, IterationRecord, Method, Phase, RunStatus,
    StochasticRunner,
};
pub use model::{BuildError, CostType, ProblemInstance, Role};
pub use pool::{PoolError, WorkerPool};
pub use report::ReportError;
pub use solver::{LpBackend, LpError, SolverSettings};
