use clap::{Parser, Subcommand};
use decomp_algo::solver::BackendKind;
use decomp_algo::Method;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Decomposition solver for energy system models", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Solve the whole model as one linear program
    Solve {
        /// Model directory (one CSV file per table)
        #[arg(long)]
        data: PathBuf,
        /// LP backend (clarabel, good-lp)
        #[arg(long, default_value = "clarabel")]
        backend: BackendKind,
        /// Write objective, costs and capacities as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Solve the model by decomposition
    Decompose {
        /// Model directory (one CSV file per table)
        #[arg(long)]
        data: PathBuf,
        /// Run configuration (TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the configured method (time-horizon, regional, sddp)
        #[arg(long)]
        method: Option<Method>,
        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Solve subs on a worker pool
        #[arg(long)]
        parallel: bool,
        /// Write the iteration table as CSV
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write the run summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Print table sizes and site topology of a model directory
    Inspect {
        /// Model directory (one CSV file per table)
        #[arg(long)]
        data: PathBuf,
    },
}
