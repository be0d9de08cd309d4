use anyhow::Result;
use clap::Parser;
use decomp_cli::cli::{Cli, Commands};
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Solve {
            data,
            backend,
            json,
        } => commands::solve::handle(data, *backend, json.as_ref()),
        Commands::Decompose {
            data,
            config,
            method,
            max_iterations,
            parallel,
            report,
            summary,
        } => commands::decompose::handle(commands::decompose::DecomposeArgs {
            data,
            config: config.as_ref(),
            method: *method,
            max_iterations: *max_iterations,
            parallel: *parallel,
            report: report.as_ref(),
            summary: summary.as_ref(),
        }),
        Commands::Inspect { data } => commands::inspect::handle(data),
    }
}
