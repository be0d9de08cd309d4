use super::load_data;
use anyhow::{Context, Result};
use decomp_algo::solve_normal;
use decomp_algo::solver::{BackendKind, SolverSettings};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

pub fn handle(data_dir: &Path, backend: BackendKind, json_out: Option<&PathBuf>) -> Result<()> {
    let data = load_data(data_dir)?;
    let solver = backend.build();
    info!(backend = %backend, "solving whole model");
    let instance = solve_normal(&data, solver.as_ref(), &SolverSettings::default())?;
    let objective = instance.objective().unwrap_or(f64::NAN);
    let costs = instance.costs();
    let capacities = instance.capacities();

    println!("Objective: {objective:.2}");
    for (cost_type, value) in &costs {
        println!("  {:<14} {value:.2}", cost_type.as_str());
    }
    for cap in capacities.iter().filter(|c| c.value.abs() > 1e-6) {
        println!("  {} {}: {:.3}", cap.variable, cap.key, cap.value);
    }

    if let Some(path) = json_out {
        let costs: serde_json::Map<String, serde_json::Value> = costs
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), json!(v)))
            .collect();
        let summary = json!({
            "objective": objective,
            "costs": costs,
            "capacities": capacities,
            "variables": instance.program.num_vars(),
            "constraints": instance.program.num_constraints(),
        });
        let text = serde_json::to_string_pretty(&summary).context("serializing solution")?;
        std::fs::write(path, text)
            .with_context(|| format!("writing JSON to {}", path.display()))?;
        info!(path = %path.display(), "solution written");
    }
    Ok(())
}
