use super::load_data;
use anyhow::{bail, Context, Result};
use decomp_algo::solver::ClarabelBackend;
use decomp_algo::{decompose, DecompositionConfig, Method};
use decomp_core::ModelData;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct DecomposeArgs<'a> {
    pub data: &'a Path,
    pub config: Option<&'a PathBuf>,
    pub method: Option<Method>,
    pub max_iterations: Option<usize>,
    pub parallel: bool,
    pub report: Option<&'a PathBuf>,
    pub summary: Option<&'a PathBuf>,
}

/// Read a run configuration; relative `coupled_files` entries resolve
/// against the directory of the configuration file.
pub fn read_config(path: &Path) -> Result<DecompositionConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading configuration {}", path.display()))?;
    let mut config: DecompositionConfig =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for dir in config.regional.coupled_files.values_mut() {
        if dir.is_relative() {
            *dir = base.join(&*dir);
        }
    }
    Ok(config)
}

fn load_coupled(config: &DecompositionConfig) -> Result<BTreeMap<String, ModelData>> {
    let mut coupled = BTreeMap::new();
    if config.method != Method::Regional {
        return Ok(coupled);
    }
    for (region, dir) in &config.regional.coupled_files {
        let data = load_data(dir).with_context(|| format!("coupled region '{region}'"))?;
        coupled.insert(region.clone(), data);
    }
    Ok(coupled)
}

pub fn handle(args: DecomposeArgs<'_>) -> Result<()> {
    let data = load_data(args.data)?;
    let mut config = match args.config {
        Some(path) => read_config(path)?,
        None => DecompositionConfig::default(),
    };
    if let Some(method) = args.method {
        config.method = method;
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    config.parallel |= args.parallel;
    if config.parallel && config.run_dir.is_none() {
        config.run_dir = Some(args.data.to_path_buf());
    }
    if config.method != Method::Regional && !config.regional.coupled_files.is_empty() {
        bail!("coupled_files are only used by the regional method");
    }
    let coupled = load_coupled(&config)?;

    let result = decompose(&data, &config, coupled, &ClarabelBackend::new())?;

    println!(
        "{} {:?} after {} iterations",
        result.method,
        result.status,
        result.iterations()
    );
    println!("Total cost:  {:.2}", result.total_cost);
    println!("Lower bound: {:.2}", result.lower_bound);
    println!("Cuts added:  {}", result.cuts.len());
    for cap in result.capacities.iter().filter(|c| c.value.abs() > 1e-6) {
        println!("  {} {}: {:.3}", cap.variable, cap.key, cap.value);
    }

    if let Some(path) = args.report {
        result
            .to_csv(path)
            .with_context(|| format!("writing iteration report {}", path.display()))?;
        info!(path = %path.display(), "iteration report written");
    }
    if let Some(path) = args.summary {
        result
            .to_json(path)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_config_resolves_coupled_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            "method = \"regional\"\nmax_iterations = 12\n\n[regional.coupled_files]\nOffshore = \"offshore\"\n",
        )
        .unwrap();
        let config = read_config(&path).unwrap();
        assert_eq!(config.method, Method::Regional);
        assert_eq!(config.max_iterations, 12);
        assert_eq!(
            config.regional.coupled_files["Offshore"],
            dir.path().join("offshore")
        );
    }

    #[test]
    fn test_read_config_rejects_unknown_method() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "method = \"benders\"\n").unwrap();
        assert!(read_config(&path).is_err());
    }
}
