//! Table sizes and topology of a model directory.

use anyhow::{Context, Result};
use decomp_core::{CommodityType, SiteGraph};
use decomp_io::load_model_dir;
use std::io::Write;
use std::path::Path;
use tabwriter::TabWriter;

pub fn handle(dir: &Path) -> Result<()> {
    let loaded = load_model_dir(dir)
        .with_context(|| format!("loading model directory {}", dir.display()))?;
    let data = &loaded.data;
    let steps = data.timesteps();

    let mut tw = TabWriter::new(std::io::stdout());
    writeln!(tw, "Table\tRows")?;
    writeln!(tw, "sites\t{}", data.sites.len())?;
    writeln!(tw, "commodities\t{}", data.commodities.len())?;
    writeln!(tw, "processes\t{}", data.processes.len())?;
    writeln!(tw, "process ratios\t{}", data.ratios.len())?;
    writeln!(tw, "transmissions\t{}", data.transmissions.len())?;
    writeln!(tw, "storages\t{}", data.storages.len())?;
    writeln!(tw, "demand series\t{}", data.demand.len())?;
    writeln!(tw, "supim series\t{}", data.supim.len())?;
    writeln!(tw, "timesteps\t{}", steps.len())?;
    tw.flush()?;

    for kind in [
        CommodityType::SupIm,
        CommodityType::Stock,
        CommodityType::Demand,
        CommodityType::Env,
    ] {
        let names: Vec<String> = data.commodity_names(kind).into_iter().collect();
        if !names.is_empty() {
            println!("{}: {}", kind.as_str(), names.join(", "));
        }
    }

    let graph = SiteGraph::from_data(data);
    let stats = graph.stats();
    println!(
        "Topology: {} sites, {} links, {} components, degree {}..{}",
        stats.site_count,
        stats.link_count,
        stats.connected_components,
        stats.min_degree,
        stats.max_degree
    );
    if stats.connected_components > 1 {
        for (i, island) in graph.islands().iter().enumerate() {
            let names: Vec<&str> = island.iter().map(String::as_str).collect();
            println!("  island {i}: {}", names.join(", "));
        }
    }
    if loaded.diagnostics.defaulted_total() > 0 {
        println!(
            "{} cells fell back to defaults",
            loaded.diagnostics.defaulted_total()
        );
    }
    Ok(())
}
