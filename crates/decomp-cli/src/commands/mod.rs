pub mod decompose;
pub mod inspect;
pub mod solve;

use anyhow::{Context, Result};
use decomp_core::ModelData;
use decomp_io::load_model_dir;
use std::path::Path;
use tracing::{debug, warn};

/// Load a model directory and log what the loader filled in.
pub fn load_data(dir: &Path) -> Result<ModelData> {
    let loaded = load_model_dir(dir)
        .with_context(|| format!("loading model directory {}", dir.display()))?;
    for (table, count) in &loaded.diagnostics.defaulted {
        debug!(table, count, "cells defaulted");
    }
    for message in &loaded.diagnostics.warnings {
        warn!("{message}");
    }
    Ok(loaded.data)
}
