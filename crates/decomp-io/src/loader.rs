//! CSV model directory loader.
//!
//! One file per table. Column names follow the workbook headers
//! (`inst-cap`, `var-cost`, ...); optional columns may be omitted or left
//! empty and fall back to the defaults of the core table types, which is
//! recorded in [`LoadDiagnostics`].

use crate::diagnostics::LoadDiagnostics;
use crate::error::LoadError;
use decomp_core::{
    split_label, ComKey, Commodity, CommodityType, Direction, ModelData, ProKey, Process, Series,
    Site, StoKey, Storage, Timestep, Transmission, TraKey,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SITE_FILE: &str = "site.csv";
pub const COMMODITY_FILE: &str = "commodity.csv";
pub const PROCESS_FILE: &str = "process.csv";
pub const RATIO_FILE: &str = "process_commodity.csv";
pub const TRANSMISSION_FILE: &str = "transmission.csv";
pub const STORAGE_FILE: &str = "storage.csv";
pub const DEMAND_FILE: &str = "demand.csv";
pub const SUPIM_FILE: &str = "supim.csv";
pub const GLOBAL_FILE: &str = "global.csv";
pub const EFF_FACTOR_FILE: &str = "time_var_eff.csv";

/// A loaded model plus what the loader had to fill in.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub data: ModelData,
    pub diagnostics: LoadDiagnostics,
}

#[derive(Debug, Deserialize)]
struct SiteRow {
    #[serde(rename = "Name")]
    name: String,
    #[serde(default)]
    area: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CommodityRow {
    #[serde(rename = "Site")]
    site: String,
    #[serde(rename = "Commodity")]
    commodity: String,
    #[serde(rename = "Type")]
    kind: String,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default, rename = "maxperstep")]
    max_per_step: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProcessRow {
    #[serde(rename = "Site")]
    site: String,
    #[serde(rename = "Process")]
    process: String,
    #[serde(default, rename = "inst-cap")]
    inst_cap: Option<f64>,
    #[serde(default, rename = "cap-lo")]
    cap_lo: Option<f64>,
    #[serde(default, rename = "cap-up")]
    cap_up: Option<f64>,
    #[serde(default, rename = "max-grad")]
    max_grad: Option<f64>,
    #[serde(default, rename = "inv-cost")]
    inv_cost: Option<f64>,
    #[serde(default, rename = "fix-cost")]
    fix_cost: Option<f64>,
    #[serde(default, rename = "var-cost")]
    var_cost: Option<f64>,
    #[serde(default)]
    wacc: Option<f64>,
    #[serde(default)]
    depreciation: Option<f64>,
    #[serde(default, rename = "area-per-cap")]
    area_per_cap: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RatioRow {
    #[serde(rename = "Process")]
    process: String,
    #[serde(rename = "Commodity")]
    commodity: String,
    #[serde(rename = "Direction")]
    direction: String,
    ratio: f64,
}

#[derive(Debug, Deserialize)]
struct TransmissionRow {
    #[serde(rename = "Site In")]
    site_in: String,
    #[serde(rename = "Site Out")]
    site_out: String,
    #[serde(rename = "Transmission")]
    transmission: String,
    #[serde(rename = "Commodity")]
    commodity: String,
    #[serde(default)]
    eff: Option<f64>,
    #[serde(default, rename = "inv-cost")]
    inv_cost: Option<f64>,
    #[serde(default, rename = "fix-cost")]
    fix_cost: Option<f64>,
    #[serde(default, rename = "var-cost")]
    var_cost: Option<f64>,
    #[serde(default, rename = "inst-cap")]
    inst_cap: Option<f64>,
    #[serde(default, rename = "cap-lo")]
    cap_lo: Option<f64>,
    #[serde(default, rename = "cap-up")]
    cap_up: Option<f64>,
    #[serde(default)]
    wacc: Option<f64>,
    #[serde(default)]
    depreciation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StorageRow {
    #[serde(rename = "Site")]
    site: String,
    #[serde(rename = "Storage")]
    storage: String,
    #[serde(rename = "Commodity")]
    commodity: String,
    #[serde(default, rename = "inst-cap-c")]
    inst_cap_c: Option<f64>,
    #[serde(default, rename = "cap-lo-c")]
    cap_lo_c: Option<f64>,
    #[serde(default, rename = "cap-up-c")]
    cap_up_c: Option<f64>,
    #[serde(default, rename = "inst-cap-p")]
    inst_cap_p: Option<f64>,
    #[serde(default, rename = "cap-lo-p")]
    cap_lo_p: Option<f64>,
    #[serde(default, rename = "cap-up-p")]
    cap_up_p: Option<f64>,
    #[serde(default, rename = "eff-in")]
    eff_in: Option<f64>,
    #[serde(default, rename = "eff-out")]
    eff_out: Option<f64>,
    #[serde(default, rename = "inv-cost-p")]
    inv_cost_p: Option<f64>,
    #[serde(default, rename = "inv-cost-c")]
    inv_cost_c: Option<f64>,
    #[serde(default, rename = "fix-cost-p")]
    fix_cost_p: Option<f64>,
    #[serde(default, rename = "fix-cost-c")]
    fix_cost_c: Option<f64>,
    #[serde(default, rename = "var-cost-p")]
    var_cost_p: Option<f64>,
    #[serde(default, rename = "var-cost-c")]
    var_cost_c: Option<f64>,
    #[serde(default)]
    wacc: Option<f64>,
    #[serde(default)]
    depreciation: Option<f64>,
    #[serde(default)]
    init: Option<f64>,
    #[serde(default)]
    discharge: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GlobalRow {
    #[serde(rename = "Property")]
    property: String,
    value: f64,
}

/// Fills `Option` cells from a default, counting each fallback.
struct Defaults<'a> {
    table: &'static str,
    diagnostics: &'a mut LoadDiagnostics,
}

impl Defaults<'_> {
    fn or(&mut self, value: Option<f64>, default: f64) -> f64 {
        match value {
            Some(v) => v,
            None => {
                self.diagnostics.record_default(self.table);
                default
            }
        }
    }
}

/// Read every table of the model directory `dir`.
pub fn load_model_dir(dir: impl AsRef<Path>) -> Result<LoadedModel, LoadError> {
    let dir = dir.as_ref();
    let mut diagnostics = LoadDiagnostics::new();
    let mut data = ModelData::new();

    // The global table goes first so a misnamed workbook fails fast.
    for row in read_rows::<GlobalRow>(dir, GLOBAL_FILE, "Global")? {
        data.global.insert(row.property.trim().to_string(), row.value);
    }
    data.co2_limit()?;

    for row in read_rows::<SiteRow>(dir, SITE_FILE, "Site")? {
        data.sites.insert(row.name, Site { area: row.area });
    }

    let base = Commodity::default();
    for (idx, row) in read_rows::<CommodityRow>(dir, COMMODITY_FILE, "Commodity")?
        .into_iter()
        .enumerate()
    {
        let kind: CommodityType = row.kind.parse().map_err(|e: decomp_core::DataError| {
            LoadError::Row {
                table: "Commodity",
                row: idx + 1,
                message: e.to_string(),
            }
        })?;
        let mut d = Defaults {
            table: "Commodity",
            diagnostics: &mut diagnostics,
        };
        let commodity = Commodity {
            price: d.or(row.price, base.price),
            max: d.or(row.max, base.max),
            max_per_step: d.or(row.max_per_step, base.max_per_step),
        };
        data.commodities
            .insert(ComKey::new(row.site, row.commodity, kind), commodity);
    }

    let base = Process::default();
    for row in read_rows::<ProcessRow>(dir, PROCESS_FILE, "Process")? {
        let mut d = Defaults {
            table: "Process",
            diagnostics: &mut diagnostics,
        };
        let process = Process {
            inst_cap: d.or(row.inst_cap, base.inst_cap),
            cap_lo: d.or(row.cap_lo, base.cap_lo),
            cap_up: d.or(row.cap_up, base.cap_up),
            max_grad: d.or(row.max_grad, base.max_grad),
            inv_cost: d.or(row.inv_cost, base.inv_cost),
            fix_cost: d.or(row.fix_cost, base.fix_cost),
            var_cost: d.or(row.var_cost, base.var_cost),
            wacc: d.or(row.wacc, base.wacc),
            depreciation: d.or(row.depreciation, base.depreciation),
            area_per_cap: row.area_per_cap,
        };
        data.processes
            .insert(ProKey::new(row.site, row.process), process);
    }

    for (idx, row) in read_rows::<RatioRow>(dir, RATIO_FILE, "Process-Commodity")?
        .into_iter()
        .enumerate()
    {
        let direction: Direction =
            row.direction
                .parse()
                .map_err(|e: decomp_core::DataError| LoadError::Row {
                    table: "Process-Commodity",
                    row: idx + 1,
                    message: e.to_string(),
                })?;
        data.ratios
            .insert((row.process, row.commodity, direction), row.ratio);
    }

    let base = Transmission::default();
    for row in read_rows::<TransmissionRow>(dir, TRANSMISSION_FILE, "Transmission")? {
        let mut d = Defaults {
            table: "Transmission",
            diagnostics: &mut diagnostics,
        };
        let tra = Transmission {
            eff: d.or(row.eff, base.eff),
            inv_cost: d.or(row.inv_cost, base.inv_cost),
            fix_cost: d.or(row.fix_cost, base.fix_cost),
            var_cost: d.or(row.var_cost, base.var_cost),
            inst_cap: d.or(row.inst_cap, base.inst_cap),
            cap_lo: d.or(row.cap_lo, base.cap_lo),
            cap_up: d.or(row.cap_up, base.cap_up),
            wacc: d.or(row.wacc, base.wacc),
            depreciation: d.or(row.depreciation, base.depreciation),
        };
        data.transmissions.insert(
            TraKey::new(row.site_in, row.site_out, row.transmission, row.commodity),
            tra,
        );
    }

    let base = Storage::default();
    for row in read_rows::<StorageRow>(dir, STORAGE_FILE, "Storage")? {
        let mut d = Defaults {
            table: "Storage",
            diagnostics: &mut diagnostics,
        };
        let sto = Storage {
            inst_cap_c: d.or(row.inst_cap_c, base.inst_cap_c),
            cap_lo_c: d.or(row.cap_lo_c, base.cap_lo_c),
            cap_up_c: d.or(row.cap_up_c, base.cap_up_c),
            inst_cap_p: d.or(row.inst_cap_p, base.inst_cap_p),
            cap_lo_p: d.or(row.cap_lo_p, base.cap_lo_p),
            cap_up_p: d.or(row.cap_up_p, base.cap_up_p),
            eff_in: d.or(row.eff_in, base.eff_in),
            eff_out: d.or(row.eff_out, base.eff_out),
            inv_cost_p: d.or(row.inv_cost_p, base.inv_cost_p),
            inv_cost_c: d.or(row.inv_cost_c, base.inv_cost_c),
            fix_cost_p: d.or(row.fix_cost_p, base.fix_cost_p),
            fix_cost_c: d.or(row.fix_cost_c, base.fix_cost_c),
            var_cost_p: d.or(row.var_cost_p, base.var_cost_p),
            var_cost_c: d.or(row.var_cost_c, base.var_cost_c),
            wacc: d.or(row.wacc, base.wacc),
            depreciation: d.or(row.depreciation, base.depreciation),
            init: d.or(row.init, base.init),
            discharge: d.or(row.discharge, base.discharge),
        };
        data.storages
            .insert(StoKey::new(row.site, row.storage, row.commodity), sto);
    }

    data.demand = read_series(&table_path(dir, DEMAND_FILE, "Demand")?, "Demand")?;
    data.supim = read_series(&table_path(dir, SUPIM_FILE, "SupIm")?, "SupIm")?;
    let eff_path = dir.join(EFF_FACTOR_FILE);
    if eff_path.exists() {
        data.eff_factor = read_series(&eff_path, "TimeVarEff")?;
    }

    for (site, com) in data.demand.keys() {
        if data.find_commodity(site, com).is_none() {
            diagnostics.warn(format!(
                "demand column {site}.{com} has no matching commodity row"
            ));
        }
    }

    data.validate()?;
    Ok(LoadedModel { data, diagnostics })
}

fn table_path(dir: &Path, file: &str, table: &'static str) -> Result<PathBuf, LoadError> {
    let path = dir.join(file);
    if path.exists() {
        Ok(path)
    } else {
        Err(LoadError::MissingTable { table, path })
    }
}

fn read_rows<T: DeserializeOwned>(
    dir: &Path,
    file: &str,
    table: &'static str,
) -> Result<Vec<T>, LoadError> {
    let path = table_path(dir, file, table)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|source| LoadError::Csv { table, source })?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| LoadError::Csv { table, source })
}

/// Wide time-series table: first column `t`, remaining columns labelled
/// `Site.Commodity` (or `Site.Process` for efficiency factors).
fn read_series(path: &Path, table: &'static str) -> Result<Series, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| LoadError::Csv { table, source })?;
    let headers = reader
        .headers()
        .map_err(|source| LoadError::Csv { table, source })?
        .clone();
    let mut labels = Vec::with_capacity(headers.len().saturating_sub(1));
    for header in headers.iter().skip(1) {
        labels.push(split_label(header)?);
    }

    let mut series: Series = labels
        .iter()
        .map(|label| (label.clone(), BTreeMap::new()))
        .collect();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| LoadError::Csv { table, source })?;
        let row = idx + 1;
        let t: Timestep = record
            .get(0)
            .unwrap_or_default()
            .parse()
            .map_err(|e| LoadError::Row {
                table,
                row,
                message: format!("timestep: {e}"),
            })?;
        for (label, cell) in labels.iter().zip(record.iter().skip(1)) {
            if cell.is_empty() {
                continue;
            }
            let value: f64 = cell.parse().map_err(|e| LoadError::Row {
                table,
                row,
                message: format!("{}.{}: {e}", label.0, label.1),
            })?;
            if let Some(values) = series.get_mut(label) {
                values.insert(t, value);
            }
        }
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_series_splits_composite_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demand.csv");
        fs::write(&path, "t,Mid.Elec,South.Heat\n0,0,0\n1,50,3.5\n2,80,\n").unwrap();
        let series = read_series(&path, "Demand").unwrap();
        let elec = &series[&("Mid".to_string(), "Elec".to_string())];
        assert_eq!(elec.get(&2), Some(&80.0));
        let heat = &series[&("South".to_string(), "Heat".to_string())];
        assert_eq!(heat.len(), 2);
    }

    #[test]
    fn test_series_rejects_bad_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("supim.csv");
        fs::write(&path, "t,Wind\n0,0.5\n").unwrap();
        assert!(matches!(
            read_series(&path, "SupIm"),
            Err(LoadError::Data(_))
        ));
    }
}
