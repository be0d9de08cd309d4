//! Normalized model tables.
//!
//! [`ModelData`] mirrors the input workbook one table per field. Every map
//! is a `BTreeMap` so iteration order (and therefore variable and
//! constraint order in the generated programs) is deterministic.

use crate::error::{DataError, DataResult};
use crate::finance::annuity_factor;
use crate::keys::{ComKey, CommodityType, Direction, ProKey, StoKey, Timestep, TraKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the global property holding the system-wide CO2 cap.
pub const CO2_LIMIT: &str = "CO2 limit";
/// Commodity name the global CO2 cap applies to.
pub const CO2: &str = "CO2";
/// Optional global property overriding the step length in hours.
pub const TIMESTEP_LENGTH: &str = "dt";

/// Per-site attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Usable area for area-consuming processes; `None` means unlimited.
    pub area: Option<f64>,
}

/// Per-commodity attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    /// Purchase price (Stock) or emission price (Env)
    pub price: f64,
    /// Annual limit on purchase or emission
    pub max: f64,
    /// Limit per modelled step
    pub max_per_step: f64,
}

impl Default for Commodity {
    fn default() -> Self {
        Self {
            price: 0.0,
            max: f64::INFINITY,
            max_per_step: f64::INFINITY,
        }
    }
}

/// Conversion process parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub inst_cap: f64,
    pub cap_lo: f64,
    pub cap_up: f64,
    /// Maximum throughput change per hour as a fraction of capacity
    pub max_grad: f64,
    pub inv_cost: f64,
    pub fix_cost: f64,
    pub var_cost: f64,
    pub wacc: f64,
    pub depreciation: f64,
    pub area_per_cap: Option<f64>,
}

impl Default for Process {
    fn default() -> Self {
        Self {
            inst_cap: 0.0,
            cap_lo: 0.0,
            cap_up: f64::INFINITY,
            max_grad: f64::INFINITY,
            inv_cost: 0.0,
            fix_cost: 0.0,
            var_cost: 0.0,
            wacc: 0.07,
            depreciation: 20.0,
            area_per_cap: None,
        }
    }
}

impl Process {
    pub fn annuity(&self) -> f64 {
        annuity_factor(self.depreciation, self.wacc)
    }
}

/// Directed transmission link parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub eff: f64,
    pub inv_cost: f64,
    pub fix_cost: f64,
    pub var_cost: f64,
    pub inst_cap: f64,
    pub cap_lo: f64,
    pub cap_up: f64,
    pub wacc: f64,
    pub depreciation: f64,
}

impl Default for Transmission {
    fn default() -> Self {
        Self {
            eff: 1.0,
            inv_cost: 0.0,
            fix_cost: 0.0,
            var_cost: 0.0,
            inst_cap: 0.0,
            cap_lo: 0.0,
            cap_up: f64::INFINITY,
            wacc: 0.07,
            depreciation: 40.0,
        }
    }
}

impl Transmission {
    pub fn annuity(&self) -> f64 {
        annuity_factor(self.depreciation, self.wacc)
    }
}

/// Storage parameters. Suffix `c` is energy content, `p` is power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub inst_cap_c: f64,
    pub cap_lo_c: f64,
    pub cap_up_c: f64,
    pub inst_cap_p: f64,
    pub cap_lo_p: f64,
    pub cap_up_p: f64,
    pub eff_in: f64,
    pub eff_out: f64,
    pub inv_cost_p: f64,
    pub inv_cost_c: f64,
    pub fix_cost_p: f64,
    pub fix_cost_c: f64,
    pub var_cost_p: f64,
    pub var_cost_c: f64,
    pub wacc: f64,
    pub depreciation: f64,
    /// Initial (and minimum final) content as a fraction of energy capacity
    pub init: f64,
    /// Self-discharge per hour
    pub discharge: f64,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            inst_cap_c: 0.0,
            cap_lo_c: 0.0,
            cap_up_c: f64::INFINITY,
            inst_cap_p: 0.0,
            cap_lo_p: 0.0,
            cap_up_p: f64::INFINITY,
            eff_in: 1.0,
            eff_out: 1.0,
            inv_cost_p: 0.0,
            inv_cost_c: 0.0,
            fix_cost_p: 0.0,
            fix_cost_c: 0.0,
            var_cost_p: 0.0,
            var_cost_c: 0.0,
            wacc: 0.07,
            depreciation: 20.0,
            init: 0.5,
            discharge: 0.0,
        }
    }
}

impl Storage {
    pub fn annuity(&self) -> f64 {
        annuity_factor(self.depreciation, self.wacc)
    }
}

/// Time series keyed by `(site, commodity)` (or `(site, process)`).
pub type Series = BTreeMap<(String, String), BTreeMap<Timestep, f64>>;

/// The complete input of one energy system model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelData {
    pub global: BTreeMap<String, f64>,
    pub sites: BTreeMap<String, Site>,
    pub commodities: BTreeMap<ComKey, Commodity>,
    pub processes: BTreeMap<ProKey, Process>,
    /// `(process, commodity, direction) -> ratio`
    pub ratios: BTreeMap<(String, String, Direction), f64>,
    pub transmissions: BTreeMap<TraKey, Transmission>,
    pub storages: BTreeMap<StoKey, Storage>,
    pub demand: Series,
    pub supim: Series,
    /// Optional time-varying output efficiency keyed by `(site, process)`
    pub eff_factor: Series,
}

impl ModelData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step length in hours (global property `dt`, default 1).
    pub fn dt(&self) -> f64 {
        self.global.get(TIMESTEP_LENGTH).copied().unwrap_or(1.0)
    }

    /// The global CO2 cap. Its absence is a configuration error.
    pub fn co2_limit(&self) -> DataResult<f64> {
        self.global
            .get(CO2_LIMIT)
            .copied()
            .ok_or_else(|| DataError::MissingGlobalProperty {
                property: CO2_LIMIT.to_string(),
                hint: "add a 'Global' table with a 'CO2 limit' row (older inputs \
                       call the table 'Hacks' and the row 'Global CO2 limit')"
                    .to_string(),
            })
    }

    /// Sorted union of all time-series indices.
    pub fn timesteps(&self) -> Vec<Timestep> {
        let mut steps = BTreeSet::new();
        for series in self.demand.values().chain(self.supim.values()) {
            steps.extend(series.keys().copied());
        }
        steps.into_iter().collect()
    }

    /// Commodity names of one type, across all sites.
    pub fn commodity_names(&self, kind: CommodityType) -> BTreeSet<String> {
        self.commodities
            .keys()
            .filter(|k| k.kind == kind)
            .map(|k| k.commodity.clone())
            .collect()
    }

    /// Commodity rows of a site regardless of type.
    pub fn find_commodity(&self, site: &str, commodity: &str) -> Option<(&ComKey, &Commodity)> {
        self.commodities
            .iter()
            .find(|(k, _)| k.site == site && k.commodity == commodity)
    }

    /// `(commodity, ratio)` pairs a process consumes or produces.
    pub fn process_ratios(&self, process: &str, direction: Direction) -> Vec<(String, f64)> {
        self.ratios
            .iter()
            .filter(|((p, _, d), _)| p == process && *d == direction)
            .map(|((_, c, _), r)| (c.clone(), *r))
            .collect()
    }

    pub fn demand_at(&self, site: &str, commodity: &str, t: Timestep) -> f64 {
        self.demand
            .get(&(site.to_string(), commodity.to_string()))
            .and_then(|s| s.get(&t))
            .copied()
            .unwrap_or(0.0)
    }

    /// Intermittent availability; a missing entry is a lookup error.
    pub fn supim_at(&self, site: &str, commodity: &str, t: Timestep) -> DataResult<f64> {
        self.supim
            .get(&(site.to_string(), commodity.to_string()))
            .and_then(|s| s.get(&t))
            .copied()
            .ok_or_else(|| DataError::missing_key("supim", format!("({site}.{commodity}, t={t})")))
    }

    /// Output efficiency multiplier, 1 when no time-varying factor is given.
    pub fn eff_factor_at(&self, site: &str, process: &str, t: Timestep) -> f64 {
        self.eff_factor
            .get(&(site.to_string(), process.to_string()))
            .and_then(|s| s.get(&t))
            .copied()
            .unwrap_or(1.0)
    }

    /// Copy of the tables restricted to `sites`.
    ///
    /// Transmission rows are kept when either end lies inside the subset,
    /// so the slice still knows its connections to the outside.
    pub fn slice_sites(&self, sites: &BTreeSet<String>) -> ModelData {
        let keep = |s: &String| sites.contains(s);
        ModelData {
            global: self.global.clone(),
            sites: self
                .sites
                .iter()
                .filter(|(k, _)| keep(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            commodities: self
                .commodities
                .iter()
                .filter(|(k, _)| keep(&k.site))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            processes: self
                .processes
                .iter()
                .filter(|(k, _)| keep(&k.site))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ratios: self.ratios.clone(),
            transmissions: self
                .transmissions
                .iter()
                .filter(|(k, _)| keep(&k.site_in) || keep(&k.site_out))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            storages: self
                .storages
                .iter()
                .filter(|(k, _)| keep(&k.site))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            demand: filter_series(&self.demand, &keep),
            supim: filter_series(&self.supim, &keep),
            eff_factor: filter_series(&self.eff_factor, &keep),
        }
    }

    /// Replace the intermittent series of `commodity` using a realization
    /// factor `f` in `[-1, 1]`: negative factors scale availability down,
    /// positive factors pull it towards full availability.
    pub fn apply_supim_factor(&mut self, commodity: &str, factor: f64) {
        for ((_, com), series) in self.supim.iter_mut() {
            if com != commodity {
                continue;
            }
            for value in series.values_mut() {
                *value = realize(*value, factor);
            }
        }
    }

    /// Structural checks that do not depend on a scope.
    pub fn validate(&self) -> DataResult<()> {
        self.co2_limit()?;
        if self.sites.is_empty() {
            return Err(DataError::MissingTable("Site"));
        }
        for key in self.processes.keys() {
            if !self.sites.contains_key(&key.site) {
                return Err(DataError::missing_key("Site", &key.site));
            }
        }
        for (process, _, _) in self.ratios.keys() {
            if !self.processes.keys().any(|k| &k.process == process) {
                return Err(DataError::missing_key("Process", process));
            }
        }
        for (key, tra) in &self.transmissions {
            if !self.transmissions.contains_key(&key.reversed()) {
                return Err(DataError::missing_key("Transmission", key.reversed()));
            }
            if tra.eff <= 0.0 {
                return Err(DataError::invalid("Transmission", key, "eff must be positive"));
            }
        }
        for (key, sto) in &self.storages {
            if sto.eff_in <= 0.0 || sto.eff_out <= 0.0 {
                return Err(DataError::invalid("Storage", key, "efficiencies must be positive"));
            }
            if !(0.0..=1.0).contains(&sto.init) {
                return Err(DataError::invalid("Storage", key, "init must lie in [0, 1]"));
            }
        }
        Ok(())
    }
}

fn filter_series(series: &Series, keep: &dyn Fn(&String) -> bool) -> Series {
    series
        .iter()
        .filter(|((site, _), _)| keep(site))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Realization transform for a single availability value.
pub fn realize(value: f64, factor: f64) -> f64 {
    let f = factor.clamp(-1.0, 1.0);
    if f < 0.0 {
        (1.0 - f.abs()) * value
    } else if f > 0.0 {
        f + (1.0 - f) * value
    } else {
        value
    }
}
