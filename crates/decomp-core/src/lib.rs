//! # decomp-core: Energy System Model Data
//!
//! Normalized tables describing an energy system (sites, commodities,
//! conversion processes, transmission links, storage units, time series
//! and global properties), plus the small amount of domain arithmetic
//! every model needs.
//!
//! ## Tables
//!
//! | Table | Key | Notes |
//! |-------|-----|-------|
//! | Site | name | optional area limit |
//! | Commodity | (site, commodity, type) | type ∈ SupIm, Stock, Demand, Env |
//! | Process | (site, process) | capacities, costs, ramp limit |
//! | Process-Commodity | (process, commodity, direction) | conversion ratios |
//! | Transmission | (site in, site out, technology, commodity) | must be symmetric |
//! | Storage | (site, storage, commodity) | energy and power capacities |
//! | Demand, SupIm | (site, commodity) × t | `"Site.Commodity"` column labels |
//! | Global | property | must contain `CO2 limit` |
//!
//! A [`Scope`] selects the time window, site subset and scenario
//! realization a single linear program covers.

pub mod data;
pub mod error;
pub mod finance;
pub mod keys;
pub mod scope;
pub mod topology;

pub use data::{
    realize, Commodity, ModelData, Process, Series, Site, Storage, Transmission, CO2, CO2_LIMIT,
    TIMESTEP_LENGTH,
};
pub use error::{DataError, DataResult};
pub use finance::{annualization_weight, annuity_factor, HOURS_PER_YEAR};
pub use keys::{split_label, ComKey, CommodityType, Direction, ProKey, StoKey, Timestep, TraKey};
pub use scope::{Realization, Scope};
pub use topology::{SiteGraph, TopologyStats};
