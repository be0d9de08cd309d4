//! Composite identifiers for every table row.
//!
//! Rows are addressed by the same tuples the input tables use as their
//! index columns, so a missing key can always be reported in terms a
//! modeller recognizes.

use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Integer time index. The first timestep of a scope is the initial state.
pub type Timestep = u32;

/// Commodity category deciding which balance and limit rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommodityType {
    /// Intermittent supply scaled by a time series (wind, solar)
    SupIm,
    /// Purchasable fuel with optional per-step and total limits
    Stock,
    /// Commodity with exogenous demand
    Demand,
    /// Emission, balanced freely but limited and priced
    Env,
}

impl CommodityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommodityType::SupIm => "SupIm",
            CommodityType::Stock => "Stock",
            CommodityType::Demand => "Demand",
            CommodityType::Env => "Env",
        }
    }
}

impl fmt::Display for CommodityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommodityType {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supim" => Ok(CommodityType::SupIm),
            "stock" => Ok(CommodityType::Stock),
            "demand" => Ok(CommodityType::Demand),
            "env" => Ok(CommodityType::Env),
            _ => Err(DataError::Parse {
                value: s.to_string(),
                expected: "commodity type (SupIm, Stock, Demand, Env)",
            }),
        }
    }
}

/// Direction of a process-commodity ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl FromStr for Direction {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            _ => Err(DataError::Parse {
                value: s.to_string(),
                expected: "direction (In, Out)",
            }),
        }
    }
}

/// `(site, commodity, type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComKey {
    pub site: String,
    pub commodity: String,
    pub kind: CommodityType,
}

impl ComKey {
    pub fn new(site: impl Into<String>, commodity: impl Into<String>, kind: CommodityType) -> Self {
        Self {
            site: site.into(),
            commodity: commodity.into(),
            kind,
        }
    }
}

impl fmt::Display for ComKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.site, self.commodity, self.kind)
    }
}

/// `(site, process)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProKey {
    pub site: String,
    pub process: String,
}

impl ProKey {
    pub fn new(site: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            process: process.into(),
        }
    }
}

impl fmt::Display for ProKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.site, self.process)
    }
}

/// `(site_in, site_out, transmission, commodity)`: energy enters at
/// `site_in` and leaves at `site_out`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TraKey {
    pub site_in: String,
    pub site_out: String,
    pub transmission: String,
    pub commodity: String,
}

impl TraKey {
    pub fn new(
        site_in: impl Into<String>,
        site_out: impl Into<String>,
        transmission: impl Into<String>,
        commodity: impl Into<String>,
    ) -> Self {
        Self {
            site_in: site_in.into(),
            site_out: site_out.into(),
            transmission: transmission.into(),
            commodity: commodity.into(),
        }
    }

    /// The same link in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self {
            site_in: self.site_out.clone(),
            site_out: self.site_in.clone(),
            transmission: self.transmission.clone(),
            commodity: self.commodity.clone(),
        }
    }
}

impl fmt::Display for TraKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.site_in, self.site_out, self.transmission, self.commodity
        )
    }
}

/// `(site, storage, commodity)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoKey {
    pub site: String,
    pub storage: String,
    pub commodity: String,
}

impl StoKey {
    pub fn new(
        site: impl Into<String>,
        storage: impl Into<String>,
        commodity: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            storage: storage.into(),
            commodity: commodity.into(),
        }
    }
}

impl fmt::Display for StoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.site, self.storage, self.commodity)
    }
}

/// Split a composite `"Site.Commodity"` column label.
///
/// Only the first dot separates, so commodity names may contain dots.
pub fn split_label(label: &str) -> Result<(String, String), DataError> {
    match label.split_once('.') {
        Some((site, rest)) if !site.is_empty() && !rest.is_empty() => {
            Ok((site.trim().to_string(), rest.trim().to_string()))
        }
        _ => Err(DataError::Parse {
            value: label.to_string(),
            expected: "composite label 'Site.Commodity'",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_label() {
        let (site, com) = split_label("Mid.Elec").unwrap();
        assert_eq!(site, "Mid");
        assert_eq!(com, "Elec");
        let (_, com) = split_label("North.H2.grey").unwrap();
        assert_eq!(com, "H2.grey");
        assert!(split_label("NoDot").is_err());
        assert!(split_label(".Elec").is_err());
    }

    #[test]
    fn test_commodity_type_parse() {
        assert_eq!("supim".parse::<CommodityType>().unwrap(), CommodityType::SupIm);
        assert_eq!(" Env ".parse::<CommodityType>().unwrap(), CommodityType::Env);
        assert!("Fuel".parse::<CommodityType>().is_err());
    }

    #[test]
    fn test_reverse_transmission() {
        let key = TraKey::new("A", "B", "hvac", "Elec");
        let rev = key.reversed();
        assert_eq!(rev.site_in, "B");
        assert_eq!(rev.reversed(), key);
    }
}
