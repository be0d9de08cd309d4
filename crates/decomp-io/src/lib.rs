//! # decomp-io: Model Directory Loading
//!
//! Reads an energy system model stored as one CSV file per table into
//! [`decomp_core::ModelData`].
//!
//! | File | Table | Index columns |
//! |------|-------|---------------|
//! | `global.csv` | Global | `Property` |
//! | `site.csv` | Site | `Name` |
//! | `commodity.csv` | Commodity | `Site`, `Commodity`, `Type` |
//! | `process.csv` | Process | `Site`, `Process` |
//! | `process_commodity.csv` | Process-Commodity | `Process`, `Commodity`, `Direction` |
//! | `transmission.csv` | Transmission | `Site In`, `Site Out`, `Transmission`, `Commodity` |
//! | `storage.csv` | Storage | `Site`, `Storage`, `Commodity` |
//! | `demand.csv` | Demand | `t` + `Site.Commodity` columns |
//! | `supim.csv` | SupIm | `t` + `Site.Commodity` columns |
//! | `time_var_eff.csv` | TimeVarEff (optional) | `t` + `Site.Process` columns |
//!
//! ```no_run
//! use decomp_io::load_model_dir;
//!
//! let loaded = load_model_dir("data/mimo")?;
//! println!("{} sites, {} defaulted cells",
//!     loaded.data.sites.len(),
//!     loaded.diagnostics.defaulted_total());
//! # Ok::<(), decomp_io::LoadError>(())
//! ```

pub mod diagnostics;
pub mod error;
pub mod loader;

pub use diagnostics::LoadDiagnostics;
pub use error::LoadError;
pub use loader::{load_model_dir, LoadedModel};
