//! Iteration table and run summary export.
//!
//! The CSV columns follow the iteration tables the method prints: the
//! Benders methods report eta, Lambda and both bounds; SDDP adds the latest
//! forward-pass cost and the spread of the upper-bound window.

use crate::decomposition::{DecompositionResult, IterationRecord, Method};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

const BENDERS_HEADER: [&str; 7] = [
    "i",
    "Master Eta",
    "Sub Lambda",
    "Lower Bound",
    "Upper Bound",
    "Dual gap",
    "Master obj",
];

/// Column headers of the iteration table for `method`; `window` is the
/// length of the SDDP upper-bound window.
pub fn header(method: Method, window: usize) -> Vec<String> {
    match method {
        Method::Sddp => vec![
            "i".to_string(),
            "Master Eta".to_string(),
            "LB".to_string(),
            "UB (latest)".to_string(),
            format!("UB (last {window})"),
            "stddev".to_string(),
            "Dual gap".to_string(),
            "Master obj".to_string(),
        ],
        Method::TimeHorizon | Method::Regional => {
            BENDERS_HEADER.iter().map(|h| h.to_string()).collect()
        }
    }
}

fn row(method: Method, record: &IterationRecord) -> Vec<String> {
    match method {
        Method::Sddp => vec![
            record.iteration.to_string(),
            record.eta_or_future_cost.to_string(),
            record.lower_bound.to_string(),
            record.upper_bound_latest.unwrap_or(f64::NAN).to_string(),
            record.upper_bound.to_string(),
            record.upper_bound_stddev.unwrap_or(0.0).to_string(),
            record.gap.to_string(),
            record.master_objective.to_string(),
        ],
        Method::TimeHorizon | Method::Regional => vec![
            record.iteration.to_string(),
            record.eta_or_future_cost.to_string(),
            record.lambda_max.to_string(),
            record.lower_bound.to_string(),
            record.upper_bound.to_string(),
            record.gap.to_string(),
            record.master_objective.to_string(),
        ],
    }
}

/// Write the iteration table to any writer.
pub fn write_iterations<W: Write>(
    writer: W,
    method: Method,
    window: usize,
    records: &[IterationRecord],
) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(header(method, window))?;
    for record in records {
        wtr.write_record(row(method, record))?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

impl DecompositionResult {
    /// Export the iteration table as CSV.
    pub fn to_csv(&self, path: &Path) -> Result<(), ReportError> {
        let file = File::create(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        write_iterations(file, self.method, self.window.unwrap_or(1), &self.records)
    }

    pub fn to_json_value(&self) -> Result<serde_json::Value, ReportError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Export the run summary (status, bounds, capacities, cuts) as JSON.
    pub fn to_json(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::RunStatus;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn record(iteration: usize, sddp: bool) -> IterationRecord {
        IterationRecord {
            iteration,
            eta_or_future_cost: 5.0,
            lambda_max: 0.5,
            lower_bound: 10.0,
            upper_bound: 12.0,
            gap: 2.0,
            master_objective: 10.0,
            upper_bound_latest: sddp.then_some(11.0),
            upper_bound_stddev: sddp.then_some(1.0),
        }
    }

    fn result(method: Method) -> DecompositionResult {
        let sddp = method == Method::Sddp;
        DecompositionResult {
            method,
            status: RunStatus::Converged,
            records: vec![record(1, sddp), record(2, sddp)],
            capacities: Vec::new(),
            total_cost: 12.0,
            lower_bound: 10.0,
            cuts: Vec::new(),
            residual_lambda: BTreeMap::from([("t0-t2".to_string(), 0.0)]),
            window: sddp.then_some(4),
        }
    }

    #[test]
    fn test_benders_table() {
        let mut out = Vec::new();
        write_iterations(&mut out, Method::TimeHorizon, 10, &result(Method::TimeHorizon).records)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "i,Master Eta,Sub Lambda,Lower Bound,Upper Bound,Dual gap,Master obj"
        );
        assert_eq!(lines[1], "1,5,0.5,10,12,2,10");
    }

    #[test]
    fn test_sddp_table() {
        let mut out = Vec::new();
        write_iterations(&mut out, Method::Sddp, 10, &result(Method::Sddp).records).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("i,Master Eta,LB,UB (latest),UB (last 10),stddev,Dual gap,Master obj")
        );
        assert_eq!(lines.next(), Some("1,5,10,11,12,1,2,10"));
    }

    #[test]
    fn test_sddp_header_names_configured_window() {
        assert_eq!(header(Method::Sddp, 25)[4], "UB (last 25)");
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("iterations.csv");
        result(Method::Sddp).to_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("i,Master Eta,LB,UB (latest),UB (last 4),"));
    }

    #[test]
    fn test_json_summary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summary.json");
        result(Method::Regional).to_json(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["method"], "regional");
        assert_eq!(value["status"], "converged");
        assert_eq!(value["records"].as_array().unwrap().len(), 2);
        assert!(value["records"][0].get("upper_bound_latest").is_none());
    }

    #[test]
    fn test_csv_to_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("iterations.csv");
        assert!(matches!(
            result(Method::TimeHorizon).to_csv(&path),
            Err(ReportError::Io { .. })
        ));
    }
}
