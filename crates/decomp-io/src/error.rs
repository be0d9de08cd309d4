use decomp_core::DataError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading a model directory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("required table '{table}' not found at {}", path.display())]
    MissingTable { table: &'static str, path: PathBuf },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table '{table}': {source}")]
    Csv {
        table: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("table '{table}', row {row}: {message}")]
    Row {
        table: &'static str,
        row: usize,
        message: String,
    },

    #[error(transparent)]
    Data(#[from] DataError),
}
