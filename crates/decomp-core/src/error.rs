//! Error types for model data handling
//!
//! [`DataError`] covers everything that can go wrong while describing an
//! energy system: missing tables or keys, malformed labels, and scopes that
//! do not describe a usable time window.

use thiserror::Error;

/// Errors raised while validating or slicing model data.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// A required table is absent from the input
    #[error("missing required table '{0}'")]
    MissingTable(&'static str),

    /// A required global property is absent
    #[error("missing global property '{property}': {hint}")]
    MissingGlobalProperty { property: String, hint: String },

    /// A referenced tuple key is not present in a table
    #[error("table '{table}' has no entry for {key}")]
    MissingKey { table: &'static str, key: String },

    /// A value that cannot be used as given
    #[error("invalid value in table '{table}' for {key}: {message}")]
    InvalidValue {
        table: &'static str,
        key: String,
        message: String,
    },

    /// A label that does not map onto a known enumeration
    #[error("cannot parse '{value}' as {expected}")]
    Parse {
        value: String,
        expected: &'static str,
    },

    /// A time window or site subset that cannot be modelled
    #[error("invalid scope: {0}")]
    InvalidScope(String),
}

/// Convenience alias for results carrying a [`DataError`].
pub type DataResult<T> = Result<T, DataError>;

impl DataError {
    pub fn missing_key(table: &'static str, key: impl std::fmt::Display) -> Self {
        DataError::MissingKey {
            table,
            key: key.to_string(),
        }
    }

    pub fn invalid(
        table: &'static str,
        key: impl std::fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        DataError::InvalidValue {
            table,
            key: key.to_string(),
            message: message.into(),
        }
    }
}
