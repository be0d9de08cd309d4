use serde::Serialize;
use std::collections::BTreeMap;

/// Notes collected while loading; nothing here prevents a model from
/// being built.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadDiagnostics {
    /// Number of cells per table that fell back to a default value
    pub defaulted: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl LoadDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_default(&mut self, table: &'static str) {
        *self.defaulted.entry(table).or_insert(0) += 1;
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn defaulted_total(&self) -> usize {
        self.defaulted.values().sum()
    }
}
