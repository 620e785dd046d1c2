//! JSON report for comparison tables

use serde::{Deserialize, Serialize};

use crate::aggregate::{ComparisonTable, X_LABEL, Y_LABEL};

/// One series of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSeries {
    pub label: String,
    /// Filtered mean per offset; `null` where every sample was rejected
    pub values: Vec<Option<f64>>,
    /// Samples kept by the confidence band at each offset
    pub retained: Vec<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub degenerate_offsets: Vec<usize>,
}

/// Complete benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub trials: usize,
    pub offsets: usize,
    pub significance: f64,
    pub series: Vec<JsonSeries>,
}

impl JsonReport {
    pub fn from_table(table: &ComparisonTable, trials: usize, significance: f64) -> Self {
        let series = table
            .series()
            .iter()
            .map(|s| JsonSeries {
                label: s.label.clone(),
                values: s
                    .result
                    .values()
                    .iter()
                    .map(|v| (!v.is_nan()).then_some(*v))
                    .collect(),
                retained: s.result.retained().to_vec(),
                degenerate_offsets: s.result.degenerate_offsets(),
            })
            .collect();

        Self {
            title: table.title().to_string(),
            x_label: X_LABEL.to_string(),
            y_label: Y_LABEL.to_string(),
            trials,
            offsets: table.offsets(),
            significance,
            series,
        }
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
