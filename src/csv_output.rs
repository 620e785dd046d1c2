//! CSV output for comparison tables
//!
//! One row per offset, one column per series:
//!
//! ```text
//! offset,user,kernel,kernel to user
//! 0,512.250,101.000,411.250
//! ```
//!
//! Offsets whose band kept no sample are written as `NaN`.

use crate::aggregate::ComparisonTable;

/// CSV formatter for a [`ComparisonTable`]
#[derive(Debug)]
pub struct CsvTableOutput<'a> {
    table: &'a ComparisonTable,
}

impl<'a> CsvTableOutput<'a> {
    pub fn new(table: &'a ComparisonTable) -> Self {
        Self { table }
    }

    /// Header row: `offset` followed by every series label
    fn header(&self) -> String {
        std::iter::once("offset".to_string())
            .chain(self.table.labels().map(Self::escape_field))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn format_value(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else {
            format!("{:.3}", value)
        }
    }

    fn format_row(&self, offset: usize) -> String {
        let mut fields = vec![offset.to_string()];
        for series in self.table.series() {
            let value = series.result.get(offset).unwrap_or(f64::NAN);
            fields.push(Self::format_value(value));
        }
        fields.join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.header());
        output.push('\n');

        for offset in 0..self.table.offsets() {
            output.push_str(&self.format_row(offset));
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outlier::FilteredResult;

    fn table() -> ComparisonTable {
        let mut table = ComparisonTable::new("runtime", 2);
        table
            .insert("user", FilteredResult::new(vec![5.0, 7.5], vec![3, 3]))
            .unwrap();
        table
            .insert(
                "kernel to user",
                FilteredResult::new(vec![3.0, f64::NAN], vec![3, 0]),
            )
            .unwrap();
        table
    }

    #[test]
    fn test_csv_header() {
        let table = table();
        let csv = CsvTableOutput::new(&table).to_csv();
        assert_eq!(csv.lines().next().unwrap(), "offset,user,kernel to user");
    }

    #[test]
    fn test_csv_rows() {
        let table = table();
        let csv = CsvTableOutput::new(&table).to_csv();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "0,5.000,3.000");
        assert_eq!(lines[2], "1,7.500,NaN");
    }

    #[test]
    fn test_csv_escape_field() {
        assert_eq!(CsvTableOutput::escape_field("plain"), "plain");
        assert_eq!(CsvTableOutput::escape_field("a,b"), "\"a,b\"");
        assert_eq!(CsvTableOutput::escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_empty_table() {
        let table = ComparisonTable::new("empty", 0);
        assert_eq!(CsvTableOutput::new(&table).to_csv(), "offset\n");
    }
}
