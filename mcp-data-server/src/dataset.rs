//! In-memory tabular dataset and the operations the MCP tools run against it.
//!
//! A `Dataset` is loaded wholesale from a CSV file, then narrowed (never
//! widened) by `filter` and `remove_outliers`. Descriptive operations leave
//! it untouched. Validation problems (unknown column, no numeric values)
//! are returned as `Err(String)` so the server can report them as tool
//! results instead of faults.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{json, Map, Value};

/// A single typed cell. CSV cells are inferred on load: empty cells become
/// `Null`, cells that parse as a float become `Number`, everything else
/// stays `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Number(f64),
    Text(String),
}

impl CellValue {
    fn from_csv_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return CellValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::Text(trimmed.to_string()),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Render for value-counts keys. Whole numbers print without a trailing
    /// `.0` so keys look like the source data ("3", not "3.0").
    fn render(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{}", n))
                }
            }
            CellValue::Text(s) => Some(s.clone()),
        }
    }
}

/// Comparison mode accepted by the `filter` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Comparator {
    /// Parse the wire name. Returns `None` for unrecognized names so the
    /// caller can answer with a structured failure.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "equal" => Some(Comparator::Equal),
            "less" => Some(Comparator::Less),
            "less/equal" => Some(Comparator::LessEqual),
            "greater" => Some(Comparator::Greater),
            "greater/equal" => Some(Comparator::GreaterEqual),
            _ => None,
        }
    }

    /// Whether a cell satisfies the comparison against `value`.
    /// Non-numeric cells fail every comparison and are filtered out.
    fn keeps(self, cell: &CellValue, value: f64) -> bool {
        let Some(n) = cell.as_number() else {
            return false;
        };
        match self {
            Comparator::Equal => n == value,
            Comparator::Less => n < value,
            Comparator::LessEqual => n <= value,
            Comparator::Greater => n > value,
            Comparator::GreaterEqual => n >= value,
        }
    }
}

/// The one mutable tabular resource the tools share.
#[derive(Debug, Clone)]
pub struct Dataset {
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Dataset {
    /// Load a dataset from a CSV file, replacing nothing (the caller swaps
    /// it into the store on success).
    pub fn from_csv_path(path: &Path) -> Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| format!("Failed to open {}: {}", path.display(), e))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| format!("Failed to read headers from {}: {}", path.display(), e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
            let mut row: Vec<CellValue> =
                record.iter().map(CellValue::from_csv_field).collect();
            // Ragged rows are padded so every row indexes like the header.
            row.resize(headers.len(), CellValue::Null);
            rows.push(row);
        }

        Ok(Dataset { headers, rows })
    }

    #[cfg(test)]
    pub fn from_rows(headers: Vec<&str>, rows: Vec<Vec<CellValue>>) -> Self {
        Dataset {
            headers: headers.into_iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.headers
    }

    fn column_index(&self, name: &str) -> Result<usize, String> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| format!("Unknown column `{}`.", name))
    }

    /// Non-null numeric values of a column, in row order.
    fn numeric_values(&self, column: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row[column].as_number())
            .collect()
    }

    /// Summary statistics for a column.
    ///
    /// Numeric columns get count/mean/std/min/quartiles/max; non-numeric
    /// columns get count/unique/top/freq, matching the usual dataframe
    /// `describe` output.
    pub fn describe(&self, name: &str) -> Result<Value, String> {
        let column = self.column_index(name)?;
        let numbers = self.numeric_values(column);

        if !numbers.is_empty() {
            let mut sorted = numbers.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
            let count = numbers.len();
            let mean = numbers.iter().sum::<f64>() / count as f64;

            let mut summary = Map::new();
            summary.insert("count".to_string(), json!(count));
            summary.insert("mean".to_string(), json!(mean));
            summary.insert("std".to_string(), json!(sample_std(&numbers, mean)));
            summary.insert("min".to_string(), json!(sorted[0]));
            summary.insert("25%".to_string(), json!(quantile(&sorted, 0.25)));
            summary.insert("50%".to_string(), json!(quantile(&sorted, 0.5)));
            summary.insert("75%".to_string(), json!(quantile(&sorted, 0.75)));
            summary.insert("max".to_string(), json!(sorted[count - 1]));
            return Ok(Value::Object(summary));
        }

        // Non-numeric column: describe by frequency.
        let counts = self.count_values(column);
        let count: usize = counts.iter().map(|(_, c)| c).sum();
        let (top, freq) = counts
            .first()
            .map(|(v, c)| (v.clone(), *c))
            .unwrap_or_default();

        let mut summary = Map::new();
        summary.insert("count".to_string(), json!(count));
        summary.insert("unique".to_string(), json!(counts.len()));
        summary.insert("top".to_string(), json!(top));
        summary.insert("freq".to_string(), json!(freq));
        Ok(Value::Object(summary))
    }

    /// Occurrence count per distinct value, most frequent first. Null cells
    /// are skipped.
    pub fn value_counts(&self, name: &str) -> Result<Value, String> {
        let column = self.column_index(name)?;
        let mut map = Map::new();
        for (value, count) in self.count_values(column) {
            map.insert(value, json!(count));
        }
        Ok(Value::Object(map))
    }

    fn count_values(&self, column: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for row in &self.rows {
            if let Some(rendered) = row[column].render() {
                if !counts.contains_key(&rendered) {
                    order.push(rendered.clone());
                }
                *counts.entry(rendered).or_insert(0) += 1;
            }
        }
        let mut pairs: Vec<(String, usize)> = order
            .into_iter()
            .map(|v| {
                let c = counts[&v];
                (v, c)
            })
            .collect();
        // Most frequent first; first-seen order breaks ties (stable sort).
        pairs.sort_by(|a, b| b.1.cmp(&a.1));
        pairs
    }

    /// Narrow the dataset to rows whose `name` cell satisfies the
    /// comparison. Returns the new row count.
    pub fn filter(&mut self, name: &str, value: f64, by: Comparator) -> Result<usize, String> {
        let column = self.column_index(name)?;
        self.rows.retain(|row| by.keeps(&row[column], value));
        Ok(self.rows.len())
    }

    /// Narrow the dataset with the interquartile-range rule: keep rows whose
    /// `name` cell lies in [Q1 - 1.5*IQR, Q3 + 1.5*IQR]. Returns the new
    /// row count.
    pub fn remove_outliers(&mut self, name: &str) -> Result<usize, String> {
        let column = self.column_index(name)?;
        let mut sorted = self.numeric_values(column);
        if sorted.is_empty() {
            return Err(format!("Column `{}` has no numeric values.", name));
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));

        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let lower = q1 - 1.5 * iqr;
        let upper = q3 + 1.5 * iqr;

        self.rows.retain(|row| match row[column].as_number() {
            Some(n) => lower <= n && n <= upper,
            None => false,
        });
        Ok(self.rows.len())
    }

    /// Arithmetic mean of a column's numeric values.
    pub fn mean(&self, name: &str) -> Result<f64, String> {
        let column = self.column_index(name)?;
        let numbers = self.numeric_values(column);
        if numbers.is_empty() {
            return Err(format!("Column `{}` has no numeric values.", name));
        }
        Ok(numbers.iter().sum::<f64>() / numbers.len() as f64)
    }

    /// Sample standard deviation (n - 1 divisor) of a column's numeric
    /// values.
    pub fn standard_deviation(&self, name: &str) -> Result<f64, String> {
        let column = self.column_index(name)?;
        let numbers = self.numeric_values(column);
        if numbers.is_empty() {
            return Err(format!("Column `{}` has no numeric values.", name));
        }
        let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
        Ok(sample_std(&numbers, mean))
    }
}

/// Sample standard deviation with a precomputed mean. A single value has no
/// spread and yields 0.
fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Quantile over a sorted slice with linear interpolation between the two
/// nearest ranks (the dataframe default).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn ages(values: &[f64]) -> Dataset {
        Dataset::from_rows(
            vec!["age"],
            values.iter().map(|v| vec![num(*v)]).collect(),
        )
    }

    #[test]
    fn cell_inference_from_csv_fields() {
        assert_eq!(CellValue::from_csv_field(""), CellValue::Null);
        assert_eq!(CellValue::from_csv_field("  "), CellValue::Null);
        assert_eq!(CellValue::from_csv_field("3.5"), CellValue::Number(3.5));
        assert_eq!(CellValue::from_csv_field("-7"), CellValue::Number(-7.0));
        assert_eq!(
            CellValue::from_csv_field("Braund, Mr. Owen"),
            CellValue::Text("Braund, Mr. Owen".to_string())
        );
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.75), 3.25);
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&sorted, 1.0), 4.0);
    }

    #[test]
    fn mean_and_sample_std() {
        let ds = ages(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((ds.mean("age").unwrap() - 5.0).abs() < 1e-12);
        // Sample std of the set above is sqrt(32/7).
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((ds.standard_deviation("age").unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn std_of_single_value_is_zero() {
        let ds = ages(&[42.0]);
        assert_eq!(ds.standard_deviation("age").unwrap(), 0.0);
    }

    #[test]
    fn unknown_column_is_an_error_not_a_panic() {
        let mut ds = ages(&[1.0]);
        assert!(ds.mean("fare").is_err());
        assert!(ds.describe("fare").is_err());
        assert!(ds.filter("fare", 1.0, Comparator::Less).is_err());
        assert!(ds.remove_outliers("fare").is_err());
        assert_eq!(ds.row_count(), 1);
    }

    #[test]
    fn filter_monotonic_and_partitioned() {
        let original = ages(&[10.0, 18.0, 25.0, 40.0, 3.0]);
        for by in [
            Comparator::Equal,
            Comparator::Less,
            Comparator::LessEqual,
            Comparator::Greater,
            Comparator::GreaterEqual,
        ] {
            let mut ds = original.clone();
            let kept = ds.filter("age", 18.0, by).unwrap();
            assert!(kept <= original.row_count());
            for row in &ds.rows {
                assert!(by.keeps(&row[0], 18.0));
            }
        }
    }

    #[test]
    fn filter_is_idempotent_for_same_predicate() {
        let mut ds = ages(&[10.0, 18.0, 25.0, 40.0, 3.0]);
        let first = ds.filter("age", 18.0, Comparator::Less).unwrap();
        let second = ds.filter("age", 18.0, Comparator::Less).unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, first);
    }

    #[test]
    fn filter_drops_non_numeric_cells() {
        let mut ds = Dataset::from_rows(
            vec!["age"],
            vec![vec![num(30.0)], vec![text("unknown")], vec![CellValue::Null]],
        );
        let kept = ds.filter("age", 100.0, Comparator::Less).unwrap();
        assert_eq!(kept, 1);
    }

    #[test]
    fn remove_outliers_keeps_fenced_rows() {
        let mut ds = ages(&[10.0, 12.0, 11.0, 13.0, 12.0, 100.0]);
        let kept = ds.remove_outliers("age").unwrap();
        assert_eq!(kept, 5);
        assert!(ds.numeric_values(0).iter().all(|v| *v < 100.0));
    }

    #[test]
    fn remove_outliers_noop_when_nothing_outside_fence() {
        let values = [10.0, 12.0, 11.0, 13.0, 12.0];
        let mut ds = ages(&values);
        let kept = ds.remove_outliers("age").unwrap();
        assert_eq!(kept, values.len());
    }

    #[test]
    fn describe_numeric_column() {
        let ds = ages(&[1.0, 2.0, 3.0, 4.0]);
        let summary = ds.describe("age").unwrap();
        assert_eq!(summary["count"], 4);
        assert_eq!(summary["mean"], 2.5);
        assert_eq!(summary["min"], 1.0);
        assert_eq!(summary["25%"], 1.75);
        assert_eq!(summary["50%"], 2.5);
        assert_eq!(summary["75%"], 3.25);
        assert_eq!(summary["max"], 4.0);
    }

    #[test]
    fn describe_text_column() {
        let ds = Dataset::from_rows(
            vec!["sex"],
            vec![
                vec![text("male")],
                vec![text("female")],
                vec![text("male")],
                vec![CellValue::Null],
            ],
        );
        let summary = ds.describe("sex").unwrap();
        assert_eq!(summary["count"], 3);
        assert_eq!(summary["unique"], 2);
        assert_eq!(summary["top"], "male");
        assert_eq!(summary["freq"], 2);
    }

    #[test]
    fn value_counts_sorted_by_frequency() {
        let ds = Dataset::from_rows(
            vec!["class"],
            vec![
                vec![num(3.0)],
                vec![num(1.0)],
                vec![num(3.0)],
                vec![num(2.0)],
                vec![num(3.0)],
                vec![CellValue::Null],
            ],
        );
        let counts = ds.value_counts("class").unwrap();
        let obj = counts.as_object().unwrap();
        let keys: Vec<&String> = obj.keys().collect();
        assert_eq!(keys[0], "3");
        assert_eq!(obj["3"], 3);
        assert_eq!(obj["1"], 1);
        assert_eq!(obj["2"], 1);
        // Nulls are not counted as a value.
        assert_eq!(obj.len(), 3);
    }

    #[test]
    fn comparator_parse_rejects_unknown_names() {
        assert_eq!(Comparator::parse("less"), Some(Comparator::Less));
        assert_eq!(Comparator::parse("less/equal"), Some(Comparator::LessEqual));
        assert_eq!(Comparator::parse("bogus"), None);
        assert_eq!(Comparator::parse("LESS"), None);
    }

    #[test]
    fn csv_load_infers_types_and_pads_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name,age\nAlice,30\nBob,\nCarol").unwrap();

        let ds = Dataset::from_csv_path(&path).unwrap();
        assert_eq!(ds.column_names(), &["name", "age"]);
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.rows[0][1], CellValue::Number(30.0));
        assert_eq!(ds.rows[1][1], CellValue::Null);
        assert_eq!(ds.rows[2][1], CellValue::Null);
    }
}
